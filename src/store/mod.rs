//! Persistence layer: store trait, libSQL backend, migrations.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::LeadStore;
