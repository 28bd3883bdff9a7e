//! Spreadsheet mirror: credentials, REST client, background task.

pub mod client;
pub mod credentials;
pub mod mirror;

pub use client::SheetsClient;
pub use credentials::ServiceAccountKey;
pub use mirror::{MirrorHandle, spawn_mirror_task};
