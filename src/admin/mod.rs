//! Operator-facing admin panel and export.

pub mod export;
pub mod service;

pub use service::{AdminService, PAGE_SIZE};
