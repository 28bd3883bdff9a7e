//! Chat-based lead-intake assistant.
//!
//! A Telegram bot walks end users through one of three fixed flows (quick
//! question, consultation booking, document review), persists the result as
//! a lead, notifies operators, and mirrors leads to a spreadsheet. An
//! operator-only admin panel lists, filters, and exports leads.

pub mod admin;
pub mod bot;
pub mod channels;
pub mod config;
pub mod dialog;
pub mod error;
pub mod model;
pub mod notify;
pub mod sheets;
pub mod store;

pub use bot::Bot;
pub use config::IntakeConfig;
pub use error::{Error, Result};
