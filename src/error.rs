//! Error types for the lead-intake bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("External sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record-store errors.
///
/// `Validation`, `NotFound` and `InvalidTransition` are caller errors and
/// leave no partial rows behind. `Pool`/`Query`/`Migration` are storage
/// failures: the dialog layer keeps its buffer so the commit can be retried.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: i64 },

    #[error("Invalid lead status: {status}")]
    InvalidTransition { status: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl StoreError {
    /// Whether this is an I/O-level storage failure (as opposed to a caller
    /// error). Storage failures preserve the dialog buffer for a retry.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Pool(_) | StoreError::Query(_) | StoreError::Migration(_)
        )
    }
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Spreadsheet mirror errors. Logged by the mirror task, never surfaced to
/// the end user and never rolled back into the primary commit.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Sheets auth failed: {0}")]
    Auth(String),

    #[error("Sheets request failed: {0}")]
    Request(String),

    #[error("Unexpected Sheets response: {0}")]
    Response(String),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
