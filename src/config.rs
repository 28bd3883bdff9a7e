//! Configuration, read from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Optional spreadsheet mirror configuration.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Path, raw JSON, or base64 of the service-account credentials.
    pub credentials: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

/// Full bot configuration.
pub struct IntakeConfig {
    pub bot_token: SecretString,
    /// Platform ids allowed to use the admin panel and notified of leads.
    pub operator_ids: Vec<i64>,
    pub db_path: PathBuf,
    pub export_dir: PathBuf,
    /// Dialogs idle past this are auto-abandoned.
    pub session_idle_timeout: Duration,
    pub sheets: Option<SheetsConfig>,
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("BOT_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("BOT_TOKEN".into()))?;
        // Tokens pasted into .env files often come quoted
        let bot_token = bot_token
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
        if bot_token.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "BOT_TOKEN".into(),
                message: "token is empty".into(),
            });
        }

        let operator_ids = parse_operator_ids(&std::env::var("ADMIN_IDS").unwrap_or_default());
        if operator_ids.is_empty() {
            tracing::warn!("ADMIN_IDS is empty; no operator will receive lead notifications");
        }

        let db_path = std::env::var("DB_PATH")
            .unwrap_or_else(|_| "./data/leads.db".to_string())
            .into();
        let export_dir = std::env::var("EXPORT_DIR")
            .unwrap_or_else(|_| "./data/exports".to_string())
            .into();

        let idle_minutes: u64 = match std::env::var("SESSION_IDLE_MINUTES") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "SESSION_IDLE_MINUTES".into(),
                message: format!("not a number: {raw}"),
            })?,
            Err(_) => 30,
        };

        let sheets = sheets_from_env();

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            operator_ids,
            db_path,
            export_dir,
            session_idle_timeout: Duration::from_secs(idle_minutes * 60),
            sheets,
        })
    }

    pub fn bot_token(&self) -> &str {
        self.bot_token.expose_secret()
    }
}

/// Operators configured as any digit-separated list ("1, 2;3").
fn parse_operator_ids(raw: &str) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut current = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            if let Ok(id) = current.parse() {
                ids.push(id);
            }
            current.clear();
        }
    }
    if !current.is_empty() {
        if let Ok(id) = current.parse() {
            ids.push(id);
        }
    }
    ids.dedup();
    ids
}

fn sheets_from_env() -> Option<SheetsConfig> {
    let credentials = std::env::var("SHEETS_CREDENTIALS").ok()?;
    let spreadsheet_id = std::env::var("SHEETS_SPREADSHEET_ID").ok()?;
    let sheet_name = std::env::var("SHEETS_SHEET_NAME").unwrap_or_else(|_| "Leads".to_string());
    Some(SheetsConfig {
        credentials,
        spreadsheet_id,
        sheet_name,
    })
}
