use std::sync::Arc;

use lead_intake::admin::AdminService;
use lead_intake::bot::Bot;
use lead_intake::channels::{Channel, TelegramChannel};
use lead_intake::config::IntakeConfig;
use lead_intake::dialog::DialogEngine;
use lead_intake::notify::Notifier;
use lead_intake::sheets::{self, ServiceAccountKey, SheetsClient};
use lead_intake::store::{LeadStore, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = IntakeConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📋 Lead Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Operators: {}", config.operator_ids.len());
    eprintln!(
        "   Sheets mirror: {}",
        if config.sheets.is_some() { "on" } else { "off" }
    );

    let store: Arc<dyn LeadStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {e}",
                    config.db_path.display()
                );
                std::process::exit(1);
            }),
    );

    let channel: Arc<dyn Channel> =
        Arc::new(TelegramChannel::new(config.bot_token().to_string()));

    let sheets_client = match &config.sheets {
        Some(sheets_config) => {
            let key = ServiceAccountKey::resolve(&sheets_config.credentials).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            });
            Some(SheetsClient::new(
                key,
                sheets_config.spreadsheet_id.clone(),
                sheets_config.sheet_name.clone(),
            ))
        }
        None => None,
    };
    let mirror = sheets::spawn_mirror_task(sheets_client);

    let engine = Arc::new(DialogEngine::new(config.session_idle_timeout));
    let notifier = Notifier::new(Arc::clone(&channel), config.operator_ids.clone());
    let admin = AdminService::new(
        Arc::clone(&store),
        Arc::clone(&channel),
        config.operator_ids.clone(),
        config.export_dir.clone(),
    );

    let bot = Bot::new(store, channel, engine, notifier, admin, mirror);
    bot.run().await?;

    Ok(())
}
