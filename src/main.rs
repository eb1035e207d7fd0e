use std::process::ExitCode;
use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use reminderbot::alert_log::AlertLayer;
use reminderbot::config::Config;
use reminderbot::reminders::{Clock, Database, ReminderService, Scheduler, TelegramClient};

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "reminderbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("reminderbot.log"))
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            return ExitCode::FAILURE;
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        registry.with(AlertLayer::new(bot.clone(), log_chat_id)).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting reminderbot...");
    info!("Loaded config from {config_path}");
    info!("Timezone: {}", config.timezone);

    let database = match Database::open(&config.database_path()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let clock = Clock::new(config.timezone);
    let telegram = Arc::new(TelegramClient::new(bot.clone()));
    let service = Arc::new(ReminderService::new(database.clone(), telegram.clone(), clock));
    let scheduler = Scheduler::new(database, telegram, clock)
        .with_catch_up(config.catch_up_missed)
        .start();

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![service])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    scheduler.shutdown().await;
    info!("Bye");
    ExitCode::SUCCESS
}

async fn handle_message(msg: Message, service: Arc<ReminderService>) -> ResponseResult<()> {
    let text = msg.text();
    let preview: String = text.unwrap_or("<no text>").chars().take(100).collect();
    info!("📨 Update in chat {}: \"{preview}\"", msg.chat.id);

    service.handle_message(msg.chat.id.0, text).await;
    Ok(())
}
