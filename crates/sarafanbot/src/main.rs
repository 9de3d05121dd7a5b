mod cli;
mod telegram;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use cli::{Cli, MigrateDirection};
use sarafancore::core::init_logger;
use sarafancore::dispatch::DispatchDeps;
use sarafancore::storage::migrations::{rollback_last, run_migrations};
use sarafancore::storage::{connect_with_retry, get_connection, PoolSettings};
use sarafancore::{AppConfig, DbPool, OrderService, OrderServiceSettings, ReminderScheduler, Store, UpdateDispatcher};
use telegram::{create_bot, receive_events, setup_bot_commands, TelegramNotifier};

/// Main entry point for the Telegram bot
///
/// # Errors
/// Returns an error if initialization fails (config, logging, database, migrations).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    init_logger(&config.log.level, cli.verbose, config.log.file.as_deref())?;

    let pool_settings = PoolSettings::from_config(&config.database, config.timeouts.store());
    let pool = connect_with_retry(
        &config.database.path,
        &pool_settings,
        config.database.connect_retries,
        config.database.connect_backoff(),
    )
    .await
    .with_context(|| format!("Failed to open database {}", config.database.path))?;
    let pool = Arc::new(pool);

    match cli.migrate {
        Some(direction) => migrate(pool, direction).await,
        None => {
            migrate(Arc::clone(&pool), MigrateDirection::Up).await?;
            run_bot(config, pool).await
        }
    }
}

async fn migrate(pool: Arc<DbPool>, direction: MigrateDirection) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = get_connection(&pool).context("Failed to get database connection")?;
        match direction {
            MigrateDirection::Up => {
                let applied = run_migrations(&mut conn).context("Migration failed")?;
                tracing::info!(?applied, "Database schema is up to date");
            }
            MigrateDirection::Down => match rollback_last(&mut conn).context("Rollback failed")? {
                Some(version) => tracing::info!(version, "Rolled back migration"),
                None => tracing::info!("No migrations to roll back"),
            },
        }
        Ok(())
    })
    .await
    .context("Migration task panicked")?
}

async fn run_bot(config: AppConfig, pool: Arc<DbPool>) -> Result<()> {
    let staff_channel = config.telegram.staff_chat_id()?;
    let bot = create_bot(&config.telegram, config.timeouts.notify())?;

    if let Err(e) = setup_bot_commands(&bot).await {
        tracing::warn!(error = %e, "Failed to set bot commands");
    }

    let mut settings = OrderServiceSettings::new(staff_channel);
    settings.reminder_threshold = config.reminders.threshold();
    settings.notify_timeout = config.timeouts.notify();

    let store = Store::new(pool, config.timeouts.store());
    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let service = Arc::new(OrderService::new(store, notifier, settings));

    let stop = CancellationToken::new();

    let (events, listener) = receive_events(bot, stop.clone());
    let dispatcher = Arc::new(UpdateDispatcher::new(DispatchDeps {
        service: Arc::clone(&service),
        bot_username: config.telegram.bot_username.clone(),
    }));
    let dispatch = dispatcher.spawn(events, stop.clone());
    let scheduler = ReminderScheduler::new(service, config.reminders.check_interval()).spawn(stop.clone());

    tracing::info!(
        staff_channel,
        bot_username = %config.telegram.bot_username,
        "📡 Ready to receive updates!"
    );

    signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down gracefully...");
    stop.cancel();

    if let Err(e) = listener.await {
        tracing::error!(error = %e, "Update listener ended abnormally");
    }
    dispatch.join().await;
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Reminder scheduler ended abnormally");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
