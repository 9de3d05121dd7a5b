//! Telegram transport: bot construction, notifier and update listener

pub mod channel;
pub mod listener;
pub mod markdown;

use std::time::Duration;

use anyhow::Context;
use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use teloxide::prelude::*;
use teloxide::types::BotCommand;

pub use channel::TelegramNotifier;
pub use listener::receive_events;

use sarafancore::core::config::TelegramConfig;

/// Creates a Bot instance, pointed at a custom Bot API server when configured.
pub fn create_bot(config: &TelegramConfig, request_timeout: Duration) -> anyhow::Result<Bot> {
    let client = ClientBuilder::new()
        .timeout(request_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    match &config.api_url {
        Some(raw) => {
            let url = url::Url::parse(raw).with_context(|| format!("Invalid telegram.api_url {raw:?}"))?;
            tracing::info!(api_url = %url, "Using custom Bot API URL");
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(vec![
        BotCommand::new("start", "начать работу с ботом"),
        BotCommand::new("consultation", "оставить заявку на консультацию"),
    ])
    .await?;
    Ok(())
}
