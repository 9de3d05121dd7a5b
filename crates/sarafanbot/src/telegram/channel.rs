//! Telegram implementation of the notification channel.

use async_trait::async_trait;
use sarafancore::notify::{MessageHandle, Notifier, NotifyError, Outgoing, Recipient};
use teloxide::prelude::*;
use teloxide::types::MessageId;

use super::markdown::{edit_with_fallback, send_with_fallback};

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn parse_handle(handle: &MessageHandle) -> Result<MessageId, NotifyError> {
    handle
        .0
        .parse::<i32>()
        .map(MessageId)
        .map_err(|_| NotifyError::InvalidHandle(handle.0.clone()))
}

fn transport(err: teloxide::RequestError) -> NotifyError {
    NotifyError::Transport(err.to_string())
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, to: Recipient, message: Outgoing) -> Result<MessageHandle, NotifyError> {
        let sent = send_with_fallback(&self.bot, ChatId(to.0), &message)
            .await
            .map_err(transport)?;
        Ok(MessageHandle(sent.id.0.to_string()))
    }

    async fn edit(&self, to: Recipient, handle: &MessageHandle, message: Outgoing) -> Result<(), NotifyError> {
        let message_id = parse_handle(handle)?;
        edit_with_fallback(&self.bot, ChatId(to.0), message_id, &message)
            .await
            .map_err(transport)
    }
}
