//! Notification channel contract.
//!
//! The core never talks to Telegram directly. It sends [`Outgoing`] messages
//! through a [`Notifier`] and consumes inbound events from [`EventStreams`].
//! The `sarafanbot` crate provides the Telegram implementation; tests use an
//! in-memory fake.

pub mod texts;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Chat the message goes to: a user or the staff group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Recipient(pub i64);

/// Transport-specific id of a sent message, opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    /// Telegram MarkdownV2; interpolated values must go through `escape_markdown`
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineAction {
    /// Delivered back as [`ButtonCallback::data`]
    Callback(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: InlineAction,
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: InlineAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: InlineAction::Url(url.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Buttons attached to the message. No rows removes existing buttons on edit.
    Inline(Vec<Vec<InlineButton>>),
    /// Persistent keyboard under the input field; pressing a key sends its label as text
    Reply(Vec<Vec<String>>),
}

impl Keyboard {
    pub fn empty_inline() -> Self {
        Keyboard::Inline(Vec::new())
    }
}

/// A message to send or an edit to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub text: String,
    pub format: TextFormat,
    pub keyboard: Option<Keyboard>,
}

impl Outgoing {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Plain,
            keyboard: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Markdown,
            keyboard: None,
        }
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// A text message from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub text: String,
    pub display_name: String,
    pub handle: String,
}

/// A press on an inline callback button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonCallback {
    pub callback_id: String,
    /// Who pressed the button
    pub user_id: i64,
    pub display_name: String,
    pub handle: String,
    /// Chat the button's message lives in, if known
    pub chat_id: Option<i64>,
    pub data: String,
}

/// Inbound event channels produced by a transport.
#[derive(Debug)]
pub struct EventStreams {
    pub messages: mpsc::Receiver<IncomingMessage>,
    pub callbacks: mpsc::Receiver<ButtonCallback>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("notification timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("invalid message handle: {0}")]
    InvalidHandle(String),
}

/// Outbound side of the chat transport.
///
/// Implementations must be cheap to share (`Arc<dyn Notifier>`) and must not
/// block; the order service bounds every call with its own timeout.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a new message and returns a handle that can later be edited.
    async fn send(&self, to: Recipient, message: Outgoing) -> Result<MessageHandle, NotifyError>;

    /// Replaces the text and keyboard of a previously sent message.
    async fn edit(&self, to: Recipient, handle: &MessageHandle, message: Outgoing) -> Result<(), NotifyError>;
}
