//! Long-polling update listener.
//!
//! Private text messages and inline button presses are converted into the
//! transport-neutral event types and pushed into bounded channels; the core
//! dispatcher consumes the other ends.

use std::time::Duration;

use sarafancore::notify::{ButtonCallback, EventStreams, IncomingMessage};
use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::User;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Capacity of each event channel.
pub const EVENT_BUFFER: usize = 256;

const SHUTDOWN_ATTEMPTS: u32 = 50;

fn sender_fields(user: Option<&User>) -> (String, String) {
    match user {
        Some(user) => (user.full_name(), user.username.clone().unwrap_or_default()),
        None => (String::new(), String::new()),
    }
}

fn incoming_message(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text()?;
    let (display_name, handle) = sender_fields(msg.from.as_ref());
    Some(IncomingMessage {
        chat_id: msg.chat.id.0,
        text: text.to_string(),
        display_name,
        handle,
    })
}

fn button_callback(q: &CallbackQuery) -> Option<ButtonCallback> {
    let data = q.data.clone()?;
    let user_id = i64::try_from(q.from.id.0).ok()?;
    let (display_name, handle) = sender_fields(Some(&q.from));
    Some(ButtonCallback {
        callback_id: q.id.0.clone(),
        user_id,
        display_name,
        handle,
        chat_id: q.message.as_ref().map(|m| m.chat().id.0),
        data,
    })
}

fn schema() -> UpdateHandler<HandlerError> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter(|msg: Message| msg.chat.is_private())
                .endpoint(|msg: Message, tx: mpsc::Sender<IncomingMessage>| async move {
                    if let Some(event) = incoming_message(&msg) {
                        if tx.send(event).await.is_err() {
                            tracing::warn!(chat_id = msg.chat.id.0, "Message dropped, dispatcher is gone");
                        }
                    }
                    Ok::<(), HandlerError>(())
                }),
        )
        .branch(Update::filter_callback_query().endpoint(
            |bot: Bot, q: CallbackQuery, tx: mpsc::Sender<ButtonCallback>| async move {
                // Stop the client-side spinner before any processing
                if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
                    tracing::warn!(error = %e, "Failed to answer callback query");
                }
                if let Some(event) = button_callback(&q) {
                    if tx.send(event).await.is_err() {
                        tracing::warn!(user_id = q.from.id.0, "Callback dropped, dispatcher is gone");
                    }
                }
                Ok::<(), HandlerError>(())
            },
        ))
}

/// Starts polling Telegram and returns the event streams plus the polling task.
///
/// Polling stops once `stop` is cancelled; the streams then close.
pub fn receive_events(bot: Bot, stop: CancellationToken) -> (EventStreams, JoinHandle<()>) {
    let (msg_tx, msg_rx) = mpsc::channel::<IncomingMessage>(EVENT_BUFFER);
    let (cb_tx, cb_rx) = mpsc::channel::<ButtonCallback>(EVENT_BUFFER);

    let mut dispatcher = Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![msg_tx, cb_tx])
        .default_handler(|update| async move {
            tracing::trace!(update_id = update.id.0, "Unhandled update");
        })
        .error_handler(LoggingErrorHandler::with_custom_text("An error from the update listener"))
        .build();

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        stop.cancelled().await;
        // The dispatcher refuses to shut down while still starting up
        for _ in 0..SHUTDOWN_ATTEMPTS {
            match shutdown.shutdown() {
                Ok(done) => {
                    done.await;
                    return;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
        tracing::warn!("Update listener did not acknowledge shutdown");
    });

    let handle = tokio::spawn(async move {
        tracing::info!("Update listener started");
        dispatcher.dispatch().await;
        tracing::info!("Update listener stopped");
    });

    (
        EventStreams {
            messages: msg_rx,
            callbacks: cb_rx,
        },
        handle,
    )
}
