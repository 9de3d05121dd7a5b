//! In-memory notification channel
//!
//! Records every send and edit. Sends to chosen recipients can be made to
//! fail to exercise the error paths of the order service.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sarafancore::notify::{MessageHandle, Notifier, NotifyError, Outgoing, Recipient};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: i64,
    pub handle: MessageHandle,
    pub message: Outgoing,
}

#[derive(Debug, Clone)]
pub struct EditedMessage {
    pub to: i64,
    pub handle: MessageHandle,
    pub message: Outgoing,
}

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<EditedMessage>>,
    failing: Mutex<HashSet<i64>>,
    next_id: AtomicU64,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later send or edit to `chat_id` fails with a transport error.
    pub fn fail_for(&self, chat_id: i64) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn recover(&self, chat_id: i64) {
        self.failing.lock().unwrap().remove(&chat_id);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.to == chat_id).collect()
    }

    pub fn edits(&self) -> Vec<EditedMessage> {
        self.edits.lock().unwrap().clone()
    }

    fn check(&self, chat_id: i64) -> Result<(), NotifyError> {
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(NotifyError::Transport(format!("chat {chat_id} unreachable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, to: Recipient, message: Outgoing) -> Result<MessageHandle, NotifyError> {
        self.check(to.0)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = MessageHandle(id.to_string());
        self.sent.lock().unwrap().push(SentMessage {
            to: to.0,
            handle: handle.clone(),
            message,
        });
        Ok(handle)
    }

    async fn edit(&self, to: Recipient, handle: &MessageHandle, message: Outgoing) -> Result<(), NotifyError> {
        self.check(to.0)?;
        self.edits.lock().unwrap().push(EditedMessage {
            to: to.0,
            handle: handle.clone(),
            message,
        });
        Ok(())
    }
}
