//! Test fixtures
//!
//! `TestEnvironment` wires an order service to a fresh on-disk SQLite
//! database in a temp dir and a [`FakeNotifier`].

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use sarafancore::dispatch::{DispatchDeps, UpdateDispatcher};
use sarafancore::notify::{ButtonCallback, IncomingMessage};
use sarafancore::orders::{OrderService, OrderServiceSettings};
use sarafancore::storage::migrations::run_migrations_for_test;
use sarafancore::storage::{create_pool, get_connection, PoolSettings, Store};
use tempfile::TempDir;

use super::FakeNotifier;

pub const STAFF_CHANNEL: i64 = -1001234567890;
pub const BOT_USERNAME: &str = "sarafan_test_bot";

pub struct TestEnvironment {
    pub service: Arc<OrderService>,
    pub notifier: Arc<FakeNotifier>,
    pub store: Store,
    _dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let mut settings = OrderServiceSettings::new(STAFF_CHANNEL);
        settings.notify_timeout = Duration::from_secs(5);
        settings.resend_grace = chrono::Duration::zero();
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: OrderServiceSettings) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sarafan.sqlite");
        let pool = create_pool(path.to_str().expect("utf8 path"), &PoolSettings::default()).expect("pool");
        {
            let mut conn = get_connection(&pool).expect("conn");
            run_migrations_for_test(&mut conn).expect("migrations");
        }

        let store = Store::new(Arc::new(pool), Duration::from_secs(10));
        let notifier = Arc::new(FakeNotifier::new());
        let service = Arc::new(OrderService::new(store.clone(), notifier.clone(), settings));

        Self {
            service,
            notifier,
            store,
            _dir: dir,
        }
    }

    pub fn dispatcher(&self) -> UpdateDispatcher {
        UpdateDispatcher::new(DispatchDeps {
            service: Arc::clone(&self.service),
            bot_username: BOT_USERNAME.to_string(),
        })
    }

    /// Rewinds an order's claim time, as if it had been taken `hours` ago.
    pub async fn backdate_claim(&self, order_id: &str, hours: i64) {
        let id = order_id.to_string();
        self.store
            .call(move |conn| {
                let taken = chrono::Utc::now() - chrono::Duration::hours(hours);
                conn.execute("UPDATE orders SET taken_at = ?1 WHERE id = ?2", rusqlite::params![taken, id])?;
                Ok(())
            })
            .await
            .expect("backdate");
    }
}

pub fn message(chat_id: i64, text: &str, name: &str, handle: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id,
        text: text.to_string(),
        display_name: name.to_string(),
        handle: handle.to_string(),
    }
}

pub fn callback(user_id: i64, name: &str, data: &str) -> ButtonCallback {
    ButtonCallback {
        callback_id: format!("cb-{user_id}-{data}"),
        user_id,
        display_name: name.to_string(),
        handle: String::new(),
        chat_id: Some(STAFF_CHANNEL),
        data: data.to_string(),
    }
}
