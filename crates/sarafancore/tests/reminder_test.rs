//! Reminder sweep and scheduler integration tests
//!
//! Run with: cargo test -p sarafancore --test reminder_test

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::fixtures::STAFF_CHANNEL;
use common::TestEnvironment;
use pretty_assertions::assert_eq;
use sarafancore::notify::{InlineAction, Keyboard};
use sarafancore::ReminderScheduler;
use tokio_util::sync::CancellationToken;

async fn claimed_order(env: &TestEnvironment, client_id: i64) -> String {
    let order_id = env
        .service
        .create_order(client_id, "Ann", "ann1", None)
        .await
        .unwrap()
        .order_id;
    env.service.take_order(&order_id, 99, "Bob").await.unwrap();
    order_id
}

#[tokio::test]
async fn sweep_reminds_once_after_threshold() {
    let env = TestEnvironment::new();
    let order_id = claimed_order(&env, 42).await;
    let before = env.notifier.sent_to(42).len();

    // Not due yet
    let report = env.service.check_consultation_timeouts(Utc::now()).await.unwrap();
    assert!(report.is_empty());
    assert!(env.service.message_index().contains(&order_id));

    let later = Utc::now() + chrono::Duration::hours(25);
    let report = env.service.check_consultation_timeouts(later).await.unwrap();
    assert_eq!(report.due, vec![order_id.clone()]);
    assert_eq!(report.delivered, vec![order_id.clone()]);
    assert!(report.failed.is_empty());

    let sent = env.notifier.sent_to(42);
    assert_eq!(sent.len(), before + 1);
    let Some(Keyboard::Inline(rows)) = &sent.last().unwrap().message.keyboard else {
        panic!("reminder button expected");
    };
    assert_eq!(rows[0][0].action, InlineAction::Callback("consultation_continue".into()));
    assert!(env.service.order(&order_id).await.unwrap().reminder_sent);
    assert!(!env.service.message_index().contains(&order_id));

    let report = env.service.check_consultation_timeouts(later).await.unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn failed_reminder_stays_eligible() {
    let env = TestEnvironment::new();
    let order_id = claimed_order(&env, 42).await;
    let later = Utc::now() + chrono::Duration::hours(25);

    env.notifier.fail_for(42);
    let report = env.service.check_consultation_timeouts(later).await.unwrap();
    assert_eq!(report.failed, vec![order_id.clone()]);
    assert!(!env.service.order(&order_id).await.unwrap().reminder_sent);
    assert!(env.service.message_index().contains(&order_id));

    env.notifier.recover(42);
    let report = env.service.check_consultation_timeouts(later).await.unwrap();
    assert_eq!(report.delivered, vec![order_id]);
}

#[tokio::test]
async fn sweep_ignores_unclaimed_and_closed_orders() {
    let env = TestEnvironment::new();
    env.service.create_order(1, "New", "new", None).await.unwrap();

    let done = claimed_order(&env, 2).await;
    env.service.complete_order(&done).await.unwrap();

    let upgraded = claimed_order(&env, 3).await;
    env.service.request_full_consultation(3).await.unwrap();

    let due = claimed_order(&env, 4).await;

    let report = env
        .service
        .check_consultation_timeouts(Utc::now() + chrono::Duration::hours(25))
        .await
        .unwrap();
    assert_eq!(report.due, vec![due]);
    assert!(!report.due.contains(&upgraded));
}

#[tokio::test]
async fn scheduler_cycle_sends_due_reminders() {
    let env = TestEnvironment::new();
    let order_id = claimed_order(&env, 42).await;
    env.backdate_claim(&order_id, 30).await;

    let scheduler = ReminderScheduler::new(Arc::clone(&env.service), Duration::from_secs(3600));
    let report = scheduler.run_cycle().await;
    assert_eq!(report.reminders.delivered, vec![order_id]);
    assert!(report.announcements.is_empty());
}

#[tokio::test]
async fn scheduler_cycle_reposts_missed_announcements() {
    let env = TestEnvironment::new();
    env.notifier.fail_for(STAFF_CHANNEL);
    let order_id = env.service.create_order(42, "Ann", "ann1", None).await.unwrap().order_id;
    env.notifier.recover(STAFF_CHANNEL);

    let scheduler = ReminderScheduler::new(Arc::clone(&env.service), Duration::from_secs(3600));
    let report = scheduler.run_cycle().await;
    assert_eq!(report.announcements.delivered, vec![order_id]);
    assert_eq!(env.notifier.sent_to(STAFF_CHANNEL).len(), 1);
}

#[tokio::test]
async fn scheduler_stops_on_cancel() {
    let env = TestEnvironment::new();
    let order_id = claimed_order(&env, 42).await;
    env.backdate_claim(&order_id, 30).await;

    let stop = CancellationToken::new();
    let handle = ReminderScheduler::new(Arc::clone(&env.service), Duration::from_millis(20)).spawn(stop.clone());

    // The first tick fires immediately
    tokio::time::sleep(Duration::from_millis(200)).await;
    stop.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    assert!(env.service.order(&order_id).await.unwrap().reminder_sent);
}
