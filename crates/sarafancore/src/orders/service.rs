//! Order service: the only place order state changes.
//!
//! Every mutation is committed to the store first; notifications follow and
//! their failures are logged, never rolled back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::message_index::MessageIndex;
use super::models::{ClaimOutcome, NewOrder, Order, OrderStatus, Referrer, SweepReport, User};
use crate::core::error::{AppError, AppResult};
use crate::core::ids;
use crate::notify::{texts, MessageHandle, Notifier, NotifyError, Outgoing, Recipient};
use crate::storage::orders::{self as order_store, OrderDraft};
use crate::storage::users as user_store;
use crate::storage::Store;

/// How many fresh ids `create_order` tries before giving up.
pub const ORDER_ID_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct OrderServiceSettings {
    /// Group chat where new orders are announced
    pub staff_channel: Recipient,
    /// Time after the claim before the client gets a reminder
    pub reminder_threshold: chrono::Duration,
    /// Upper bound for one send/edit
    pub notify_timeout: Duration,
    /// Age an unannounced `new` order must reach before the re-send sweep picks it up
    pub resend_grace: chrono::Duration,
}

impl OrderServiceSettings {
    pub fn new(staff_channel: i64) -> Self {
        Self {
            staff_channel: Recipient(staff_channel),
            reminder_threshold: chrono::Duration::hours(24),
            notify_timeout: Duration::from_secs(15),
            resend_grace: chrono::Duration::minutes(2),
        }
    }
}

pub struct OrderService {
    store: Store,
    notifier: Arc<dyn Notifier>,
    messages: MessageIndex,
    settings: OrderServiceSettings,
}

impl OrderService {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>, settings: OrderServiceSettings) -> Self {
        Self {
            store,
            notifier,
            messages: MessageIndex::new(),
            settings,
        }
    }

    pub fn message_index(&self) -> &MessageIndex {
        &self.messages
    }

    /// Sends through the notifier, bounded by `notify_timeout`.
    pub async fn deliver(&self, to: Recipient, message: Outgoing) -> Result<MessageHandle, NotifyError> {
        match tokio::time::timeout(self.settings.notify_timeout, self.notifier.send(to, message)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.settings.notify_timeout)),
        }
    }

    async fn deliver_edit(&self, to: Recipient, handle: &MessageHandle, message: Outgoing) -> Result<(), NotifyError> {
        match tokio::time::timeout(self.settings.notify_timeout, self.notifier.edit(to, handle, message)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.settings.notify_timeout)),
        }
    }

    /// Sends and logs a failure instead of returning it.
    async fn deliver_best_effort(&self, to: Recipient, message: Outgoing, what: &'static str) {
        if let Err(e) = self.deliver(to, message).await {
            tracing::warn!(chat_id = to.0, error = %e, "Failed to send {}", what);
        }
    }

    /// Creates or refreshes the user behind an inbound interaction.
    pub async fn register_user(&self, chat_id: i64, display_name: &str, handle: &str) -> AppResult<()> {
        let (name, handle) = (display_name.to_string(), handle.to_string());
        self.store
            .call(move |conn| user_store::upsert_user(conn, chat_id, &handle, &name, Utc::now()))
            .await
    }

    /// Returns the user's referral code, assigning one on first use.
    pub async fn referral_code_for(&self, chat_id: i64) -> AppResult<String> {
        self.store
            .call(move |conn| {
                let user = user_store::get_user(conn, chat_id)?.ok_or(AppError::UserNotFound(chat_id))?;
                if let Some(code) = user.referral_code {
                    return Ok(code);
                }

                let candidate = ids::unique_referral_code(|code| user_store::referral_code_exists(conn, code));
                let code = user_store::set_referral_code(conn, chat_id, &candidate)?
                    .ok_or(AppError::UserNotFound(chat_id))?;
                tracing::info!(chat_id, code = %code, "Referral code assigned");
                Ok(code)
            })
            .await
    }

    /// Looks up the owner of a referral code.
    pub async fn resolve_referrer(&self, code: &str) -> AppResult<Option<User>> {
        let code = code.to_string();
        self.store
            .call(move |conn| user_store::get_user_by_referral_code(conn, &code))
            .await
    }

    /// Creates a `new` order for the client and announces it to staff.
    ///
    /// Fails with `ConsultationExists` while the client has a `new` or
    /// `in_work` order. A failed announcement does not fail the call; it is
    /// reported in [`NewOrder::notify_warning`] and retried by the re-send sweep.
    pub async fn create_order(
        &self,
        client_id: i64,
        client_name: &str,
        client_handle: &str,
        referrer: Option<Referrer>,
    ) -> AppResult<NewOrder> {
        let draft = OrderDraft {
            client_id,
            referrer: Referrer::attributable(referrer, client_id),
            created_at: Utc::now(),
        };
        let (name, handle) = (client_name.to_string(), client_handle.to_string());

        let order = self
            .store
            .call(move |conn| {
                user_store::upsert_user(conn, client_id, &handle, &name, draft.created_at)?;
                order_store::insert_order_exclusive(conn, &draft, ids::generate_order_id, ORDER_ID_ATTEMPTS)
            })
            .await?;

        tracing::info!(
            order_id = %order.id,
            client_id,
            referrer_id = ?order.referrer_id,
            "Order created"
        );

        let notify_warning = self.announce(&order).await.err();
        Ok(NewOrder {
            order_id: order.id,
            notify_warning,
        })
    }

    /// Posts the staff announcement, indexes it and flags the order as announced.
    async fn announce(&self, order: &Order) -> Result<(), NotifyError> {
        let handle = match self
            .deliver(self.settings.staff_channel, texts::staff_new_order(order))
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Failed to announce order to staff");
                return Err(e);
            }
        };

        self.messages.put(&order.id, handle);

        let order_id = order.id.clone();
        if let Err(e) = self
            .store
            .call(move |conn| order_store::mark_notification_sent(conn, &order_id))
            .await
        {
            tracing::warn!(order_id = %order.id, error = %e, "Failed to flag order as announced");
        }
        Ok(())
    }

    /// Claims a `new` order for a staff member. First claim wins.
    pub async fn take_order(&self, order_id: &str, staff_id: i64, staff_name: &str) -> AppResult<ClaimOutcome> {
        let order = self.order(order_id).await?;

        if order.is_claimed_by(staff_id) {
            tracing::info!(order_id, staff_id, "Order already claimed by this staff member");
            self.render_claimed(&order).await;
            return Ok(ClaimOutcome::AlreadyYours);
        }

        if !order.status.can_transition_to(OrderStatus::InWork) {
            tracing::warn!(order_id, staff_id, status = %order.status, "Claim attempt on an order that is not new");
            return Err(AppError::AlreadyClaimed(order_id.to_string()));
        }

        let (id, name) = (order_id.to_string(), staff_name.to_string());
        let claimed = self
            .store
            .call(move |conn| {
                if !order_store::claim_order(conn, &id, staff_id, &name, Utc::now())? {
                    return Ok(None);
                }
                order_store::get_order(conn, &id)
            })
            .await?;

        let Some(claimed) = claimed else {
            tracing::info!(order_id, staff_id, "Claim lost to another staff member");
            return Err(AppError::AlreadyClaimed(order_id.to_string()));
        };

        tracing::info!(order_id, staff_id, staff_name, "Order claimed");

        self.render_claimed(&claimed).await;
        self.deliver_best_effort(Recipient(claimed.client_id), texts::client_claimed(), "claim confirmation")
            .await;

        Ok(ClaimOutcome::Claimed)
    }

    /// Rewrites the indexed staff announcement to the claimed state.
    async fn render_claimed(&self, order: &Order) {
        let Some(handle) = self.messages.get(&order.id) else {
            tracing::warn!(order_id = %order.id, "No staff message indexed for order, skipping edit");
            return;
        };

        if let Err(e) = self
            .deliver_edit(self.settings.staff_channel, &handle, texts::staff_claimed(order))
            .await
        {
            tracing::warn!(order_id = %order.id, error = %e, "Failed to update staff message");
        }
    }

    /// Upgrades the client's active order to `full` and tells staff.
    pub async fn request_full_consultation(&self, client_id: i64) -> AppResult<String> {
        let upgraded = self
            .store
            .call(move |conn| match order_store::upgrade_active_to_full(conn, client_id)? {
                Some(id) => order_store::get_order(conn, &id),
                None => Ok(None),
            })
            .await?;

        let Some(order) = upgraded else {
            return Err(AppError::NoActiveOrder(client_id));
        };

        tracing::info!(order_id = %order.id, client_id, "Full consultation requested");

        // A `full` order can no longer be claimed from its announcement
        self.messages.remove(&order.id);
        self.deliver_best_effort(self.settings.staff_channel, texts::staff_full_request(&order), "full request")
            .await;

        Ok(order.id)
    }

    /// Marks an in-work order as done.
    pub async fn complete_order(&self, order_id: &str) -> AppResult<()> {
        let order = self.order(order_id).await?;
        if !order.status.can_transition_to(OrderStatus::Complete) {
            return Err(invalid_transition(order_id, order.status, OrderStatus::Complete));
        }

        let id = order_id.to_string();
        let outcome = self
            .store
            .call(move |conn| {
                if order_store::complete_order(conn, &id)? {
                    return Ok(None);
                }
                order_store::get_order(conn, &id).map(|found| Some(found.map(|o| o.status)))
            })
            .await?;

        match outcome {
            None => {
                self.messages.remove(order_id);
                tracing::info!(order_id, "Order completed");
                Ok(())
            }
            Some(None) => Err(AppError::OrderNotFound(order_id.to_string())),
            Some(Some(from)) => Err(invalid_transition(order_id, from, OrderStatus::Complete)),
        }
    }

    /// Stores the generated document link and sends it to the client.
    pub async fn record_document(&self, order_id: &str, url: &str) -> AppResult<()> {
        let (id, link) = (order_id.to_string(), url.to_string());
        let order = self
            .store
            .call(move |conn| {
                if !order_store::record_document(conn, &id, &link, Utc::now())? {
                    return Ok(None);
                }
                order_store::get_order(conn, &id)
            })
            .await?
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))?;

        tracing::info!(order_id, client_id = order.client_id, "Document recorded");
        self.deliver_best_effort(Recipient(order.client_id), texts::document_ready(url), "document link")
            .await;
        Ok(())
    }

    /// In-work orders that still have no document.
    pub async fn orders_awaiting_document(&self) -> AppResult<Vec<Order>> {
        self.store.call(|conn| order_store::orders_awaiting_document(conn)).await
    }

    /// Records a press of the document page's "buy full consultation" button.
    pub async fn mark_button_pressed(&self, order_id: &str) -> AppResult<()> {
        let id = order_id.to_string();
        let found = self
            .store
            .call(move |conn| order_store::mark_button_pressed(conn, &id))
            .await?;
        if !found {
            return Err(AppError::OrderNotFound(order_id.to_string()));
        }
        tracing::info!(order_id, "Purchase button pressed");
        Ok(())
    }

    pub async fn order(&self, order_id: &str) -> AppResult<Order> {
        let id = order_id.to_string();
        self.store
            .call(move |conn| order_store::get_order(conn, &id))
            .await?
            .ok_or_else(|| AppError::OrderNotFound(order_id.to_string()))
    }

    /// Every order the client ever had, oldest first.
    pub async fn client_orders(&self, client_id: i64) -> AppResult<Vec<Order>> {
        self.store
            .call(move |conn| order_store::orders_for_client(conn, client_id))
            .await
    }

    /// Reminds clients whose order was claimed more than the threshold ago.
    ///
    /// An order is flagged only after its reminder went out, so a failed send
    /// is retried on the next sweep. A crash between send and flag repeats
    /// the reminder once.
    pub async fn check_consultation_timeouts(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let cutoff = now - self.settings.reminder_threshold;
        let due = self
            .store
            .call(move |conn| order_store::orders_due_for_reminder(conn, cutoff))
            .await?;

        let mut report = SweepReport {
            due: due.iter().map(|o| o.id.clone()).collect(),
            ..SweepReport::default()
        };
        if due.is_empty() {
            tracing::debug!("No orders due for a reminder");
            return Ok(report);
        }
        tracing::info!(count = due.len(), "Sending consultation reminders");

        for order in due {
            if let Err(e) = self.deliver(Recipient(order.client_id), texts::reminder()).await {
                tracing::warn!(order_id = %order.id, client_id = order.client_id, error = %e, "Reminder not delivered");
                report.failed.push(order.id);
                continue;
            }

            let id = order.id.clone();
            match self
                .store
                .call(move |conn| order_store::mark_reminder_sent(conn, &id))
                .await
            {
                Ok(_) => {
                    tracing::info!(order_id = %order.id, client_id = order.client_id, "Reminder sent");
                    // The staff message reached its final form at claim time
                    self.messages.remove(&order.id);
                    report.delivered.push(order.id);
                }
                Err(e) => {
                    tracing::error!(order_id = %order.id, error = %e, "Reminder sent but not flagged; it will repeat");
                    report.failed.push(order.id);
                }
            }
        }

        Ok(report)
    }

    /// Re-announces `new` orders whose staff message never went out.
    pub async fn resend_pending_notifications(&self) -> AppResult<SweepReport> {
        let created_before = Utc::now() - self.settings.resend_grace;
        let pending = self
            .store
            .call(move |conn| order_store::orders_pending_notification(conn, created_before))
            .await?;

        let mut report = SweepReport {
            due: pending.iter().map(|o| o.id.clone()).collect(),
            ..SweepReport::default()
        };

        for order in pending {
            let delivered = if self.messages.contains(&order.id) {
                // Posted earlier in this process; only the flag is missing
                let id = order.id.clone();
                self.store
                    .call(move |conn| order_store::mark_notification_sent(conn, &id))
                    .await
                    .is_ok()
            } else {
                self.announce(&order).await.is_ok()
            };

            if delivered {
                report.delivered.push(order.id);
            } else {
                report.failed.push(order.id);
            }
        }

        if !report.is_empty() {
            tracing::info!(
                delivered = report.delivered.len(),
                failed = report.failed.len(),
                "Re-sent pending order announcements"
            );
        }
        Ok(report)
    }
}

fn invalid_transition(order_id: &str, from: OrderStatus, to: OrderStatus) -> AppError {
    AppError::InvalidTransition {
        order_id: order_id.to_string(),
        from,
        to,
    }
}
