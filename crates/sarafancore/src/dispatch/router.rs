use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::intent::{CallbackAction, Intent};
use crate::core::error::{AppError, AppResult};
use crate::core::utils::{or_placeholder, UNNAMED_HANDLE, UNNAMED_USER};
use crate::notify::{texts, ButtonCallback, EventStreams, IncomingMessage, Outgoing, Recipient};
use crate::orders::{OrderService, Referrer};

/// Error type for handlers
pub type HandlerError = AppError;

/// Dependencies required by the dispatcher
#[derive(Clone)]
pub struct DispatchDeps {
    pub service: Arc<OrderService>,
    /// Bot username used in referral links
    pub bot_username: String,
}

/// Turns inbound chat events into order service calls.
///
/// Holds no state of its own; every business decision lives in the service.
pub struct UpdateDispatcher {
    deps: DispatchDeps,
}

/// Join handles of the two consumer loops.
pub struct DispatchHandles {
    pub messages: JoinHandle<()>,
    pub callbacks: JoinHandle<()>,
}

impl DispatchHandles {
    /// Waits for both loops to finish.
    pub async fn join(self) {
        for (name, handle) in [("messages", self.messages), ("callbacks", self.callbacks)] {
            if let Err(e) = handle.await {
                tracing::error!(loop_name = name, error = %e, "Dispatch loop ended abnormally");
            }
        }
    }
}

impl UpdateDispatcher {
    pub fn new(deps: DispatchDeps) -> Self {
        Self { deps }
    }

    fn service(&self) -> &OrderService {
        &self.deps.service
    }

    /// Starts one sequential consumer per event stream.
    ///
    /// Both loops end when `stop` is cancelled or their channel closes.
    pub fn spawn(self: Arc<Self>, events: EventStreams, stop: CancellationToken) -> DispatchHandles {
        let EventStreams { messages, callbacks } = events;
        DispatchHandles {
            messages: tokio::spawn(Arc::clone(&self).message_loop(messages, stop.clone())),
            callbacks: tokio::spawn(self.callback_loop(callbacks, stop)),
        }
    }

    async fn message_loop(self: Arc<Self>, mut rx: mpsc::Receiver<IncomingMessage>, stop: CancellationToken) {
        tracing::info!("Message loop started");
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                next = rx.recv() => match next {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
            }
        }
        tracing::info!("Message loop stopped");
    }

    async fn callback_loop(self: Arc<Self>, mut rx: mpsc::Receiver<ButtonCallback>, stop: CancellationToken) {
        tracing::info!("Callback loop started");
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                next = rx.recv() => match next {
                    Some(callback) => self.handle_callback(callback).await,
                    None => break,
                },
            }
        }
        tracing::info!("Callback loop stopped");
    }

    /// Handles one text message. Errors are answered and logged, never returned.
    pub async fn handle_message(&self, message: IncomingMessage) {
        let chat_id = message.chat_id;
        let intent = Intent::parse(&message.text);
        tracing::debug!(chat_id, ?intent, "Received message");

        if let Err(e) = self.route_message(message, intent).await {
            self.reply_to_error(chat_id, &e).await;
        }
    }

    /// Handles one button press. Errors are answered and logged, never returned.
    pub async fn handle_callback(&self, callback: ButtonCallback) {
        let user_id = callback.user_id;
        let action = CallbackAction::parse(&callback.data);
        tracing::debug!(user_id, ?action, "Received callback");

        if let Err(e) = self.route_callback(callback, action).await {
            self.reply_to_error(user_id, &e).await;
        }
    }

    async fn route_message(&self, message: IncomingMessage, intent: Intent) -> AppResult<()> {
        let chat_id = message.chat_id;
        let name = or_placeholder(&message.display_name, UNNAMED_USER);
        let handle = or_placeholder(&message.handle, UNNAMED_HANDLE);

        match intent {
            Intent::StartWithReferral(code) => {
                let referrer = self.lookup_referrer(&code).await;
                self.request_consultation(chat_id, &name, &handle, referrer).await
            }
            Intent::ConsultationRequest => self.request_consultation(chat_id, &name, &handle, None).await,
            Intent::StartPlain => {
                self.service().register_user(chat_id, &name, &handle).await?;
                self.reply(chat_id, texts::welcome()).await;
                Ok(())
            }
            Intent::ShareRequest => self.share_referral_link(chat_id, &name, &handle).await,
            Intent::FreeText => {
                self.reply(chat_id, texts::start_hint()).await;
                Ok(())
            }
        }
    }

    async fn route_callback(&self, callback: ButtonCallback, action: CallbackAction) -> AppResult<()> {
        let user_id = callback.user_id;
        let name = or_placeholder(&callback.display_name, UNNAMED_USER);

        match action {
            CallbackAction::TakeOrder(order_id) => {
                let outcome = self.service().take_order(&order_id, user_id, &name).await?;
                tracing::info!(order_id = %order_id, staff_id = user_id, ?outcome, "Claim handled");
                Ok(())
            }
            CallbackAction::ContinueConsultation => {
                let order_id = self.service().request_full_consultation(user_id).await?;
                tracing::info!(order_id = %order_id, client_id = user_id, "Upgrade handled");
                self.reply(user_id, texts::full_request_accepted()).await;
                Ok(())
            }
            CallbackAction::Unknown(data) => {
                tracing::warn!(user_id, data = %data, "Unknown callback data");
                Ok(())
            }
        }
    }

    /// Unknown codes and lookup failures both mean "no referrer".
    async fn lookup_referrer(&self, code: &str) -> Option<Referrer> {
        match self.service().resolve_referrer(code).await {
            Ok(Some(user)) => Some(Referrer::new(user.chat_id, user.display_name)),
            Ok(None) => {
                tracing::warn!(code, "Referral code not found");
                None
            }
            Err(e) => {
                tracing::error!(code, error = %e, "Referral code lookup failed");
                None
            }
        }
    }

    async fn request_consultation(
        &self,
        client_id: i64,
        name: &str,
        handle: &str,
        referrer: Option<Referrer>,
    ) -> AppResult<()> {
        let referrer_id = referrer.as_ref().map(|r| r.id);
        let created = self.service().create_order(client_id, name, handle, referrer).await?;
        if let Some(warning) = &created.notify_warning {
            tracing::warn!(order_id = %created.order_id, error = %warning, "Order stored but staff not notified");
        }

        self.reply(client_id, texts::client_request_received()).await;

        if let Some(referrer_id) = referrer_id.filter(|id| *id != client_id) {
            self.reply(referrer_id, texts::referrer_friend_used(name)).await;
        }

        tracing::info!(order_id = %created.order_id, client_id, ?referrer_id, "Consultation requested");
        Ok(())
    }

    async fn share_referral_link(&self, chat_id: i64, name: &str, handle: &str) -> AppResult<()> {
        self.service().register_user(chat_id, name, handle).await?;
        let code = self.service().referral_code_for(chat_id).await?;

        self.reply(chat_id, texts::share_message(&self.deps.bot_username, &code)).await;
        self.reply(chat_id, texts::share_instruction()).await;
        Ok(())
    }

    async fn reply_to_error(&self, chat_id: i64, error: &HandlerError) {
        if error.is_business_conflict() {
            tracing::info!(chat_id, error = %error, "Request rejected by order rules");
        } else if error.is_not_found() {
            tracing::warn!(chat_id, error = %error, "Request refers to a missing record");
        } else {
            tracing::error!(chat_id, error = %error, "Failed to handle update");
        }

        let answer = match error {
            AppError::ConsultationExists(_) => texts::consultation_exists(),
            AppError::AlreadyClaimed(order_id) => texts::order_already_claimed(order_id),
            AppError::NoActiveOrder(_) => texts::no_active_order(),
            _ => texts::generic_error(),
        };
        self.reply(chat_id, answer).await;
    }

    async fn reply(&self, chat_id: i64, message: Outgoing) {
        if let Err(e) = self.service().deliver(Recipient(chat_id), message).await {
            tracing::warn!(chat_id, error = %e, "Failed to send reply");
        }
    }
}
