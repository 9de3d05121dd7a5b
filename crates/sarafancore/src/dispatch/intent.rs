//! Classification of inbound text and callback data

use crate::notify::texts::{CONSULTATION_CONTINUE, SHARE_BUTTON_TEXT, SHARE_LINK_CAPTION, TAKE_ORDER_PREFIX};

const START_COMMAND: &str = "/start";
const CONSULTATION_COMMAND: &str = "/consultation";
const REFERRAL_PREFIX: &str = "ref_";
const CONSULT_PAYLOAD: &str = "consult";

/// What a text message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// `/start ref_<code>` from a shared link
    StartWithReferral(String),
    /// `/start` with no recognised payload
    StartPlain,
    /// The share button on the reply keyboard
    ShareRequest,
    /// `/consultation`, `/start consult` or the forwarded link caption
    ConsultationRequest,
    FreeText,
}

impl Intent {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if let Some(payload) = start_payload(text) {
            return match payload {
                Some(p) if p.starts_with(REFERRAL_PREFIX) && p.len() > REFERRAL_PREFIX.len() => {
                    Intent::StartWithReferral(p[REFERRAL_PREFIX.len()..].to_string())
                }
                Some(CONSULT_PAYLOAD) => Intent::ConsultationRequest,
                _ => Intent::StartPlain,
            };
        }

        if text == SHARE_BUTTON_TEXT {
            return Intent::ShareRequest;
        }

        if command_name(text) == Some(CONSULTATION_COMMAND) || text.contains(SHARE_LINK_CAPTION) {
            return Intent::ConsultationRequest;
        }

        Intent::FreeText
    }
}

/// First word of a command without a `@botname` suffix.
fn command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    Some(first.split('@').next().unwrap_or(first))
}

/// `Some(payload)` when `text` is a `/start` command.
fn start_payload(text: &str) -> Option<Option<&str>> {
    if command_name(text)? != START_COMMAND {
        return None;
    }
    Some(text.split_whitespace().nth(1))
}

/// What an inline button press asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    TakeOrder(String),
    ContinueConsultation,
    Unknown(String),
}

impl CallbackAction {
    /// Splits `verb:argument` callback data.
    pub fn parse(data: &str) -> Self {
        if data == CONSULTATION_CONTINUE {
            return CallbackAction::ContinueConsultation;
        }
        match data.strip_prefix(TAKE_ORDER_PREFIX) {
            Some(order_id) if !order_id.is_empty() => CallbackAction::TakeOrder(order_id.to_string()),
            _ => CallbackAction::Unknown(data.to_string()),
        }
    }
}
