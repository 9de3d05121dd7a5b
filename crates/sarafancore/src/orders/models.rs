use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use strum::{AsRefStr, Display, EnumString};

use crate::notify::NotifyError;

/// Lifecycle state of an order.
///
/// `new` and `in_work` are active; `complete` and `full` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    New,
    InWork,
    Complete,
    Full,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Full)
    }

    /// Allowed edges: `new -> in_work -> complete`, `new | in_work -> full`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (New, InWork) | (InWork, Complete) | (New, Full) | (InWork, Full)
        )
    }
}

impl ToSql for OrderStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_ref()))
    }
}

impl FromSql for OrderStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A consultation request as stored, with the client's current name joined in.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub client_id: i64,
    pub client_name: String,
    pub client_handle: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub taken_at: Option<DateTime<Utc>>,
    pub staff_id: Option<i64>,
    pub staff_name: Option<String>,
    pub referrer_id: Option<i64>,
    pub referrer_name: Option<String>,
    pub button_pressed: bool,
    pub reminder_sent: bool,
    pub notification_sent: bool,
    pub document_url: Option<String>,
    pub document_sent_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_claimed_by(&self, staff_id: i64) -> bool {
        self.status == OrderStatus::InWork && self.staff_id == Some(staff_id)
    }
}

/// A chat identity known to the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub chat_id: i64,
    pub handle: String,
    pub display_name: String,
    pub referral_code: Option<String>,
    pub demo_used: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who sent the client, if anyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referrer {
    pub id: i64,
    pub name: String,
}

impl Referrer {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    /// Drops missing ids and self-referrals.
    pub fn attributable(referrer: Option<Referrer>, client_id: i64) -> Option<Referrer> {
        referrer.filter(|r| r.id != 0 && r.id != client_id)
    }
}

/// Result of a successful `create_order`.
#[derive(Debug)]
pub struct NewOrder {
    pub order_id: String,
    /// Set when the order was stored but the staff channel was not told
    pub notify_warning: Option<NotifyError>,
}

/// Result of a successful `take_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This call moved the order to `in_work`
    Claimed,
    /// The same staff member had already claimed it
    AlreadyYours,
}

/// Per-order outcome of one scheduler sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: Vec<String>,
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_text_round_trip() {
        assert_eq!(OrderStatus::InWork.to_string(), "in_work");
        assert_eq!(OrderStatus::from_str("full").ok(), Some(OrderStatus::Full));
        assert!(OrderStatus::from_str("done").is_err());
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        let all = [New, InWork, Complete, Full];
        let allowed = [(New, InWork), (InWork, Complete), (New, Full), (InWork, Full)];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [OrderStatus::Complete, OrderStatus::Full] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(OrderStatus::New));
            assert!(!terminal.can_transition_to(OrderStatus::InWork));
        }
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::InWork.is_terminal());
    }

    #[test]
    fn test_referrer_attribution() {
        assert_eq!(Referrer::attributable(None, 42), None);
        assert_eq!(Referrer::attributable(Some(Referrer::new(0, "")), 42), None);
        assert_eq!(Referrer::attributable(Some(Referrer::new(42, "Me")), 42), None);
        assert_eq!(
            Referrer::attributable(Some(Referrer::new(7, "Carol")), 42),
            Some(Referrer::new(7, "Carol"))
        );
    }
}
