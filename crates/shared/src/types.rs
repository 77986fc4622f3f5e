//! Common types used across the SkinSage consultation platform

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Domain Enums
// =============================================================================

/// Lifecycle state of a consultation conversation.
///
/// `waiting` conversations have no expert bound; `active` conversations are
/// bound to exactly one expert; `closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Waiting,
    Active,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Waiting => "waiting",
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, crate::error::DomainError> {
        match s {
            "waiting" => Ok(ConversationStatus::Waiting),
            "active" => Ok(ConversationStatus::Active),
            "closed" => Ok(ConversationStatus::Closed),
            other => Err(crate::error::DomainError::Validation(format!(
                "Invalid conversation status: {other}"
            ))),
        }
    }
}

/// Availability state of a skincare expert.
///
/// Only `active` experts are offered to customers or eligible for assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertStatus {
    Active,
    Busy,
    Offline,
}

impl ExpertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpertStatus::Active => "active",
            ExpertStatus::Busy => "busy",
            ExpertStatus::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Result<Self, crate::error::DomainError> {
        match s {
            "active" => Ok(ExpertStatus::Active),
            "busy" => Ok(ExpertStatus::Busy),
            "offline" => Ok(ExpertStatus::Offline),
            other => Err(crate::error::DomainError::Validation(format!(
                "Invalid expert status: {other}"
            ))),
        }
    }
}

/// Which side of the consultation authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Customer,
    Expert,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::Customer => "customer",
            SenderRole::Expert => "expert",
        }
    }

    /// The other side of the conversation. Read receipts are scoped to
    /// messages authored by the opposite role.
    pub fn opposite(&self) -> SenderRole {
        match self {
            SenderRole::Customer => SenderRole::Expert,
            SenderRole::Expert => SenderRole::Customer,
        }
    }

    pub fn parse(s: &str) -> Result<Self, crate::error::DomainError> {
        match s {
            "customer" => Ok(SenderRole::Customer),
            "expert" => Ok(SenderRole::Expert),
            other => Err(crate::error::DomainError::Validation(format!(
                "Invalid sender role: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================
// Shared between the API handlers (serialized out) and the polling client
// (deserialized back in). Status-like columns travel as text, matching the
// `::text` casts in the queries that produce them.

/// A consultation conversation between one customer and at most one expert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub expert_id: Option<Uuid>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    pub fn is_waiting(&self) -> bool {
        self.status == ConversationStatus::Waiting.as_str()
    }

    pub fn is_closed(&self) -> bool {
        self.status == ConversationStatus::Closed.as_str()
    }
}

/// A single chat message. `id` is the strictly increasing surrogate key used
/// as the sync cursor; `sent_at` is informational only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: Uuid,
    pub sender_role: String,
    pub sender_id: Uuid,
    pub body: String,
    pub kind: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

/// A conversation plus the derived unread badge count for the requesting
/// role. Unread counts are computed in the list query, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub expert_id: Option<Uuid>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub unread_count: i64,
}

/// Presence-relevant projection of an expert account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExpertPresence {
    pub id: Uuid,
    pub display_name: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_role_opposite_flips_both_ways() {
        assert_eq!(SenderRole::Customer.opposite(), SenderRole::Expert);
        assert_eq!(SenderRole::Expert.opposite(), SenderRole::Customer);
    }

    #[test]
    fn status_parse_accepts_wire_values_and_rejects_garbage() {
        assert_eq!(
            ConversationStatus::parse("waiting").map(|s| s.as_str()),
            Ok("waiting")
        );
        assert_eq!(
            ExpertStatus::parse("busy").map(|s| s.as_str()),
            Ok("busy")
        );
        assert!(ConversationStatus::parse("open").is_err());
        assert!(ExpertStatus::parse("away").is_err());
        assert!(SenderRole::parse("admin").is_err());
    }
}
