//! Canonical message types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Property (listing) a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Remote property ID.
    pub id: String,
    /// Property name, filled by enrichment when the listing omits it.
    pub name: Option<String>,
}

/// Guest on the other side of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    /// Guest name.
    pub name: Option<String>,
    /// Guest email.
    pub email: Option<String>,
    /// Guest phone number.
    pub phone: Option<String>,
    /// Guest nationality or country code.
    pub nationality: Option<String>,
}

/// Reservation linked to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Remote reservation ID.
    pub id: String,
    /// Total price, filled by enrichment when absent.
    pub price: Option<Decimal>,
}

/// Whether the guest or the host sent the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Sent by the guest.
    #[serde(rename = "incoming")]
    Inbound,
    /// Sent by the host.
    #[serde(rename = "outgoing")]
    Outbound,
}

impl Direction {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "incoming",
            Self::Outbound => "outgoing",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(Self::Inbound),
            "outgoing" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// How a message was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Sent by an automation rule.
    Automated,
    /// Written by a person.
    Manual,
}

impl MessageType {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::Manual => "manual",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "automated" => Some(Self::Automated),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A message in canonical shape, keyed by `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Stable remote identifier; the idempotency key.
    pub message_id: String,
    /// Property the conversation is about.
    pub property: Property,
    /// Guest details.
    pub guest: Guest,
    /// Message body.
    pub content: String,
    /// When the message was sent (UTC); the sync watermark field.
    pub timestamp: DateTime<Utc>,
    /// Who sent it.
    pub direction: Direction,
    /// Linked reservation, if any.
    pub reservation: Option<Reservation>,
    /// Automated or manual.
    pub message_type: MessageType,
}

/// A message as persisted, with store-managed bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// The message document.
    #[serde(flatten)]
    pub message: Message,
    /// Set on first insert and never changed.
    pub created_at: DateTime<Utc>,
    /// Set on every upsert.
    pub updated_at: DateTime<Utc>,
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No document with this ID existed.
    Inserted,
    /// An existing document was replaced.
    Updated,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_enum_string_forms() {
        for d in [Direction::Inbound, Direction::Outbound] {
            assert_eq!(Direction::parse(d.as_str()), Some(d));
        }
        for t in [MessageType::Automated, MessageType::Manual] {
            assert_eq!(MessageType::parse(t.as_str()), Some(t));
        }
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn test_serialized_shape() {
        let message = Message {
            message_id: "m1".into(),
            property: Property {
                id: "p1".into(),
                name: Some("Beach House".into()),
            },
            guest: Guest::default(),
            content: "Hello".into(),
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            direction: Direction::Inbound,
            reservation: Some(Reservation {
                id: "r1".into(),
                price: Some(Decimal::from_str("450.10").unwrap()),
            }),
            message_type: MessageType::Manual,
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["direction"], "incoming");
        assert_eq!(json["message_type"], "manual");
        assert_eq!(json["property"]["name"], "Beach House");
        assert_eq!(json["reservation"]["price"], "450.10");
    }
}
