//! Raw record validation, normalization, and enrichment.

mod enrich;

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::extract::RawRecord;
use crate::message::{
    Direction, Guest, Message, MessageType, Property, Reservation, parse_timestamp,
};

pub use enrich::{EnrichmentLookup, NoEnrichment};

use enrich::PropertyNames;

/// Why a raw record cannot become a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No usable `id`.
    #[error("record has no message ID")]
    MissingMessageId,

    /// No send time.
    #[error("record has no timestamp")]
    MissingTimestamp,

    /// Send time in an unknown format.
    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    /// No body at all.
    #[error("record has no content")]
    MissingContent,
}

/// Parses a monetary amount without going through floating point.
///
/// Accepts plain decimals and scientific notation.
#[must_use]
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Converts raw records to canonical messages.
///
/// Holds the property-name memo, so one instance should live for one run.
pub struct Transformer<'a> {
    lookup: &'a dyn EnrichmentLookup,
    property_names: PropertyNames,
}

impl std::fmt::Debug for Transformer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("cached_properties", &self.property_names.len())
            .finish_non_exhaustive()
    }
}

impl<'a> Transformer<'a> {
    /// Creates a transformer backed by `lookup`.
    #[must_use]
    pub fn new(lookup: &'a dyn EnrichmentLookup) -> Self {
        Self {
            lookup,
            property_names: PropertyNames::default(),
        }
    }

    /// Validates, normalizes and enriches one record.
    ///
    /// A record listed without content gets the body of its conversation's
    /// first message. Enrichment failures never fail the record.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when a required field is missing or malformed.
    pub async fn transform(&mut self, raw: &RawRecord) -> Result<Message, ValidationError> {
        let mut message = match normalize(raw) {
            Err(ValidationError::MissingContent) => self.with_fetched_content(raw).await?,
            other => other?,
        };

        if message.property.name.is_none() && !message.property.id.is_empty() {
            message.property.name = self
                .property_names
                .resolve(self.lookup, &message.property.id)
                .await;
        }

        if let Some(reservation) = message.reservation.as_mut()
            && reservation.price.is_none()
        {
            reservation.price = match self.lookup.reservation_price(&reservation.id).await {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        error = %e,
                        "reservation lookup failed"
                    );
                    None
                }
            };
        }

        Ok(message)
    }

    async fn with_fetched_content(&self, raw: &RawRecord) -> Result<Message, ValidationError> {
        // content is checked after the ID, so the ID is valid here
        let id = raw.id.as_deref().map(str::trim).unwrap_or_default();
        let content = match self.lookup.conversation_content(id).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(message_id = id, error = %e, "conversation lookup failed");
                None
            }
        };
        let content = content.ok_or(ValidationError::MissingContent)?;
        normalize(&RawRecord {
            content: Some(content),
            ..raw.clone()
        })
    }
}

/// Builds a message from the record alone.
///
/// # Errors
///
/// Returns a [`ValidationError`] when a required field is missing or malformed.
pub fn normalize(raw: &RawRecord) -> Result<Message, ValidationError> {
    let message_id = raw
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::MissingMessageId)?
        .to_string();

    let sent_on = raw
        .sent_on
        .as_deref()
        .ok_or(ValidationError::MissingTimestamp)?;
    let timestamp = parse_timestamp(sent_on)
        .ok_or_else(|| ValidationError::InvalidTimestamp(sent_on.to_string()))?;

    let content = raw.content.clone().ok_or(ValidationError::MissingContent)?;

    let kind = raw.kind.as_deref().map(str::to_ascii_lowercase);
    let direction = match (raw.is_incoming, kind.as_deref()) {
        (Some(true), _) => Direction::Inbound,
        (Some(false), _) => Direction::Outbound,
        (None, Some(k)) if k.starts_with("guest") => Direction::Inbound,
        (None, _) => Direction::Outbound,
    };
    let message_type = match kind.as_deref() {
        Some(k) if k.starts_with("automated") => MessageType::Automated,
        _ => MessageType::Manual,
    };

    let reservation = raw.reservation_id.as_ref().map(|id| Reservation {
        id: id.clone(),
        price: raw.reservation_price.as_deref().and_then(|text| {
            let price = parse_decimal(text);
            if price.is_none() {
                tracing::warn!(%message_id, price = text, "ignoring unparseable price");
            }
            price
        }),
    });

    Ok(Message {
        message_id,
        property: Property {
            id: raw.property_id.clone().unwrap_or_default(),
            name: raw.property_name.clone(),
        },
        guest: Guest {
            name: raw.guest_name.clone(),
            email: raw.guest_email.clone(),
            phone: raw.guest_phone.clone(),
            nationality: raw.guest_nationality.clone(),
        },
        content,
        timestamp,
        direction,
        reservation,
        message_type,
    })
}
