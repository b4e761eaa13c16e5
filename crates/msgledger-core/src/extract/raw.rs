//! Defensive decoding of remote conversation records.
//!
//! The listing endpoint returns loosely typed JSON: IDs arrive as numbers or
//! strings, optional objects may be `null`, and fields come and go between
//! API versions. [`RawRecord::from_value`] never fails. A field with an
//! unexpected type reads as absent and the transformer decides whether that
//! is fatal for the record.

use serde_json::{Map, Value};

/// One remote record, decoded field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Remote record ID.
    pub id: Option<String>,
    /// Listing ID.
    pub property_id: Option<String>,
    /// Listing name, if the API included it.
    pub property_name: Option<String>,
    /// Guest name.
    pub guest_name: Option<String>,
    /// Guest email.
    pub guest_email: Option<String>,
    /// Guest phone.
    pub guest_phone: Option<String>,
    /// Guest country or nationality.
    pub guest_nationality: Option<String>,
    /// Message body.
    pub content: Option<String>,
    /// Send time as the API formatted it.
    pub sent_on: Option<String>,
    /// Explicit direction flag.
    pub is_incoming: Option<bool>,
    /// Remote message type (e.g. `guest`, `host`, `automated_checkin`).
    pub kind: Option<String>,
    /// Reservation ID.
    pub reservation_id: Option<String>,
    /// Reservation total price, in its textual JSON form.
    pub reservation_price: Option<String>,
}

impl RawRecord {
    /// Decodes a record from JSON. Non-object values produce an empty record.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let reservation = obj.get("Reservation").and_then(Value::as_object);

        Self {
            id: id_field(obj, &["id"]),
            property_id: id_field(obj, &["listingMapId", "listingId"]),
            property_name: text_field(obj, &["listingName"]),
            guest_name: text_field(obj, &["recipientName", "guestName"]),
            guest_email: text_field(obj, &["recipientEmail", "guestEmail"]),
            guest_phone: text_field(obj, &["phone", "guestPhone"]),
            guest_nationality: text_field(obj, &["guestCountry", "nationality"]),
            content: content_field(obj),
            sent_on: text_field(obj, &["messageSentOn", "timestamp"]),
            is_incoming: bool_field(obj, "isIncoming"),
            kind: text_field(obj, &["type"]),
            reservation_id: id_field(obj, &["reservationId"])
                .or_else(|| reservation.and_then(|r| id_field(r, &["reservationId", "id"]))),
            reservation_price: reservation
                .and_then(|r| number_field(r, "totalPrice"))
                .or_else(|| number_field(obj, "totalPrice")),
        }
    }
}

/// First non-empty string among `keys`.
fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

/// Identifier given as a string or an integer.
fn id_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    })
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

/// Numeric value kept as text so no float rounding happens before decimal parsing.
fn number_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Body of the first conversation message, falling back to top-level fields.
///
/// An empty body counts as present.
fn content_field(obj: &Map<String, Value>) -> Option<String> {
    let from_thread = obj
        .get("conversationMessages")
        .and_then(Value::as_array)
        .and_then(|messages| messages.first())
        .and_then(|first| first.get("body"))
        .and_then(Value::as_str);

    from_thread
        .or_else(|| obj.get("body").and_then(Value::as_str))
        .or_else(|| obj.get("content").and_then(Value::as_str))
        .map(str::to_string)
}
