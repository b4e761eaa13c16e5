//! Canonical message model.

mod model;
mod time;

pub use model::{
    Direction, Guest, Message, MessageType, Property, Reservation, StoredMessage, UpsertOutcome,
};
pub use time::parse_timestamp;
