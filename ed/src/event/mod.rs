//! Events and their codec
//!
//! An [`Event`] is a small map of string fields. Three are required:
//! `runtime_id`, `sequence` and `payload`. On the wire an event travels as its
//! serialized form, the compact JSON object of its fields with keys sorted, so
//! decoding and re-encoding a valid event reproduces the same string.

mod payload;
mod types;

pub use payload::{EventPayload, HEARTBEAT_SOURCE, HEARTBEAT_SUBJECT, HEARTBEAT_TAG, heartbeat_payload, is_heartbeat};
pub use types::{Event, EventError, EventKey, PAYLOAD, RUNTIME_ID, SEQUENCE, decode_valid};
