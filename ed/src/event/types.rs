//! Event record and its serialized form

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field holding the publisher instance identifier
pub const RUNTIME_ID: &str = "runtime_id";

/// Field holding the per-publisher sequence number
pub const SEQUENCE: &str = "sequence";

/// Field holding the serialized `source:tag` payload
pub const PAYLOAD: &str = "payload";

/// Errors from decoding or validating events
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Event is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Event sequence is not numeric: {0}")]
    BadSequence(String),

    #[error("Malformed payload: {0}")]
    BadPayload(String),
}

/// A single event: an ordered mapping of named string fields
///
/// Valid events carry [`RUNTIME_ID`], [`SEQUENCE`] and [`PAYLOAD`]. Extra
/// fields are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: BTreeMap<String, String>,
}

/// The identity of a valid event within its publisher's stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub runtime_id: String,
    pub sequence: u64,
}

impl Event {
    /// Build a valid event from its three required fields
    pub fn new(runtime_id: impl Into<String>, sequence: u64, payload: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(RUNTIME_ID.to_string(), runtime_id.into());
        fields.insert(SEQUENCE.to_string(), sequence.to_string());
        fields.insert(PAYLOAD.to_string(), payload.into());
        Self { fields }
    }

    /// Wrap an arbitrary field map (not validated)
    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn runtime_id(&self) -> Option<&str> {
        self.get(RUNTIME_ID)
    }

    pub fn sequence(&self) -> Option<u64> {
        self.get(SEQUENCE).and_then(|s| s.parse().ok())
    }

    pub fn payload(&self) -> Option<&str> {
        self.get(PAYLOAD)
    }

    /// Validate the required fields and return the event's identity
    pub fn key(&self) -> Result<EventKey, EventError> {
        let runtime_id = self.runtime_id().ok_or(EventError::MissingField(RUNTIME_ID))?;
        let sequence = self.get(SEQUENCE).ok_or(EventError::MissingField(SEQUENCE))?;
        self.payload().ok_or(EventError::MissingField(PAYLOAD))?;

        let sequence = sequence
            .parse()
            .map_err(|_| EventError::BadSequence(sequence.to_string()))?;

        Ok(EventKey {
            runtime_id: runtime_id.to_string(),
            sequence,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.key().is_ok()
    }

    /// Serialize to the canonical string form (compact JSON, sorted keys)
    pub fn encode(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(&self.fields)?)
    }

    /// Parse the string form; does not check required fields
    pub fn decode(serialized: &str) -> Result<Self, EventError> {
        let fields: BTreeMap<String, String> = serde_json::from_str(serialized)?;
        Ok(Self { fields })
    }
}

/// Decode a serialized event and insist on its required fields
pub fn decode_valid(serialized: &str) -> Result<(Event, EventKey), EventError> {
    let event = Event::decode(serialized)?;
    let key = event.key()?;
    Ok((event, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_event_is_valid() {
        let event = Event::new("rid-1", 7, "{}");
        let key = event.key().unwrap();
        assert_eq!(key.runtime_id, "rid-1");
        assert_eq!(key.sequence, 7);
        assert_eq!(event.payload(), Some("{}"));
    }

    #[test]
    fn test_encode_is_sorted_compact_json() {
        let event = Event::new("rid", 1, "p");
        assert_eq!(
            event.encode().unwrap(),
            r#"{"payload":"p","runtime_id":"rid","sequence":"1"}"#
        );
    }

    #[test]
    fn test_missing_fields_are_invalid() {
        for field in [RUNTIME_ID, SEQUENCE, PAYLOAD] {
            let mut fields = Event::new("rid", 1, "p").fields().clone();
            fields.remove(field);
            let event = Event::from_fields(fields);
            match event.key() {
                Err(EventError::MissingField(missing)) => assert_eq!(missing, field),
                other => panic!("expected MissingField({field}), got {other:?}"),
            }
        }
    }

    #[test]
    fn test_non_numeric_sequence_is_invalid() {
        let mut event = Event::new("rid", 1, "p");
        event.insert(SEQUENCE, "abc");
        assert!(matches!(event.key(), Err(EventError::BadSequence(_))));
    }

    #[test]
    fn test_decode_rejects_non_events() {
        assert!(Event::decode("not json").is_err());
        assert!(Event::decode(r#"{"type":"Subscribe","prefix":""}"#).is_ok());
        assert!(decode_valid(r#"{"type":"Subscribe","prefix":""}"#).is_err());
        assert!(Event::decode(r#"{"sequence":1}"#).is_err());
    }

    #[test]
    fn test_extra_fields_survive() {
        let mut event = Event::new("rid", 3, "p");
        event.insert("host", "leaf-1");
        let decoded = Event::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded.get("host"), Some("leaf-1"));
        assert_eq!(decoded, event);
    }

    proptest! {
        #[test]
        fn prop_decode_encode_roundtrip(
            runtime_id in "[a-zA-Z0-9-]{1,40}",
            sequence in any::<u64>(),
            payload in ".*",
            extra in proptest::collection::btree_map("[a-z_]{1,12}", ".*", 0..4),
        ) {
            let mut event = Event::new(runtime_id, sequence, payload);
            for (k, v) in extra {
                if event.get(&k).is_none() {
                    event.insert(k, v);
                }
            }
            let encoded = event.encode().unwrap();
            let decoded = Event::decode(&encoded).unwrap();
            prop_assert_eq!(&decoded, &event);
            prop_assert_eq!(decoded.encode().unwrap(), encoded);
        }
    }
}
