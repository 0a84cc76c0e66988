//! The `source:tag` + parameters payload carried inside an event
//!
//! The subject `eventd:heartbeat` is reserved for the daemon's liveness
//! events. Only events on that subject whose payload is also
//! `eventd:heartbeat` count as heartbeats.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::types::{Event, EventError};

/// Source name the daemon publishes its own events under
pub const HEARTBEAT_SOURCE: &str = "eventd";

/// Tag of the daemon's liveness event
pub const HEARTBEAT_TAG: &str = "heartbeat";

/// Subject heartbeats are published on
pub const HEARTBEAT_SUBJECT: &str = "eventd:heartbeat";

/// Parsed payload: `{"<source>:<tag>": {params}}`
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub source: String,
    pub tag: String,
    pub params: Map<String, Value>,
}

impl EventPayload {
    pub fn new(source: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            tag: tag.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// `source:tag`, which is also the subject the event is published on
    pub fn source_tag(&self) -> String {
        format!("{}:{}", self.source, self.tag)
    }

    pub fn encode(&self) -> String {
        let mut outer = Map::new();
        outer.insert(self.source_tag(), Value::Object(self.params.clone()));
        Value::Object(outer).to_string()
    }

    pub fn decode(serialized: &str) -> Result<Self, EventError> {
        let value: Value = serde_json::from_str(serialized)?;
        let Value::Object(outer) = value else {
            return Err(EventError::BadPayload("payload is not an object".to_string()));
        };
        if outer.len() != 1 {
            return Err(EventError::BadPayload(format!(
                "payload must have exactly one key, found {}",
                outer.len()
            )));
        }

        let Some((source_tag, params)) = outer.into_iter().next() else {
            return Err(EventError::BadPayload("payload is empty".to_string()));
        };
        let Some((source, tag)) = source_tag.split_once(':') else {
            return Err(EventError::BadPayload(format!("key `{source_tag}` is not source:tag")));
        };
        let Value::Object(params) = params else {
            return Err(EventError::BadPayload("params are not an object".to_string()));
        };

        Ok(Self {
            source: source.to_string(),
            tag: tag.to_string(),
            params,
        })
    }
}

/// Payload of the liveness event stamped with `now`
pub fn heartbeat_payload(now: DateTime<Utc>) -> EventPayload {
    EventPayload::new(HEARTBEAT_SOURCE, HEARTBEAT_TAG)
        .with_param("timestamp", now.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Whether `event` received on `subject` is one of the daemon's heartbeats
pub fn is_heartbeat(subject: &str, event: &Event) -> bool {
    subject == HEARTBEAT_SUBJECT
        && event
            .payload()
            .and_then(|payload| EventPayload::decode(payload).ok())
            .is_some_and(|payload| payload.source == HEARTBEAT_SOURCE && payload.tag == HEARTBEAT_TAG)
}
