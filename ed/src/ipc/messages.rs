//! Control channel message types
//!
//! Simple JSON-over-newline protocol. Each message is a single line of JSON followed by `\n`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Requests from control clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    /// Start a fresh capture session, discarding any previous one
    CacheInit,

    /// Begin capturing, optionally seeded with already-known events
    CacheStart {
        #[serde(default)]
        events: Vec<String>,
    },

    /// Stop capturing and make the cache readable
    CacheStop,

    /// Next page of the stopped cache
    CacheRead,

    /// Return the payload unchanged
    Echo { payload: String },

    /// Get options (no or empty object) or set exactly one
    Options {
        #[serde(default)]
        options: Option<Map<String, Value>>,
    },

    /// Stop the daemon
    Exit,
}

/// Responses from the daemon to control clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlResponse {
    /// Acknowledgment
    Ok,

    /// Capture stopped; `events` are buffered for reading
    CacheStopped { events: usize, lost: u64 },

    /// One page of cached events; empty once everything was read
    Events { events: Vec<String> },

    Echo { payload: String },

    /// Current option values
    Options { options: BTreeMap<String, i64> },

    /// Error response
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_codes() {
        let cases = [
            (ControlRequest::CacheInit, r#"{"type":"CACHE_INIT"}"#),
            (ControlRequest::CacheStop, r#"{"type":"CACHE_STOP"}"#),
            (ControlRequest::CacheRead, r#"{"type":"CACHE_READ"}"#),
            (ControlRequest::Exit, r#"{"type":"EXIT"}"#),
        ];
        for (request, expected) in cases {
            assert_eq!(serde_json::to_string(&request).unwrap(), expected);
        }
    }

    #[test]
    fn test_cache_start_events_default_empty() {
        let request: ControlRequest = serde_json::from_str(r#"{"type":"CACHE_START"}"#).unwrap();
        assert_eq!(request, ControlRequest::CacheStart { events: Vec::new() });

        let request: ControlRequest = serde_json::from_str(r#"{"type":"CACHE_START","events":["e1"]}"#).unwrap();
        assert_eq!(
            request,
            ControlRequest::CacheStart {
                events: vec!["e1".to_string()]
            }
        );
    }

    #[test]
    fn test_options_request() {
        let request: ControlRequest = serde_json::from_str(r#"{"type":"OPTIONS"}"#).unwrap();
        assert_eq!(request, ControlRequest::Options { options: None });

        let request: ControlRequest =
            serde_json::from_str(r#"{"type":"OPTIONS","options":{"HEARTBEAT_INTERVAL":5}}"#).unwrap();
        let ControlRequest::Options { options: Some(options) } = request else {
            panic!("expected options");
        };
        assert_eq!(options["HEARTBEAT_INTERVAL"], json!(5));
    }

    #[test]
    fn test_response_serialize() {
        let response = ControlResponse::CacheStopped { events: 9, lost: 3 };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"type":"CACHE_STOPPED","events":9,"lost":3}"#
        );

        let response = ControlResponse::Error {
            message: "bad".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"type":"ERROR","message":"bad"}"#
        );
    }

    #[test]
    fn test_unknown_request_rejected() {
        assert!(serde_json::from_str::<ControlRequest>(r#"{"type":"CACHE_PURGE"}"#).is_err());
    }
}
