//! OPTIONS payload parsing

use serde_json::{Map, Value};
use thiserror::Error;

/// The one option the daemon understands: heartbeat interval in seconds
pub const HEARTBEAT_INTERVAL: &str = "HEARTBEAT_INTERVAL";

#[derive(Debug, Error, PartialEq)]
pub enum OptionsError {
    #[error("Options take exactly one key, got {0}")]
    MultipleKeys(usize),

    #[error("Unknown option `{0}`")]
    UnknownKey(String),

    #[error("Option `{key}` must be an integer, got {value}")]
    NotInteger { key: String, value: String },
}

/// What an OPTIONS request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsRequest {
    Get,
    SetHeartbeatInterval(i64),
}

/// Interpret an OPTIONS payload; absent or empty means "get"
pub fn parse_options(options: Option<&Map<String, Value>>) -> Result<OptionsRequest, OptionsError> {
    let Some(options) = options.filter(|o| !o.is_empty()) else {
        return Ok(OptionsRequest::Get);
    };

    if options.len() > 1 {
        return Err(OptionsError::MultipleKeys(options.len()));
    }

    let Some((key, value)) = options.iter().next() else {
        return Ok(OptionsRequest::Get);
    };
    if key != HEARTBEAT_INTERVAL {
        return Err(OptionsError::UnknownKey(key.clone()));
    }

    value
        .as_i64()
        .map(OptionsRequest::SetHeartbeatInterval)
        .ok_or_else(|| OptionsError::NotInteger {
            key: key.clone(),
            value: value.to_string(),
        })
}
