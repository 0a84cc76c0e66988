//! Control channel between `eventd ctl` (or any client) and the daemon
//!
//! One request and one response per connection, each a single line of JSON
//! on the control socket.

pub mod client;
pub mod listener;
pub mod messages;

pub use client::ControlClient;
pub use listener::{read_request, send_response};
pub use messages::{ControlRequest, ControlResponse};

/// Upper bound for one request or response line; seeds and pages can be big
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
