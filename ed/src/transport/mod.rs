//! Socket transport shared by the proxy, the client library and the daemon
//!
//! Every endpoint is a Unix domain socket named by a URL-like string
//! (`ipc:///run/eventd/ingress.sock` or a bare path). Traffic is
//! newline-delimited JSON [`WireFrame`]s; application messages are two-part
//! frames carrying a subject and a serialized event.
//!
//! ```text
//! publishers ──► ingress ──► [proxy] ──► egress ──► subscribers
//!                              │
//!                              └──► capture (tee) ──► capture service
//! ```

mod endpoint;
mod frame;
mod proxy;
mod socket;

use thiserror::Error;

use crate::event::EventError;

pub use endpoint::Endpoint;
pub use frame::{FrameReader, FrameWriter, MAX_FRAME_SIZE, WireFrame};
pub use proxy::{Proxy, ProxyHandle};
pub use socket::{bind, cleanup_socket, connect};

/// Errors from the socket transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Unsupported endpoint `{0}`: expected ipc://<path> or a socket path")]
    BadEndpoint(String),

    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Unexpected frame: {0}")]
    Unexpected(String),

    #[error("Timed out")]
    Timeout,

    #[error("Connection closed")]
    Closed,
}
