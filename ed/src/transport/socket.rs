//! Unix socket setup and teardown

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use super::{Endpoint, TransportError};

/// Bind a listener on the endpoint
///
/// Creates the parent directory and removes a stale socket file left behind
/// by an earlier run.
pub fn bind(endpoint: &Endpoint) -> Result<UnixListener, TransportError> {
    let path = endpoint.path();
    debug!(%endpoint, "bind: creating socket");

    let bind_err = |source| TransportError::Bind {
        endpoint: endpoint.clone(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(bind_err)?;
    }

    if path.exists() {
        debug!(%endpoint, "bind: removing stale socket");
        std::fs::remove_file(path).map_err(bind_err)?;
    }

    let listener = UnixListener::bind(path).map_err(bind_err)?;
    debug!(%endpoint, "bind: socket bound");
    Ok(listener)
}

pub async fn connect(endpoint: &Endpoint) -> Result<UnixStream, TransportError> {
    UnixStream::connect(endpoint.path())
        .await
        .map_err(|source| TransportError::Connect {
            endpoint: endpoint.clone(),
            source,
        })
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(endpoint: &Endpoint) {
    let path = endpoint.path();
    if path.exists() {
        debug!(%endpoint, "cleanup_socket: removing socket file");
        if let Err(e) = std::fs::remove_file(path) {
            warn!(%endpoint, error = %e, "Failed to remove socket file");
        }
    }
}
