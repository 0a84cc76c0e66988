//! Daemon side of the control channel

use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::MAX_MESSAGE_SIZE;
use super::messages::{ControlRequest, ControlResponse};

/// How long a connected client gets to send its request
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Read the one request a control connection carries
pub async fn read_request(stream: &mut UnixStream) -> Result<ControlRequest> {
    let mut reader = BufReader::new((&mut *stream).take(MAX_MESSAGE_SIZE as u64 + 1));
    let mut line = String::new();

    let bytes_read = tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .context("Read timeout")?
        .context("Failed to read control request")?;

    if bytes_read > MAX_MESSAGE_SIZE {
        return Err(eyre::eyre!("Message too large: {} bytes", bytes_read));
    }

    if line.is_empty() {
        return Err(eyre::eyre!("Empty message received"));
    }

    let request: ControlRequest = serde_json::from_str(line.trim()).context("Failed to parse control request")?;
    debug!(?request, "read_request: parsed request");

    Ok(request)
}

/// Send a response on the stream
pub async fn send_response(stream: &mut UnixStream, response: &ControlResponse) -> Result<()> {
    let response_json = serde_json::to_string(response).context("Failed to serialize response")?;
    stream
        .write_all(response_json.as_bytes())
        .await
        .context("Failed to write response")?;
    stream.write_all(b"\n").await.context("Failed to write newline")?;
    stream.flush().await.context("Failed to flush response")?;
    debug!(?response, "send_response: sent response");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ControlClient;
    use crate::transport::{Endpoint, bind};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_end_to_end_echo() {
        let temp = TempDir::new().unwrap();
        let endpoint = Endpoint::from_path(temp.path().join("control.sock"));
        let listener = bind(&endpoint).unwrap();

        let mock_daemon = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await.unwrap();
            let ControlRequest::Echo { payload } = request else {
                panic!("expected echo, got {:?}", request);
            };
            send_response(&mut stream, &ControlResponse::Echo { payload }).await.unwrap();
        });

        let client = ControlClient::new(endpoint);
        assert_eq!(client.echo("hello").await.unwrap(), "hello");

        mock_daemon.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_request_rejects_garbage() {
        let (mut daemon_side, mut client_side) = UnixStream::pair().unwrap();
        client_side.write_all(b"not json\n").await.unwrap();
        assert!(read_request(&mut daemon_side).await.is_err());
    }

    #[tokio::test]
    async fn test_read_request_rejects_empty() {
        let (mut daemon_side, client_side) = UnixStream::pair().unwrap();
        drop(client_side);
        assert!(read_request(&mut daemon_side).await.is_err());
    }
}
