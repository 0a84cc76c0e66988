//! Control client for talking to a running daemon

use std::collections::BTreeMap;
use std::time::Duration;

use eyre::{Context, Result};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::MAX_MESSAGE_SIZE;
use super::messages::{ControlRequest, ControlResponse};
use crate::orchestrator::HEARTBEAT_INTERVAL;
use crate::transport::Endpoint;

/// Default timeout for control operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the daemon's control socket
#[derive(Debug, Clone)]
pub struct ControlClient {
    endpoint: Endpoint,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if the control socket exists
    pub fn socket_exists(&self) -> bool {
        self.endpoint.path().exists()
    }

    pub async fn echo(&self, payload: &str) -> Result<String> {
        let request = ControlRequest::Echo {
            payload: payload.to_string(),
        };
        match self.send_request(request).await? {
            ControlResponse::Echo { payload } => Ok(payload),
            other => Err(unexpected(other)),
        }
    }

    /// Current option values
    pub async fn get_options(&self) -> Result<BTreeMap<String, i64>> {
        self.options(None).await
    }

    pub async fn set_heartbeat_interval(&self, secs: i64) -> Result<BTreeMap<String, i64>> {
        let mut options = Map::new();
        options.insert(HEARTBEAT_INTERVAL.to_string(), Value::from(secs));
        self.options(Some(options)).await
    }

    /// Send a raw OPTIONS request; returns the values in force afterwards
    pub async fn options(&self, options: Option<Map<String, Value>>) -> Result<BTreeMap<String, i64>> {
        match self.send_request(ControlRequest::Options { options }).await? {
            ControlResponse::Options { options } => Ok(options),
            other => Err(unexpected(other)),
        }
    }

    pub async fn cache_init(&self) -> Result<()> {
        self.expect_ok(ControlRequest::CacheInit).await
    }

    pub async fn cache_start(&self, seed: Vec<String>) -> Result<()> {
        self.expect_ok(ControlRequest::CacheStart { events: seed }).await
    }

    /// Stop capturing; returns the buffered event count and the lost count
    pub async fn cache_stop(&self) -> Result<(usize, u64)> {
        match self.send_request(ControlRequest::CacheStop).await? {
            ControlResponse::CacheStopped { events, lost } => Ok((events, lost)),
            other => Err(unexpected(other)),
        }
    }

    /// Next page of the stopped cache; empty once drained
    pub async fn cache_read(&self) -> Result<Vec<String>> {
        match self.send_request(ControlRequest::CacheRead).await? {
            ControlResponse::Events { events } => Ok(events),
            other => Err(unexpected(other)),
        }
    }

    /// Read pages until the cache is drained
    pub async fn cache_read_all(&self) -> Result<Vec<String>> {
        let mut all = Vec::new();
        loop {
            let page = self.cache_read().await?;
            if page.is_empty() {
                return Ok(all);
            }
            all.extend(page);
        }
    }

    /// Ask the daemon to exit
    pub async fn exit(&self) -> Result<()> {
        self.expect_ok(ControlRequest::Exit).await
    }

    async fn expect_ok(&self, request: ControlRequest) -> Result<()> {
        match self.send_request(request).await? {
            ControlResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Send a request to the daemon and wait for response
    pub async fn send_request(&self, request: ControlRequest) -> Result<ControlResponse> {
        debug!(endpoint = %self.endpoint, ?request, "ControlClient: sending request");

        let stream = tokio::time::timeout(self.timeout, UnixStream::connect(self.endpoint.path()))
            .await
            .context("Connection timeout")?
            .context(format!("Failed to connect to daemon at {}", self.endpoint))?;

        self.send_on_stream(stream, &request).await
    }

    async fn send_on_stream(&self, mut stream: UnixStream, request: &ControlRequest) -> Result<ControlResponse> {
        let request_json = serde_json::to_string(request).context("Failed to serialize request")?;

        if request_json.len() > MAX_MESSAGE_SIZE {
            return Err(eyre::eyre!("Message too large: {} bytes", request_json.len()));
        }

        tokio::time::timeout(self.timeout, async {
            stream
                .write_all(request_json.as_bytes())
                .await
                .context("Failed to write request")?;
            stream.write_all(b"\n").await.context("Failed to write newline")?;
            stream.flush().await.context("Failed to flush stream")?;
            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Write timeout")??;

        let mut reader = BufReader::new((&mut stream).take(MAX_MESSAGE_SIZE as u64 + 1));
        let mut response_line = String::new();

        tokio::time::timeout(self.timeout, async {
            let bytes_read = reader
                .read_line(&mut response_line)
                .await
                .context("Failed to read response")?;

            if bytes_read > MAX_MESSAGE_SIZE {
                return Err(eyre::eyre!("Response too large: {} bytes", bytes_read));
            }
            if bytes_read == 0 {
                return Err(eyre::eyre!("Daemon closed the connection without responding"));
            }

            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Read timeout")??;

        let response: ControlResponse =
            serde_json::from_str(response_line.trim()).context("Failed to parse daemon response")?;

        debug!(?response, "ControlClient: received response");
        Ok(response)
    }
}

fn unexpected(response: ControlResponse) -> eyre::Report {
    match response {
        ControlResponse::Error { message } => eyre::eyre!("Daemon error: {}", message),
        other => eyre::eyre!("Unexpected response: {:?}", other),
    }
}
