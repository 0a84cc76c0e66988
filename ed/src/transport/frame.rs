//! Newline-delimited JSON framing

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use super::TransportError;

/// Largest frame accepted on any socket
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// One frame on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireFrame {
    /// Application message: subject, then the serialized event
    Message { subject: String, event: String },

    /// Subscriber asks for every subject starting with `prefix`
    Subscribe { prefix: String },

    /// Subscriber withdraws one earlier `Subscribe`
    Unsubscribe { prefix: String },

    /// Proxy acknowledges a subscription, or greets a tee consumer
    Subscribed { prefix: String },
}

impl WireFrame {
    pub fn message(subject: impl Into<String>, event: impl Into<String>) -> Self {
        Self::Message {
            subject: subject.into(),
            event: event.into(),
        }
    }

    pub fn parse(line: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn to_line(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Reads frames line by line
///
/// Both read methods are cancellation safe, so they can sit in a `select!`
/// or under a timeout without tearing frames.
pub struct FrameReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            lines: BufReader::new(inner).lines(),
        }
    }

    /// Next raw line, `None` once the peer has closed
    pub async fn next_line(&mut self) -> Result<Option<String>, TransportError> {
        match self.lines.next_line().await? {
            Some(line) if line.len() > MAX_FRAME_SIZE => Err(TransportError::FrameTooLarge(line.len())),
            other => Ok(other),
        }
    }

    /// Next parsed frame, `None` once the peer has closed
    pub async fn next_frame(&mut self) -> Result<Option<WireFrame>, TransportError> {
        match self.next_line().await? {
            Some(line) => WireFrame::parse(&line).map(Some),
            None => Ok(None),
        }
    }
}

/// Writes frames line by line
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_frame(&mut self, frame: &WireFrame) -> Result<(), TransportError> {
        let line = frame.to_line()?;
        self.write_line(&line).await
    }

    /// Write an already-encoded frame
    pub async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        if line.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge(line.len()));
        }
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
