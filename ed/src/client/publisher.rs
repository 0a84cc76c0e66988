//! Publisher side of the client library

use tokio::net::UnixStream;
use tracing::debug;
use uuid::Uuid;

use crate::event::Event;
use crate::transport::{Endpoint, FrameWriter, TransportError, WireFrame, connect};

/// Connection to the proxy ingress that stamps outgoing events
///
/// Each publisher has its own runtime id and a sequence counter starting at
/// 1, so subscribers can spot gaps per publisher.
pub struct Publisher {
    writer: FrameWriter<UnixStream>,
    runtime_id: String,
    sequence: u64,
}

impl Publisher {
    /// Connect with a fresh runtime id
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        Self::connect_as(endpoint, Uuid::now_v7().to_string()).await
    }

    /// Connect reusing a known runtime id
    pub async fn connect_as(endpoint: &Endpoint, runtime_id: impl Into<String>) -> Result<Self, TransportError> {
        let runtime_id = runtime_id.into();
        debug!(%endpoint, %runtime_id, "Publisher::connect: called");
        let stream = connect(endpoint).await?;
        Ok(Self {
            writer: FrameWriter::new(stream),
            runtime_id,
            sequence: 0,
        })
    }

    pub fn runtime_id(&self) -> &str {
        &self.runtime_id
    }

    /// Sequence number of the last published event, 0 before the first
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wrap `payload` in a new event and publish it; returns its sequence
    pub async fn publish(&mut self, subject: &str, payload: &str) -> Result<u64, TransportError> {
        let sequence = self.sequence + 1;
        let event = Event::new(self.runtime_id.clone(), sequence, payload);
        self.send(subject, event.encode()?).await?;
        self.sequence = sequence;
        Ok(sequence)
    }

    /// Publish a pre-built event as-is
    pub async fn publish_event(&mut self, subject: &str, event: &Event) -> Result<(), TransportError> {
        self.send(subject, event.encode()?).await
    }

    /// Publish an already-serialized event without looking at it
    pub async fn publish_raw(&mut self, subject: &str, serialized: &str) -> Result<(), TransportError> {
        self.send(subject, serialized.to_string()).await
    }

    async fn send(&mut self, subject: &str, serialized: String) -> Result<(), TransportError> {
        self.writer.write_frame(&WireFrame::message(subject, serialized)).await
    }

    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
