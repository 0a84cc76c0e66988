//! Subscriber side of the client library

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::event::{Event, decode_valid};
use crate::transport::{Endpoint, FrameReader, FrameWriter, TransportError, WireFrame, connect};

/// How long `subscribe` waits for the proxy's acknowledgement
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One event delivered to a subscriber
#[derive(Debug, Clone)]
pub struct Received {
    pub subject: String,
    pub event: Event,
    /// The event exactly as it travelled
    pub serialized: String,
    /// Events from the same publisher skipped since the previous delivery
    pub missed: u64,
}

/// Connection to the proxy egress
pub struct Subscriber {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    /// Messages that arrived while waiting for a subscription ack
    pending: VecDeque<(String, String)>,
    last_seen: HashMap<String, u64>,
}

impl Subscriber {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        debug!(%endpoint, "Subscriber::connect: called");
        let (read, write) = connect(endpoint).await?.into_split();
        Ok(Self {
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
            pending: VecDeque::new(),
            last_seen: HashMap::new(),
        })
    }

    /// Subscribe to subjects starting with `prefix` (`""` for everything)
    ///
    /// Returns once the proxy has the filter in force, so anything published
    /// afterwards is delivered.
    pub async fn subscribe(&mut self, prefix: &str) -> Result<(), TransportError> {
        debug!(%prefix, "Subscriber::subscribe: called");
        self.writer
            .write_frame(&WireFrame::Subscribe {
                prefix: prefix.to_string(),
            })
            .await?;

        let deadline = Instant::now() + SUBSCRIBE_TIMEOUT;
        loop {
            let frame = timeout_at(deadline, self.reader.next_frame())
                .await
                .map_err(|_| TransportError::Timeout)?;
            match frame? {
                Some(WireFrame::Subscribed { prefix: acked }) if acked == prefix => return Ok(()),
                Some(WireFrame::Message { subject, event }) => self.pending.push_back((subject, event)),
                Some(other) => debug!(?other, "Subscriber::subscribe: ignoring frame"),
                None => return Err(TransportError::Closed),
            }
        }
    }

    pub async fn unsubscribe(&mut self, prefix: &str) -> Result<(), TransportError> {
        self.writer
            .write_frame(&WireFrame::Unsubscribe {
                prefix: prefix.to_string(),
            })
            .await
    }

    /// Wait up to `wait` for the next valid event
    ///
    /// Malformed events are skipped. [`TransportError::Timeout`] means
    /// nothing arrived in time; [`TransportError::Closed`] means the proxy
    /// went away.
    pub async fn recv(&mut self, wait: Duration) -> Result<Received, TransportError> {
        let deadline = Instant::now() + wait;
        loop {
            let (subject, serialized) = match self.pending.pop_front() {
                Some(message) => message,
                None => {
                    let frame = timeout_at(deadline, self.reader.next_frame())
                        .await
                        .map_err(|_| TransportError::Timeout)?;
                    match frame {
                        Ok(Some(WireFrame::Message { subject, event })) => (subject, event),
                        Ok(Some(_)) => continue,
                        Ok(None) => return Err(TransportError::Closed),
                        Err(TransportError::Malformed(e)) => {
                            debug!(error = %e, "Subscriber::recv: skipping malformed frame");
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            let (event, key) = match decode_valid(&serialized) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!(error = %e, %subject, "Subscriber::recv: skipping invalid event");
                    continue;
                }
            };

            let missed = self.track(&key.runtime_id, key.sequence);
            return Ok(Received {
                subject,
                event,
                serialized,
                missed,
            });
        }
    }

    /// Record the sequence and report the gap since the last one seen
    fn track(&mut self, runtime_id: &str, sequence: u64) -> u64 {
        match self.last_seen.insert(runtime_id.to_string(), sequence) {
            Some(previous) if sequence > previous => sequence - previous - 1,
            _ => 0,
        }
    }

    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_track_reports_sequence_gaps() {
        let (a, _b) = tokio::net::UnixStream::pair().unwrap();
        let (read, write) = a.into_split();
        let mut subscriber = Subscriber {
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
            pending: VecDeque::new(),
            last_seen: HashMap::new(),
        };

        assert_eq!(subscriber.track("r1", 5), 0);
        assert_eq!(subscriber.track("r1", 6), 0);
        assert_eq!(subscriber.track("r1", 9), 2);
        assert_eq!(subscriber.track("r2", 1), 0);
        // A restarted sequence is not a loss
        assert_eq!(subscriber.track("r1", 1), 0);

        assert_eq!(subscriber.track("r3", u64::MAX), 0);
        assert_eq!(subscriber.track("r3", 1), 0);
        assert_eq!(subscriber.track("r3", u64::MAX), u64::MAX - 2);
    }
}
