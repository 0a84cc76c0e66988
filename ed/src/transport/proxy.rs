//! Proxy - relays publisher traffic to subscribers and tees it for capture
//!
//! The proxy keeps no state beyond its connections. Publishers write message
//! frames to the ingress socket; each subscriber on the egress socket gets the
//! messages whose subject matches one of its prefixes; every tee consumer gets
//! a copy of everything, subscription traffic included.

use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::frame::{FrameReader, FrameWriter, WireFrame};
use super::socket::{bind, cleanup_socket};
use super::{Endpoint, TransportError};
use crate::config::TransportConfig;

/// A message accepted from a publisher, kept in both forms
#[derive(Debug)]
struct Relayed {
    subject: String,
    line: String,
}

/// Proxy with all three endpoints bound but not yet relaying
pub struct Proxy {
    ingress: UnixListener,
    egress: UnixListener,
    tee: UnixListener,
    endpoints: Vec<Endpoint>,
    capacity: usize,
}

impl Proxy {
    /// Bind ingress, egress and tee endpoints
    pub fn bind(config: &TransportConfig) -> Result<Self, TransportError> {
        debug!(ingress = %config.ingress, egress = %config.egress, tee = %config.capture, "Proxy::bind: called");
        let ingress = bind(&config.ingress)?;
        let egress = bind(&config.egress)?;
        let tee = bind(&config.capture)?;

        Ok(Self {
            ingress,
            egress,
            tee,
            endpoints: vec![config.ingress.clone(), config.egress.clone(), config.capture.clone()],
            capacity: config.channel_capacity.max(1),
        })
    }

    /// Start relaying on a dedicated task
    pub fn start(self) -> ProxyHandle {
        let endpoints = self.endpoints.clone();
        let task = tokio::spawn(relay(self));
        info!(?endpoints, "Proxy started");
        ProxyHandle {
            task: Some(task),
            endpoints,
        }
    }
}

/// Owner of a running proxy; dropping it tears the proxy down
pub struct ProxyHandle {
    task: Option<JoinHandle<()>>,
    endpoints: Vec<Endpoint>,
}

impl ProxyHandle {
    /// Stop relaying, close every connection and remove the socket files
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        info!("Proxy stopped");
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        for endpoint in &self.endpoints {
            cleanup_socket(endpoint);
        }
    }
}

/// Accept loop; connection tasks live in a `JoinSet` so aborting the relay
/// closes them all
async fn relay(proxy: Proxy) {
    let (fanout_tx, _) = broadcast::channel::<Arc<Relayed>>(proxy.capacity);
    let (tee_tx, _) = broadcast::channel::<Arc<str>>(proxy.capacity);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = proxy.ingress.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("relay: publisher connected");
                    connections.spawn(serve_publisher(stream, fanout_tx.clone(), tee_tx.clone()));
                }
                Err(e) => warn!(error = %e, "relay: ingress accept error"),
            },
            accepted = proxy.egress.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("relay: subscriber connected");
                    connections.spawn(serve_subscriber(stream, fanout_tx.subscribe(), tee_tx.clone()));
                }
                Err(e) => warn!(error = %e, "relay: egress accept error"),
            },
            accepted = proxy.tee.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("relay: tee consumer connected");
                    connections.spawn(serve_tee(stream, tee_tx.subscribe()));
                }
                Err(e) => warn!(error = %e, "relay: tee accept error"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_publisher(stream: UnixStream, fanout: broadcast::Sender<Arc<Relayed>>, tee: broadcast::Sender<Arc<str>>) {
    let mut reader = FrameReader::new(stream);
    loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(TransportError::FrameTooLarge(size)) => {
                warn!(size, "serve_publisher: dropping oversized frame");
                continue;
            }
            Err(e) => {
                debug!(error = %e, "serve_publisher: read error");
                break;
            }
        };

        match WireFrame::parse(&line) {
            Ok(WireFrame::Message { subject, .. }) => {
                // Send errors only mean nobody is listening right now
                let _ = tee.send(Arc::from(line.as_str()));
                let _ = fanout.send(Arc::new(Relayed { subject, line }));
            }
            Ok(other) => debug!(?other, "serve_publisher: ignoring non-message frame"),
            Err(e) => debug!(error = %e, "serve_publisher: ignoring malformed frame"),
        }
    }
    debug!("serve_publisher: publisher disconnected");
}

async fn serve_subscriber(
    stream: UnixStream,
    mut fanout: broadcast::Receiver<Arc<Relayed>>,
    tee: broadcast::Sender<Arc<str>>,
) {
    let (read, write) = stream.into_split();
    let mut reader = FrameReader::new(read);
    let mut writer = FrameWriter::new(write);
    let mut prefixes: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            line = reader.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(TransportError::FrameTooLarge(_)) => continue,
                    Err(e) => {
                        debug!(error = %e, "serve_subscriber: read error");
                        break;
                    }
                };
                let _ = tee.send(Arc::from(line.as_str()));

                match WireFrame::parse(&line) {
                    Ok(WireFrame::Subscribe { prefix }) => {
                        debug!(%prefix, "serve_subscriber: subscribe");
                        prefixes.push(prefix.clone());
                        if writer.write_frame(&WireFrame::Subscribed { prefix }).await.is_err() {
                            break;
                        }
                    }
                    Ok(WireFrame::Unsubscribe { prefix }) => {
                        debug!(%prefix, "serve_subscriber: unsubscribe");
                        if let Some(pos) = prefixes.iter().position(|p| *p == prefix) {
                            prefixes.remove(pos);
                        }
                    }
                    Ok(other) => debug!(?other, "serve_subscriber: ignoring frame"),
                    Err(e) => debug!(error = %e, "serve_subscriber: ignoring malformed frame"),
                }
            }
            relayed = fanout.recv() => match relayed {
                Ok(msg) => {
                    if prefixes.iter().any(|p| msg.subject.starts_with(p.as_str()))
                        && writer.write_line(&msg.line).await.is_err()
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "serve_subscriber: subscriber lagging, frames dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!("serve_subscriber: subscriber disconnected");
}

async fn serve_tee(stream: UnixStream, mut tee: broadcast::Receiver<Arc<str>>) {
    let mut writer = FrameWriter::new(stream);
    let greeting = WireFrame::Subscribed { prefix: String::new() };
    if writer.write_frame(&greeting).await.is_err() {
        return;
    }

    loop {
        match tee.recv().await {
            Ok(line) => {
                if writer.write_line(&line).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "serve_tee: tee consumer lagging, frames dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("serve_tee: tee consumer disconnected");
}
