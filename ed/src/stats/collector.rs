//! StatsCollector - counts relayed events and keeps the heartbeat going

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use eyre::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::counters::StatsCounters;
use super::heartbeat::{HeartbeatControl, HeartbeatError};
use super::writer::{CounterStore, restore_counters, run_writer};
use crate::client::{Publisher, Subscriber};
use crate::config::{StatsConfig, TransportConfig};
use crate::event::{HEARTBEAT_SUBJECT, heartbeat_payload, is_heartbeat};
use crate::transport::TransportError;

/// Owner of the collector task and the writer thread
pub struct StatsCollector {
    counters: Arc<StatsCounters>,
    heartbeat: Arc<HeartbeatControl>,
    collector_stop: Arc<AtomicBool>,
    writer_stop: Arc<AtomicBool>,
    collector: Option<JoinHandle<()>>,
    writer: Option<std::thread::JoinHandle<()>>,
}

impl StatsCollector {
    /// Attach to the proxy, restore persisted counters and start both loops
    pub async fn start(
        transport: &TransportConfig,
        config: &StatsConfig,
        store: Box<dyn CounterStore>,
        counters: Arc<StatsCounters>,
    ) -> Result<Self> {
        debug!(?config, "StatsCollector::start: called");
        let heartbeat = Arc::new(HeartbeatControl::new(
            config.heartbeat_tick(),
            config.heartbeat_interval_secs,
        )?);

        restore_counters(store.as_ref(), &counters).context("Failed to restore persisted counters")?;

        let mut subscriber = Subscriber::connect(&transport.egress)
            .await
            .context("Stats collector failed to connect to egress")?;
        subscriber
            .subscribe("")
            .await
            .context("Stats collector failed to subscribe")?;
        let publisher = Publisher::connect(&transport.ingress)
            .await
            .context("Stats collector failed to connect to ingress")?;

        let writer_stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let counters = counters.clone();
            let stop = writer_stop.clone();
            let interval = config.flush_interval();
            std::thread::Builder::new()
                .name("stats-writer".to_string())
                .spawn(move || run_writer(store, counters, stop, interval))
                .context("Failed to spawn stats writer thread")?
        };

        let collector_stop = Arc::new(AtomicBool::new(false));
        let collector = tokio::spawn(collect(
            subscriber,
            publisher,
            counters.clone(),
            heartbeat.clone(),
            collector_stop.clone(),
        ));

        info!(heartbeat_secs = heartbeat.interval_secs(), "StatsCollector started");
        Ok(Self {
            counters,
            heartbeat,
            collector_stop,
            writer_stop,
            collector: Some(collector),
            writer: Some(writer),
        })
    }

    pub fn counters(&self) -> &Arc<StatsCounters> {
        &self.counters
    }

    /// Stop emitting heartbeats; idle counting and the interval are kept
    pub fn pause(&self) {
        debug!("StatsCollector::pause: called");
        self.heartbeat.pause();
    }

    pub fn resume(&self) {
        debug!("StatsCollector::resume: called");
        self.heartbeat.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.heartbeat.is_paused()
    }

    pub fn set_heartbeat_interval(&self, secs: i64) -> Result<(), HeartbeatError> {
        debug!(secs, "StatsCollector::set_heartbeat_interval: called");
        self.heartbeat.set_interval(secs)
    }

    /// Current interval in seconds, rounded to whole ticks; -1 when disabled
    pub fn heartbeat_interval(&self) -> i64 {
        self.heartbeat.interval_secs()
    }

    /// Stop the collector, then the writer, which flushes one last time
    pub async fn shutdown(mut self) {
        debug!("StatsCollector::shutdown: called");
        self.collector_stop.store(true, Ordering::Release);
        if let Some(collector) = self.collector.take()
            && let Err(e) = collector.await
        {
            warn!(error = %e, "Stats collector task failed");
        }

        self.writer_stop.store(true, Ordering::Release);
        if let Some(writer) = self.writer.take() {
            match tokio::task::spawn_blocking(move || writer.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!("Stats writer thread panicked"),
                Err(e) => warn!(error = %e, "Failed to join stats writer"),
            }
        }
        info!("StatsCollector stopped");
    }
}

impl Drop for StatsCollector {
    fn drop(&mut self) {
        self.collector_stop.store(true, Ordering::Release);
        self.writer_stop.store(true, Ordering::Release);
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
    }
}

/// Collector loop
///
/// Every non-heartbeat event adds itself plus the gap reported for its
/// publisher to `published`. Each tick without traffic counts as idle; once
/// enough idle ticks pass a heartbeat goes out.
async fn collect(
    mut subscriber: Subscriber,
    mut publisher: Publisher,
    counters: Arc<StatsCounters>,
    heartbeat: Arc<HeartbeatControl>,
    stop: Arc<AtomicBool>,
) {
    let mut idle: u32 = 0;

    while !stop.load(Ordering::Acquire) {
        match subscriber.recv(heartbeat.tick()).await {
            Ok(received) => {
                if is_heartbeat(&received.subject, &received.event) {
                    continue;
                }
                counters.add_published(1 + received.missed);
                idle = 0;
            }
            Err(TransportError::Timeout) => idle = idle.saturating_add(1),
            Err(TransportError::Closed) => {
                warn!("collect: proxy connection closed");
                tokio::time::sleep(heartbeat.tick()).await;
                idle = idle.saturating_add(1);
            }
            Err(e) => {
                debug!(error = %e, "collect: receive error");
                idle = idle.saturating_add(1);
            }
        }

        if heartbeat.due(idle) {
            let payload = heartbeat_payload(Utc::now()).encode();
            match publisher.publish(HEARTBEAT_SUBJECT, &payload).await {
                Ok(sequence) => debug!(sequence, "collect: heartbeat sent"),
                Err(e) => warn!(error = %e, "collect: failed to send heartbeat"),
            }
            idle = 0;
        }
    }

    subscriber.close().await;
    publisher.close().await;
    debug!("collect: stopped");
}
