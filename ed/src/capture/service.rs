//! CaptureService - drives the capture task through its lifecycle

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::CaptureError;
use super::admission::{Admission, CaptureCache, Outcome};
use super::state::CaptureState;
use crate::config::CacheConfig;
use crate::stats::StatsCounters;
use crate::transport::{Endpoint, FrameReader, TransportError, WireFrame, connect};

/// One capture session
///
/// The cache is owned by the capture task while capturing: it goes in through
/// a oneshot on `Capturing` and comes back as the task's result on `Stopped`.
pub struct CaptureService {
    config: CacheConfig,
    tee: Endpoint,
    counters: Arc<StatsCounters>,
    state: CaptureState,
    stop: Arc<AtomicBool>,
    start_tx: Option<oneshot::Sender<Admission>>,
    task: Option<JoinHandle<Option<CaptureCache>>>,
    cache: CaptureCache,
}

impl CaptureService {
    pub fn new(config: CacheConfig, tee: Endpoint, counters: Arc<StatsCounters>) -> Self {
        Self {
            config,
            tee,
            counters,
            state: CaptureState::Uninitialized,
            stop: Arc::new(AtomicBool::new(false)),
            start_tx: None,
            task: None,
            cache: CaptureCache::default(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Advance exactly one lifecycle step
    ///
    /// `seed` is only looked at when moving to `Capturing`. On error the
    /// state is left as it was.
    pub async fn set_control(&mut self, next: CaptureState, seed: Vec<String>) -> Result<(), CaptureError> {
        debug!(from = %self.state, to = %next, seed = seed.len(), "CaptureService::set_control: called");
        if !self.state.can_advance_to(next) {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        match next {
            CaptureState::Initialized => self.spawn_task().await?,
            CaptureState::Capturing => self.begin(seed)?,
            CaptureState::Stopped => self.finish().await?,
            CaptureState::Uninitialized => {
                return Err(CaptureError::InvalidTransition {
                    from: self.state,
                    to: next,
                });
            }
        }

        self.state = next;
        info!(state = %next, "Capture state changed");
        Ok(())
    }

    /// Take the stopped session's cache, leaving an empty one behind
    pub fn read_cache(&mut self) -> Result<CaptureCache, CaptureError> {
        if self.state != CaptureState::Stopped {
            return Err(CaptureError::NotStopped(self.state));
        }
        Ok(std::mem::take(&mut self.cache))
    }

    async fn spawn_task(&mut self) -> Result<(), CaptureError> {
        let ready = Arc::new(AtomicBool::new(false));
        let (start_tx, start_rx) = oneshot::channel();

        let task = tokio::spawn(capture_loop(
            self.tee.clone(),
            self.config.recv_timeout(),
            self.stop.clone(),
            ready.clone(),
            start_rx,
            self.counters.clone(),
        ));

        for _ in 0..self.config.ready_retries {
            if ready.load(Ordering::Acquire) || task.is_finished() {
                break;
            }
            tokio::time::sleep(self.config.ready_poll()).await;
        }

        if !ready.load(Ordering::Acquire) {
            warn!(tee = %self.tee, "Capture task did not attach to the tee");
            task.abort();
            return Err(CaptureError::NotReady(self.config.ready_retries));
        }

        self.start_tx = Some(start_tx);
        self.task = Some(task);
        Ok(())
    }

    fn begin(&mut self, seed: Vec<String>) -> Result<(), CaptureError> {
        let admission = Admission::new(self.config.max_events, self.config.max_publishers, seed);
        self.start_tx
            .take()
            .ok_or(CaptureError::TaskGone)?
            .send(admission)
            .map_err(|_| CaptureError::TaskGone)
    }

    async fn finish(&mut self) -> Result<(), CaptureError> {
        tokio::time::sleep(self.config.drain()).await;
        self.stop.store(true, Ordering::Release);

        let task = self.task.take().ok_or(CaptureError::TaskGone)?;
        let cache = task.await?.ok_or(CaptureError::TaskGone)?;
        debug!(
            fifo = cache.fifo.len(),
            last = cache.last.len(),
            overflow = cache.overflow,
            "CaptureService::finish: cache collected"
        );
        self.cache = cache;
        Ok(())
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Capture task body
///
/// Attaches to the tee, signals `ready` once the proxy greets it, then reads
/// until `stop` is set. Nothing is kept until the cache arrives on
/// `start_rx`. Returns the cache, or `None` if capturing never started.
async fn capture_loop(
    tee: Endpoint,
    recv_timeout: Duration,
    stop: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    mut start_rx: oneshot::Receiver<Admission>,
    counters: Arc<StatsCounters>,
) -> Option<CaptureCache> {
    let stream = match connect(&tee).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "capture_loop: cannot attach to tee");
            return None;
        }
    };
    let mut reader = FrameReader::new(stream);

    loop {
        if stop.load(Ordering::Acquire) {
            return None;
        }
        match timeout(recv_timeout, reader.next_frame()).await {
            Ok(Ok(Some(WireFrame::Subscribed { .. }))) => break,
            Ok(Ok(Some(_))) | Err(_) => continue,
            Ok(Ok(None)) | Ok(Err(_)) => {
                warn!("capture_loop: tee closed before greeting");
                return None;
            }
        }
    }
    ready.store(true, Ordering::Release);
    debug!(%tee, "capture_loop: attached");

    let mut admission: Option<Admission> = None;
    while !stop.load(Ordering::Acquire) {
        let frame = match timeout(recv_timeout, reader.next_frame()).await {
            Ok(frame) => frame,
            Err(_) => continue,
        };

        match frame {
            Ok(Some(WireFrame::Message { event, .. })) => {
                if admission.is_none() {
                    admission = start_rx.try_recv().ok();
                }
                if let Some(admission) = admission.as_mut()
                    && admission.admit(event) == Outcome::Missed
                {
                    counters.inc_missed_cache();
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("capture_loop: tee closed");
                break;
            }
            Err(TransportError::Malformed(_) | TransportError::FrameTooLarge(_)) => {
                debug!("capture_loop: skipping bad frame");
            }
            Err(e) => {
                warn!(error = %e, "capture_loop: tee read failed");
                break;
            }
        }
    }

    if admission.is_none() {
        admission = start_rx.try_recv().ok();
    }
    debug!(started = admission.is_some(), "capture_loop: stopped");
    admission.map(Admission::into_cache)
}
