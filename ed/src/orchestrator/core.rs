//! Orchestrator - owns the daemon's components and serves control requests

use std::collections::BTreeMap;
use std::sync::Arc;

use eyre::{Context, Result};
use kvstore::Store;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::buffer::ReadBuffer;
use super::options::{HEARTBEAT_INTERVAL, OptionsRequest, parse_options};
use crate::capture::{CaptureError, CaptureService, CaptureState};
use crate::config::Config;
use crate::ipc::{ControlRequest, ControlResponse, read_request, send_response};
use crate::stats::{CounterStore, KvCounterStore, StatsCollector, StatsCounters};
use crate::transport::{Endpoint, Proxy, ProxyHandle, bind, cleanup_socket};

/// The daemon: one proxy, one stats collector, and at most one capture
/// session at a time
///
/// Commands are handled strictly one after another.
pub struct Orchestrator {
    config: Config,
    control: UnixListener,
    control_endpoint: Endpoint,
    proxy: ProxyHandle,
    stats: StatsCollector,
    counters: Arc<StatsCounters>,
    capture: Option<CaptureService>,
    buffer: ReadBuffer,
}

impl Orchestrator {
    /// Start every component, persisting counters to the configured database
    pub async fn start(config: Config) -> Result<Self> {
        let store = Store::open(&config.stats.db_path)
            .context(format!("Failed to open counter store {}", config.stats.db_path.display()))?;
        let store = KvCounterStore::new(store, config.stats.table.clone());
        Self::start_with_store(config, Box::new(store)).await
    }

    /// Start every component with a caller-supplied counter store
    pub async fn start_with_store(config: Config, store: Box<dyn CounterStore>) -> Result<Self> {
        debug!(?config, "Orchestrator::start_with_store: called");
        config.validate()?;

        let proxy = Proxy::bind(&config.transport).context("Failed to bind proxy endpoints")?.start();

        let counters = Arc::new(StatsCounters::new());
        let stats = StatsCollector::start(&config.transport, &config.stats, store, counters.clone())
            .await
            .context("Failed to start stats collector")?;

        let control_endpoint = config.transport.control.clone();
        let control = bind(&control_endpoint).context("Failed to bind control socket")?;
        info!(control = %control_endpoint, "Control socket listening");

        Ok(Self {
            config,
            control,
            control_endpoint,
            proxy,
            stats,
            counters,
            capture: None,
            buffer: ReadBuffer::new(),
        })
    }

    pub fn counters(&self) -> &Arc<StatsCounters> {
        &self.counters
    }

    /// Serve control requests until EXIT or a shutdown signal, then stop
    /// everything
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!("Orchestrator running");
        loop {
            tokio::select! {
                accepted = self.control.accept() => {
                    let mut stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            warn!(error = %e, "Control accept error");
                            continue;
                        }
                    };

                    let request = match read_request(&mut stream).await {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(error = %e, "Bad control request");
                            let response = ControlResponse::Error { message: e.to_string() };
                            let _ = send_response(&mut stream, &response).await;
                            continue;
                        }
                    };

                    let exit = matches!(request, ControlRequest::Exit);
                    let response = self.handle(request).await;
                    if let Err(e) = send_response(&mut stream, &response).await {
                        warn!(error = %e, "Failed to send control response");
                    }
                    if exit {
                        info!("EXIT requested");
                        break;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Handle one control request
    pub async fn handle(&mut self, request: ControlRequest) -> ControlResponse {
        debug!(?request, "Orchestrator::handle: called");
        let result = match request {
            ControlRequest::CacheInit => self.cache_init().await,
            ControlRequest::CacheStart { events } => self.cache_start(events).await,
            ControlRequest::CacheStop => self.cache_stop().await,
            ControlRequest::CacheRead => Ok(ControlResponse::Events {
                events: self.buffer.next_page(self.config.cache.page_size),
            }),
            ControlRequest::Echo { payload } => Ok(ControlResponse::Echo { payload }),
            ControlRequest::Options { options } => self.options(options.as_ref()),
            ControlRequest::Exit => Ok(ControlResponse::Ok),
        };

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Control request failed");
            ControlResponse::Error {
                message: format!("{:#}", e),
            }
        })
    }

    async fn cache_init(&mut self) -> Result<ControlResponse> {
        self.capture = None;
        self.buffer.clear();

        let capture = self.capture.insert(CaptureService::new(
            self.config.cache.clone(),
            self.config.transport.capture.clone(),
            self.counters.clone(),
        ));
        capture.set_control(CaptureState::Initialized, Vec::new()).await?;
        Ok(ControlResponse::Ok)
    }

    async fn cache_start(&mut self, seed: Vec<String>) -> Result<ControlResponse> {
        let capture = self.capture.as_mut().ok_or_else(no_capture)?;
        if !capture.state().can_advance_to(CaptureState::Capturing) {
            return Err(CaptureError::InvalidTransition {
                from: capture.state(),
                to: CaptureState::Capturing,
            }
            .into());
        }

        self.stats.pause();
        if let Err(e) = capture.set_control(CaptureState::Capturing, seed).await {
            self.stats.resume();
            return Err(e.into());
        }
        Ok(ControlResponse::Ok)
    }

    async fn cache_stop(&mut self) -> Result<ControlResponse> {
        let capture = self.capture.as_mut().ok_or_else(no_capture)?;

        match capture.set_control(CaptureState::Stopped, Vec::new()).await {
            Ok(()) => {}
            Err(e @ CaptureError::InvalidTransition { .. }) => return Err(e.into()),
            Err(e) => {
                // The session cannot be recovered; drop it and carry on
                self.capture = None;
                self.stats.resume();
                return Err(e.into());
            }
        }

        let cache = capture.read_cache()?;
        let lost = cache.lost();
        self.buffer.load(cache);
        self.capture = None;
        self.stats.resume();

        info!(events = self.buffer.len(), lost, "Capture stopped");
        Ok(ControlResponse::CacheStopped {
            events: self.buffer.len(),
            lost,
        })
    }

    fn options(&mut self, options: Option<&serde_json::Map<String, serde_json::Value>>) -> Result<ControlResponse> {
        if let OptionsRequest::SetHeartbeatInterval(secs) = parse_options(options)? {
            self.stats.set_heartbeat_interval(secs)?;
            info!(secs, applied = self.stats.heartbeat_interval(), "Heartbeat interval changed");
        }

        let mut options = BTreeMap::new();
        options.insert(HEARTBEAT_INTERVAL.to_string(), self.stats.heartbeat_interval());
        Ok(ControlResponse::Options { options })
    }

    /// Stop every component
    pub async fn shutdown(self) {
        info!("Orchestrator shutting down");
        drop(self.capture);
        self.stats.shutdown().await;
        self.proxy.shutdown().await;
        cleanup_socket(&self.control_endpoint);
        info!("Orchestrator stopped");
    }
}

fn no_capture() -> eyre::Report {
    eyre::eyre!("No capture session; send CACHE_INIT first")
}
