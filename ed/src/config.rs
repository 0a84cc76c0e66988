//! eventd configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::transport::Endpoint;

const APP_DIR: &str = "eventd";

/// Main eventd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Socket endpoints
    pub transport: TransportConfig,

    /// Capture cache limits and timings
    pub cache: CacheConfig,

    /// Counter persistence and heartbeat
    pub stats: StatsConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from("eventd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(APP_DIR).join("eventd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => [
                Some(PathBuf::from("eventd.yml")),
                dirs::config_dir().map(|d| d.join(APP_DIR).join("eventd.yml")),
            ]
            .into_iter()
            .flatten()
            .collect(),
        };

        candidates
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_events == 0 {
            return Err(eyre::eyre!("cache.max-events must be at least 1"));
        }
        if self.cache.page_size == 0 {
            return Err(eyre::eyre!("cache.page-size must be at least 1"));
        }
        if self.stats.heartbeat_tick_ms == 0 {
            return Err(eyre::eyre!("stats.heartbeat-tick-ms must be at least 1"));
        }
        if self.stats.heartbeat_interval_secs < -1 {
            return Err(eyre::eyre!(
                "stats.heartbeat-interval-secs must be -1 (disabled) or greater, got {}",
                self.stats.heartbeat_interval_secs
            ));
        }
        if self.stats.table.is_empty() {
            return Err(eyre::eyre!("stats.table must not be empty"));
        }
        Ok(())
    }

    /// Configuration with every socket and file under `dir`
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            transport: TransportConfig::in_dir(dir),
            stats: StatsConfig {
                db_path: dir.join("counters.db"),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Socket endpoints for the proxy and the control channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Publishers connect here
    pub ingress: Endpoint,

    /// Subscribers connect here
    pub egress: Endpoint,

    /// Tee of all proxied traffic, read by the capture service
    pub capture: Endpoint,

    /// Control requests
    pub control: Endpoint,

    /// Frames buffered per slow subscriber before the oldest are dropped
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,
}

impl TransportConfig {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ingress: Endpoint::from_path(dir.join("ingress.sock")),
            egress: Endpoint::from_path(dir.join("egress.sock")),
            capture: Endpoint::from_path(dir.join("capture.sock")),
            control: Endpoint::from_path(dir.join("control.sock")),
            channel_capacity: 10_000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        let dir = dirs::runtime_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(APP_DIR);
        Self::in_dir(&dir)
    }
}

/// Capture cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// FIFO capacity before overflow mode
    #[serde(rename = "max-events")]
    pub max_events: usize,

    /// Expected publisher count, used to pre-size the last-event map
    #[serde(rename = "max-publishers")]
    pub max_publishers: usize,

    /// Grace period before stopping capture, for in-flight events
    #[serde(rename = "drain-ms")]
    pub drain_ms: u64,

    /// Capture loop receive timeout
    #[serde(rename = "recv-timeout-ms")]
    pub recv_timeout_ms: u64,

    /// Readiness polls before CACHE_INIT gives up
    #[serde(rename = "ready-retries")]
    pub ready_retries: u32,

    #[serde(rename = "ready-poll-ms")]
    pub ready_poll_ms: u64,

    /// Events per CACHE_READ response
    #[serde(rename = "page-size")]
    pub page_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            max_publishers: 1_000,
            drain_ms: 1_000,
            recv_timeout_ms: 300,
            ready_retries: 20,
            ready_poll_ms: 50,
            page_size: 100,
        }
    }
}

impl CacheConfig {
    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }
}

/// Counter persistence and heartbeat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// SQLite database holding the counters
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,

    /// Table the counters are written to
    pub table: String,

    /// Seconds of idleness before a heartbeat; -1 disables
    #[serde(rename = "heartbeat-interval-secs")]
    pub heartbeat_interval_secs: i64,

    /// Collector receive timeout, the unit heartbeat intervals are counted in
    #[serde(rename = "heartbeat-tick-ms")]
    pub heartbeat_tick_ms: u64,

    /// Writer loop period
    #[serde(rename = "flush-interval-ms")]
    pub flush_interval_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("counters.db"),
            table: "COUNTERS_EVENTS".to_string(),
            heartbeat_interval_secs: 2,
            heartbeat_tick_ms: 1_000,
            flush_interval_ms: 50,
        }
    }
}

impl StatsConfig {
    pub fn heartbeat_tick(&self) -> Duration {
        Duration::from_millis(self.heartbeat_tick_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}
