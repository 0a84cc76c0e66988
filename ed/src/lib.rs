//! eventd - event broker daemon
//!
//! Fans out best-effort events from many publisher processes to any number of
//! subscribers, while keeping an on-demand capture cache of recent traffic and
//! live publish/miss counters with a heartbeat.
//!
//! # Modules
//!
//! - [`event`] - Event model and codec
//! - [`transport`] - Unix socket frames and the relaying proxy
//! - [`client`] - Publisher and subscriber library
//! - [`capture`] - Bounded capture cache with three-phase admission
//! - [`stats`] - Counters, heartbeat and counter persistence
//! - [`orchestrator`] - The daemon and its control commands
//! - [`ipc`] - Control channel messages, listener helpers and client
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod capture;
pub mod cli;
pub mod client;
pub mod config;
pub mod event;
pub mod ipc;
pub mod orchestrator;
pub mod stats;
pub mod transport;

pub use capture::{CaptureCache, CaptureError, CaptureService, CaptureState};
pub use client::{Publisher, Received, Subscriber};
pub use config::{CacheConfig, Config, StatsConfig, TransportConfig};
pub use event::{Event, EventError, EventPayload};
pub use ipc::{ControlClient, ControlRequest, ControlResponse};
pub use orchestrator::Orchestrator;
pub use stats::{StatsCollector, StatsCounters};
pub use transport::{Endpoint, Proxy, TransportError};

/// Crate version reported by `--version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
