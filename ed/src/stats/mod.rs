//! Live publish/miss counters and the heartbeat
//!
//! Two loops cooperate through [`StatsCounters`]: the collector task counts
//! what the proxy relays and publishes heartbeats when the stream goes quiet,
//! and the writer thread flushes changed counters to the store.

mod collector;
mod counters;
mod heartbeat;
mod writer;

pub use collector::StatsCollector;
pub use counters::{MISSED_CACHE, PUBLISHED, StatsCounters};
pub use heartbeat::{HeartbeatControl, HeartbeatError};
pub use writer::{CounterStore, KvCounterStore, VALUE_FIELD, flush, restore_counters};
