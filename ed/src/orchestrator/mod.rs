//! Daemon orchestration and the control command set
//!
//! | Command       | Effect                                                   |
//! |---------------|----------------------------------------------------------|
//! | `CACHE_INIT`  | new capture session, attached to the tee                 |
//! | `CACHE_START` | pause heartbeats, start capturing (optionally seeded)    |
//! | `CACHE_STOP`  | stop capturing, buffer the cache, resume heartbeats      |
//! | `CACHE_READ`  | next page of the buffered cache                          |
//! | `ECHO`        | payload returned as-is                                   |
//! | `OPTIONS`     | get or set `HEARTBEAT_INTERVAL`                          |
//! | `EXIT`        | stop everything                                          |

mod buffer;
mod core;
mod options;

pub use buffer::ReadBuffer;
pub use self::core::Orchestrator;
pub use options::{HEARTBEAT_INTERVAL, OptionsError, OptionsRequest, parse_options};
