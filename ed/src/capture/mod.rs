//! Bounded capture cache fed from the proxy tee

mod admission;
mod service;
mod state;

use thiserror::Error;
use tokio::task::JoinError;

pub use admission::{Admission, CaptureCache, Outcome, Phase};
pub use service::CaptureService;
pub use state::CaptureState;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Invalid capture transition {from} -> {to}")]
    InvalidTransition { from: CaptureState, to: CaptureState },

    #[error("Capture task not ready after {0} attempts")]
    NotReady(u32),

    #[error("Capture task is gone")]
    TaskGone,

    #[error("Capture task failed: {0}")]
    Join(#[from] JoinError),

    #[error("Capture cache is only readable once stopped (state: {0})")]
    NotStopped(CaptureState),
}
