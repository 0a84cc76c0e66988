//! Capture lifecycle states

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a capture is in its lifecycle
///
/// States only ever advance one step at a time:
/// `Uninitialized → Initialized → Capturing → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Uninitialized,
    Initialized,
    Capturing,
    Stopped,
}

impl CaptureState {
    /// The only state this one may advance to
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Uninitialized => Some(Self::Initialized),
            Self::Initialized => Some(Self::Capturing),
            Self::Capturing => Some(Self::Stopped),
            Self::Stopped => None,
        }
    }

    pub fn can_advance_to(self, to: Self) -> bool {
        self.next() == Some(to)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Capturing => "capturing",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_step_transitions() {
        use CaptureState::*;

        assert!(Uninitialized.can_advance_to(Initialized));
        assert!(Initialized.can_advance_to(Capturing));
        assert!(Capturing.can_advance_to(Stopped));

        assert!(!Uninitialized.can_advance_to(Capturing));
        assert!(!Uninitialized.can_advance_to(Stopped));
        assert!(!Initialized.can_advance_to(Initialized));
        assert!(!Capturing.can_advance_to(Initialized));
        assert!(!Stopped.can_advance_to(Uninitialized));
        assert_eq!(Stopped.next(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(CaptureState::Capturing.to_string(), "capturing");
    }
}
