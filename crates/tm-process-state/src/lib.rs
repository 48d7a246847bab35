//! Per-child lifecycle state.
//!
//! The discriminant a supervised child moves through. Transitions are owned
//! by the child supervisor; this crate only defines the states and the
//! queries the layers above share.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Not running; eligible to be started.
    Stopped,
    /// Spawned, inside the start grace period.
    Starting,
    /// Survived the grace period.
    Running,
    /// Stop signal sent; awaiting exit or the kill deadline.
    Stopping,
    /// Terminated and reaped (or observed gone).
    Exited,
    /// Force-killed with SIGKILL.
    Killed,
    /// Restart cooldown between attempts.
    Backoff,
}

impl ProcessState {
    /// The child has an OS-side process (spawned, not yet reaped).
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    /// The child ended and will stay ended absent outside action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Killed)
    }

    /// A start attempt is allowed from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// A graceful stop is allowed from this state.
    pub fn can_stop(&self) -> bool {
        matches!(self, Self::Running | Self::Starting)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Exited => "exited",
            Self::Killed => "killed",
            Self::Backoff => "backoff",
        };
        write!(f, "{}", name)
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_states() {
        assert!(ProcessState::Starting.is_alive());
        assert!(ProcessState::Running.is_alive());
        assert!(ProcessState::Stopping.is_alive());
        assert!(!ProcessState::Stopped.is_alive());
        assert!(!ProcessState::Backoff.is_alive());
        assert!(!ProcessState::Exited.is_alive());
        assert!(!ProcessState::Killed.is_alive());
    }

    #[test]
    fn terminal_states() {
        assert!(ProcessState::Exited.is_terminal());
        assert!(ProcessState::Killed.is_terminal());
        assert!(!ProcessState::Backoff.is_terminal());
    }

    #[test]
    fn start_and_stop_eligibility() {
        assert!(ProcessState::Stopped.can_start());
        assert!(!ProcessState::Backoff.can_start());
        assert!(ProcessState::Running.can_stop());
        assert!(ProcessState::Starting.can_stop());
        assert!(!ProcessState::Stopping.can_stop());
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(ProcessState::Backoff.to_string(), "backoff");
        assert_eq!(ProcessState::Stopping.to_string(), "stopping");
    }

    #[test]
    fn serde_round_trip_uses_snake_case() {
        let json = serde_json::to_string(&ProcessState::Starting).unwrap();
        assert_eq!(json, "\"starting\"");
        let back: ProcessState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProcessState::Starting);
    }
}
