//! Supervisor lifecycle states.
//!
//! ```text
//!  NotStarted ──start()──> Starting ──ready ok──> Ready ──stop()──> Stopping ──> Stopped
//!                              │                    │
//!                              │ exit / timeout /   │ process exited
//!                              │ spawn failure      │ on its own
//!                              v                    v
//!                           Crashed <───────────────┘
//! ```

use thiserror::Error;

/// Lifecycle state of a supervised tool-server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorState {
    /// No process has been spawned yet
    #[default]
    NotStarted,

    /// Process spawned, waiting for readiness
    Starting,

    /// Process answered the readiness check
    Ready,

    /// Termination in progress
    Stopping,

    /// Process terminated and handle released
    Stopped,

    /// Process failed to spawn, exited before or after readiness, or never became ready
    Crashed,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::NotStarted => write!(f, "not_started"),
            SupervisorState::Starting => write!(f, "starting"),
            SupervisorState::Ready => write!(f, "ready"),
            SupervisorState::Stopping => write!(f, "stopping"),
            SupervisorState::Stopped => write!(f, "stopped"),
            SupervisorState::Crashed => write!(f, "crashed"),
        }
    }
}

impl SupervisorState {
    /// Whether the tool server can be reached.
    pub fn is_ready(&self) -> bool {
        matches!(self, SupervisorState::Ready)
    }

    /// Whether `start()` may spawn a process from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, SupervisorState::NotStarted)
    }

    /// Whether the supervisor has reached a state it never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Stopped | SupervisorState::Crashed)
    }
}

/// Internal supervisor failures. These are logged, never returned from
/// `start()` or `stop()`.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn tool server: {0}")]
    Spawn(String),

    #[error("Failed to signal tool server: {0}")]
    Signal(String),

    #[error("Failed to wait for tool server: {0}")]
    Wait(String),
}
