//! Error types shared across the workspace.
//!
//! All fallible operations in the supervision core return [`Result`]. The
//! variants fall into four families: state-machine misuse, missing spawn
//! configuration, per-child addressing, and propagated OS errors.

use thiserror::Error;

/// Result type alias for supervision operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the supervision core.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation was invoked while the state machine forbids it.
    ///
    /// Recoverable: the caller typically ignores it and retries on the
    /// next monitor tick.
    #[error("operation '{operation}' not allowed in state '{state}'")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// The group has no command configured.
    #[error("no command configured")]
    MissingCommand,

    /// The group has no argument vector configured.
    #[error("no argument vector configured")]
    MissingArgv,

    /// The group has no environment vector configured.
    #[error("no environment vector configured")]
    MissingEnvp,

    /// The group's desired replica count is zero.
    #[error("desired replica count is zero")]
    NoProcesses,

    /// A per-child operation addressed a nonexistent index.
    #[error("no child with index {index} (group has {count})")]
    InvalidChildId { index: usize, count: usize },

    /// A caller-supplied string contains an interior NUL byte and cannot
    /// be marshalled for `execve`.
    #[error("embedded NUL byte in {what}: {value:?}")]
    NulByte { what: &'static str, value: String },

    /// A system call failed and the failure is not recovered internally.
    #[error("system call failed: {0}")]
    Sys(#[from] nix::errno::Errno),
}

impl Error {
    /// Creates an `InvalidState` error for the given operation.
    pub fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Creates an `InvalidChildId` error.
    pub fn invalid_child_id(index: usize, count: usize) -> Self {
        Self::InvalidChildId { index, count }
    }

    /// Creates a `NulByte` marshalling error.
    pub fn nul_byte(what: &'static str, value: impl Into<String>) -> Self {
        Self::NulByte {
            what,
            value: value.into(),
        }
    }

    /// True if this error is state-machine misuse, the one family callers
    /// routinely swallow when racing against self-exiting children.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}
