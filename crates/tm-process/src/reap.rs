//! Non-blocking child reaping.
//!
//! Each tracked pid is reaped at most once; after `waitpid` collects the
//! status the kernel may recycle the pid, so callers must drop it
//! immediately.

use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::debug;

use tm_common::Result;

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Normal exit with the given 8-bit status.
    Code(u8),
    /// Terminated by a signal.
    Signal(Signal),
}

impl ExitDisposition {
    /// Exit code, when the child exited normally.
    pub fn code(&self) -> Option<u8> {
        match self {
            Self::Code(c) => Some(*c),
            Self::Signal(_) => None,
        }
    }

    /// Terminating signal, when the child was signaled.
    pub fn signal(&self) -> Option<Signal> {
        match self {
            Self::Code(_) => None,
            Self::Signal(s) => Some(*s),
        }
    }
}

/// Polls `pid` with `waitpid(WNOHANG)`.
///
/// Returns `Ok(None)` while the child is still alive, `Ok(Some(..))` once
/// its status has been collected. A successful reap releases the pid back
/// to the kernel.
pub fn try_reap(pid: Pid) -> Result<Option<ExitDisposition>> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG))? {
        WaitStatus::StillAlive => Ok(None),
        WaitStatus::Exited(_, code) => {
            let disposition = ExitDisposition::Code(code as u8);
            debug!(pid = pid.as_raw(), code, "reaped exited child");
            Ok(Some(disposition))
        }
        WaitStatus::Signaled(_, signal, _) => {
            debug!(pid = pid.as_raw(), %signal, "reaped signaled child");
            Ok(Some(ExitDisposition::Signal(signal)))
        }
        // Stop/continue events are not requested (no WUNTRACED/WCONTINUED);
        // treat anything else as still running.
        _ => Ok(None),
    }
}
