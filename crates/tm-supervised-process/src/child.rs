//! The per-child state machine.
//!
//! ```text
//!         start()             monitor (grace)           stop(sig,t)
//! stopped ───────► starting ────────────────► running ─────────────► stopping
//!    ▲                │                          │                       │
//!    │ reset()        │ reaped / gone            │ reaped               │ deadline
//!    │                ▼                          ▼                       ▼
//!    │             exited ◄──────────────────── reap                  killed
//!    │                │
//!    │ enter_backoff()│
//!    │                ▼
//!    └──── backoff ───┘
//!          finish_backoff (group-driven)
//! ```
//!
//! All timing marks are monotonic nanoseconds; wall-clock time appears only
//! in the reporting snapshot.

use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use tm_common::{clock, Error, Result};
use tm_process::{deliver, force_kill, is_alive, try_reap, ExitDisposition, SpawnParams};
use tm_process_state::ProcessState;

use crate::status::ProcessStatus;

/// Per-child timing settings, fixed at construction by the owning group.
#[derive(Debug, Clone, Copy)]
pub struct ChildSettings {
    /// Seconds a fresh child must survive before `starting` becomes
    /// `running`. Zero promotes on the first monitor pass.
    pub start_grace_secs: u64,
    /// Seconds past `running` after which the child counts as stable.
    pub healthy_after_secs: u64,
    /// Seconds spent in `backoff` between restart attempts.
    pub backoff_delay_secs: u64,
}

impl Default for ChildSettings {
    fn default() -> Self {
        Self {
            start_grace_secs: 0,
            healthy_after_secs: 1,
            backoff_delay_secs: 1,
        }
    }
}

/// One supervised child process.
///
/// A plain value: it owns nothing but the pid handed out by the kernel.
/// The owner must call [`monitor`](Self::monitor) repeatedly; state only
/// advances inside these calls.
#[derive(Debug)]
pub struct SupervisedProcess {
    id: usize,
    settings: ChildSettings,
    pid: Option<Pid>,
    state: ProcessState,
    start_time_ns: u64,
    start_check_ns: u64,
    started_ns: u64,
    stop_deadline_ns: u64,
    backoff_until_ns: u64,
    exit_code: Option<u8>,
    exit_signal: Option<Signal>,
    failed_start: bool,
    sent_kill: bool,
    retries: u32,
    started_at: Option<DateTime<Utc>>,
}

impl SupervisedProcess {
    /// Creates a child in the `stopped` state with the given stable index.
    pub fn new(id: usize, settings: ChildSettings) -> Self {
        Self {
            id,
            settings,
            pid: None,
            state: ProcessState::Stopped,
            start_time_ns: 0,
            start_check_ns: 0,
            started_ns: 0,
            stop_deadline_ns: 0,
            backoff_until_ns: 0,
            exit_code: None,
            exit_signal: None,
            failed_start: false,
            sent_kill: false,
            retries: 0,
            started_at: None,
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Forks and execs the child. Requires the `stopped` state.
    pub fn start(&mut self, params: &SpawnParams) -> Result<()> {
        if !self.state.can_start() {
            return Err(Error::invalid_state("start", self.state));
        }

        self.exit_code = None;
        self.exit_signal = None;
        self.failed_start = false;
        self.sent_kill = false;
        self.stop_deadline_ns = 0;
        self.backoff_until_ns = 0;
        self.started_ns = 0;

        let pid = tm_process::spawn(params)?;
        let now = clock::monotonic_ns();
        self.pid = Some(pid);
        self.state = ProcessState::Starting;
        self.start_time_ns = now;
        self.start_check_ns = now;
        self.started_at = Some(Utc::now());
        info!(child = self.id, pid = pid.as_raw(), command = %params.path, "child started");
        Ok(())
    }

    /// Sends `signal` and schedules SIGKILL escalation `timeout_secs` from
    /// now. Requires `running` or `starting`.
    pub fn stop(&mut self, signal: Signal, timeout_secs: u64) -> Result<()> {
        if !self.state.can_stop() {
            return Err(Error::invalid_state("stop", self.state));
        }
        if let Some(pid) = self.pid {
            deliver(pid, signal)?;
        }
        self.state = ProcessState::Stopping;
        self.stop_deadline_ns = clock::monotonic_ns().saturating_add(clock::secs_to_ns(timeout_secs));
        debug!(child = self.id, %signal, timeout_secs, "stop requested");
        Ok(())
    }

    /// Delivers `signal` without changing state. Requires `running`.
    pub fn send_signal(&mut self, signal: Signal) -> Result<()> {
        if self.state != ProcessState::Running {
            return Err(Error::invalid_state("send_signal", self.state));
        }
        if let Some(pid) = self.pid {
            deliver(pid, signal)?;
        }
        Ok(())
    }

    /// Delivers SIGKILL and moves to `killed`. Allowed from any
    /// non-terminal state.
    pub fn kill(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::invalid_state("kill", self.state));
        }
        if let Some(pid) = self.pid {
            force_kill(pid)?;
        }
        self.state = ProcessState::Killed;
        self.sent_kill = true;
        debug!(child = self.id, "killed");
        Ok(())
    }

    /// The event pump. Advances the state machine one step at most:
    /// grace-period promotion, kill escalation past the stop deadline, and
    /// reaping of a terminated child.
    pub fn monitor(&mut self) -> Result<()> {
        let now = clock::monotonic_ns();

        if self.state == ProcessState::Starting {
            return self.monitor_starting(now);
        }

        if self.state == ProcessState::Stopping && now >= self.stop_deadline_ns && !self.sent_kill {
            warn!(child = self.id, "stop deadline passed, escalating to SIGKILL");
            self.kill()?;
        }

        self.collect_exit()
    }

    /// Clears every mutable field, including the retry counter.
    pub fn reset(&mut self) {
        self.reset_for_restart();
        self.retries = 0;
    }

    /// Like [`reset`](Self::reset), but the retry counter survives so the
    /// group's restart budget keeps counting across attempts.
    pub fn reset_for_restart(&mut self) {
        self.pid = None;
        self.state = ProcessState::Stopped;
        self.start_time_ns = 0;
        self.start_check_ns = 0;
        self.started_ns = 0;
        self.stop_deadline_ns = 0;
        self.backoff_until_ns = 0;
        self.exit_code = None;
        self.exit_signal = None;
        self.failed_start = false;
        self.sent_kill = false;
        self.started_at = None;
    }

    /// Enters the restart cooldown.
    pub fn enter_backoff(&mut self) {
        self.state = ProcessState::Backoff;
        self.backoff_until_ns = clock::monotonic_ns()
            .saturating_add(clock::secs_to_ns(self.settings.backoff_delay_secs));
        debug!(child = self.id, delay_secs = self.settings.backoff_delay_secs, "entered backoff");
    }

    /// Leaves an expired cooldown, making the child start-eligible again.
    pub fn finish_backoff(&mut self) {
        if self.state == ProcessState::Backoff {
            self.state = ProcessState::Stopped;
            self.backoff_until_ns = 0;
        }
    }

    /// Consumes one unit of the restart budget.
    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Stable index within the owning group.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    pub fn has_exited(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn exit_code(&self) -> Option<u8> {
        self.exit_code
    }

    pub fn exit_signal(&self) -> Option<Signal> {
        self.exit_signal
    }

    /// True if the child disappeared before ever reaching `running`.
    pub fn failed_start(&self) -> bool {
        self.failed_start
    }

    pub fn sent_kill(&self) -> bool {
        self.sent_kill
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Nanoseconds the child has been up, zero unless `running`.
    pub fn uptime_ns(&self) -> u64 {
        if self.state == ProcessState::Running {
            clock::elapsed_ns(self.start_time_ns, clock::monotonic_ns())
        } else {
            0
        }
    }

    /// True once the cooldown entered via [`enter_backoff`](Self::enter_backoff)
    /// has run out.
    pub fn is_backoff_expired(&self) -> bool {
        self.state == ProcessState::Backoff && clock::monotonic_ns() >= self.backoff_until_ns
    }

    /// True once a running child has survived the stability horizon past
    /// its `starting → running` transition. Pure observation; no policy is
    /// attached to it here.
    pub fn is_stable(&self) -> bool {
        self.state == ProcessState::Running
            && self.started_ns > 0
            && clock::elapsed_ns(self.started_ns, clock::monotonic_ns())
                >= clock::secs_to_ns(self.settings.healthy_after_secs)
    }

    /// Reporting snapshot for the supervisor layer.
    pub fn status(&self) -> ProcessStatus {
        ProcessStatus {
            id: self.id,
            pid: self.pid.map(Pid::as_raw),
            state: self.state,
            exit_code: self.exit_code,
            exit_signal: self.exit_signal.map(|s| s as i32),
            failed_start: self.failed_start,
            retries: self.retries,
            uptime_secs: self.uptime_ns() / clock::NANOS_PER_SEC,
            started_at: self.started_at,
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// `starting` is the one state where death means a failed start, so the
    /// reap happens here rather than in the shared collection step.
    fn monitor_starting(&mut self, now: u64) -> Result<()> {
        let pid = match self.pid {
            Some(pid) => pid,
            None => return Ok(()),
        };

        if let Some(disposition) = try_reap(pid)? {
            self.record_exit(disposition);
            self.failed_start = true;
            self.state = ProcessState::Exited;
            self.pid = None;
            debug!(child = self.id, "died inside start grace period");
            return Ok(());
        }

        if !is_alive(pid) {
            // Collected by someone else; no status to record.
            self.failed_start = true;
            self.state = ProcessState::Exited;
            self.pid = None;
            return Ok(());
        }

        if clock::elapsed_ns(self.start_check_ns, now)
            >= clock::secs_to_ns(self.settings.start_grace_secs)
        {
            self.state = ProcessState::Running;
            self.started_ns = now;
            debug!(child = self.id, pid = pid.as_raw(), "running");
        }
        Ok(())
    }

    /// Reaps a terminated child. `killed` survives the reap so the forced
    /// termination stays observable.
    fn collect_exit(&mut self) -> Result<()> {
        let pid = match self.pid {
            Some(pid) => pid,
            None => return Ok(()),
        };
        if let Some(disposition) = try_reap(pid)? {
            self.record_exit(disposition);
            if self.state != ProcessState::Killed {
                self.state = ProcessState::Exited;
            }
            self.pid = None;
        }
        Ok(())
    }

    fn record_exit(&mut self, disposition: ExitDisposition) {
        match disposition {
            ExitDisposition::Code(code) => self.exit_code = Some(code),
            ExitDisposition::Signal(signal) => self.exit_signal = Some(signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sleep_params(secs: &str) -> SpawnParams {
        SpawnParams::new(
            "/bin/sleep",
            vec!["sleep".to_string(), secs.to_string()],
            vec![],
        )
    }

    fn sh_params(script: &str) -> SpawnParams {
        SpawnParams::new(
            "/bin/sh",
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            vec![],
        )
    }

    fn drive_until<F: Fn(&SupervisedProcess) -> bool>(
        child: &mut SupervisedProcess,
        what: &str,
        pred: F,
    ) {
        for _ in 0..600 {
            child.monitor().unwrap();
            if pred(child) {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("timed out waiting for {} (state {})", what, child.state());
    }

    #[test]
    fn new_child_is_stopped_with_no_pid() {
        let child = SupervisedProcess::new(3, ChildSettings::default());
        assert_eq!(child.id(), 3);
        assert_eq!(child.state(), ProcessState::Stopped);
        assert!(child.pid().is_none());
        assert!(!child.is_alive());
    }

    #[test]
    fn start_requires_stopped() {
        let mut child = SupervisedProcess::new(0, ChildSettings::default());
        child.start(&sleep_params("30")).unwrap();
        assert_eq!(child.state(), ProcessState::Starting);
        assert!(child.pid().is_some());

        let err = child.start(&sleep_params("30")).unwrap_err();
        assert!(err.is_invalid_state());

        child.kill().unwrap();
        drive_until(&mut child, "reap", |c| c.pid().is_none());
    }

    #[test]
    fn stop_requires_alive() {
        let mut child = SupervisedProcess::new(0, ChildSettings::default());
        let err = child.stop(Signal::SIGTERM, 1).unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn zero_grace_promotes_on_first_monitor() {
        let mut child = SupervisedProcess::new(0, ChildSettings::default());
        child.start(&sleep_params("30")).unwrap();
        child.monitor().unwrap();
        assert_eq!(child.state(), ProcessState::Running);

        child.kill().unwrap();
        drive_until(&mut child, "reap", |c| c.pid().is_none());
        assert_eq!(child.state(), ProcessState::Killed);
        assert_eq!(child.exit_signal(), Some(Signal::SIGKILL));
        assert_eq!(child.exit_code(), None);
    }

    #[test]
    fn exec_failure_is_a_failed_start_with_code_one() {
        let mut child = SupervisedProcess::new(0, ChildSettings::default());
        let params = SpawnParams::new("/nonexistent/binary", vec!["x".to_string()], vec![]);
        child.start(&params).unwrap();
        assert!(child.pid().is_some());

        drive_until(&mut child, "exit", |c| c.has_exited());
        assert_eq!(child.state(), ProcessState::Exited);
        assert!(child.failed_start());
        assert_eq!(child.exit_code(), Some(1));
        assert!(child.pid().is_none());
    }

    #[test]
    fn stop_with_zero_timeout_escalates_to_kill() {
        let mut child = SupervisedProcess::new(0, ChildSettings::default());
        // The shell ignores SIGTERM so only the escalation can end it.
        child
            .start(&sh_params("trap '' TERM; sleep 30"))
            .unwrap();
        drive_until(&mut child, "running", |c| c.is_running());

        child.stop(Signal::SIGTERM, 0).unwrap();
        assert_eq!(child.state(), ProcessState::Stopping);

        drive_until(&mut child, "killed and reaped", |c| {
            c.has_exited() && c.pid().is_none()
        });
        assert!(child.sent_kill());
        assert_eq!(child.state(), ProcessState::Killed);
    }

    #[test]
    fn send_signal_requires_running() {
        let mut child = SupervisedProcess::new(0, ChildSettings::default());
        assert!(child.send_signal(Signal::SIGUSR1).unwrap_err().is_invalid_state());

        child.start(&sleep_params("30")).unwrap();
        drive_until(&mut child, "running", |c| c.is_running());
        child.send_signal(Signal::SIGTERM).unwrap();
        drive_until(&mut child, "exit", |c| c.has_exited());
        assert_eq!(child.exit_signal(), Some(Signal::SIGTERM));
    }

    #[test]
    fn kill_on_terminal_child_is_invalid() {
        let mut child = SupervisedProcess::new(0, ChildSettings::default());
        let params = SpawnParams::new("/bin/true", vec!["true".to_string()], vec![]);
        child.start(&params).unwrap();
        drive_until(&mut child, "exit", |c| c.has_exited());
        assert!(child.kill().unwrap_err().is_invalid_state());
    }

    #[test]
    fn reset_is_idempotent_and_clears_retries() {
        let mut child = SupervisedProcess::new(0, ChildSettings::default());
        child.record_retry();
        child.record_retry();
        child.enter_backoff();

        child.reset();
        let first = child.status();
        child.reset();
        let second = child.status();

        assert_eq!(first.state, ProcessState::Stopped);
        assert_eq!(first.retries, 0);
        assert_eq!(first.state, second.state);
        assert_eq!(first.retries, second.retries);
        assert_eq!(first.pid, second.pid);
    }

    #[test]
    fn reset_for_restart_preserves_retries() {
        let mut child = SupervisedProcess::new(0, ChildSettings::default());
        child.record_retry();
        child.reset_for_restart();
        assert_eq!(child.retries(), 1);
        assert_eq!(child.state(), ProcessState::Stopped);
    }

    #[test]
    fn zero_backoff_delay_expires_immediately() {
        let settings = ChildSettings {
            backoff_delay_secs: 0,
            ..ChildSettings::default()
        };
        let mut child = SupervisedProcess::new(0, settings);
        child.enter_backoff();
        assert_eq!(child.state(), ProcessState::Backoff);
        assert!(child.is_backoff_expired());

        child.finish_backoff();
        assert_eq!(child.state(), ProcessState::Stopped);
        assert!(!child.is_backoff_expired());
    }

    #[test]
    fn backoff_with_delay_is_not_expired_at_entry() {
        let settings = ChildSettings {
            backoff_delay_secs: 3600,
            ..ChildSettings::default()
        };
        let mut child = SupervisedProcess::new(0, settings);
        child.enter_backoff();
        assert!(!child.is_backoff_expired());
    }

    #[test]
    fn stability_query_tracks_the_horizon() {
        let settings = ChildSettings {
            healthy_after_secs: 0,
            ..ChildSettings::default()
        };
        let mut child = SupervisedProcess::new(0, settings);
        child.start(&sleep_params("30")).unwrap();
        assert!(!child.is_stable());
        drive_until(&mut child, "running", |c| c.is_running());
        assert!(child.is_stable());

        child.kill().unwrap();
        drive_until(&mut child, "reap", |c| c.pid().is_none());
        assert!(!child.is_stable());
    }
}
