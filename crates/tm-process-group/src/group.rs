//! The group coordinator.
//!
//! Owns N children built from one spawn recipe and enforces the restart
//! policy: an unexpectedly exited child re-enters service through a
//! `backoff` cooldown, one restart-budget unit at a time, until the budget
//! runs out and the child is left for dead.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use tm_common::{Error, Result};
use tm_process::SpawnParams;
use tm_process_state::ProcessState;
use tm_supervised_process::{ChildSettings, ProcessStatus, SupervisedProcess};

use crate::config::{GroupConfig, RestartPolicy};

/// Summary state of a whole group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    /// No children, or every child is terminal without a dead budget.
    Stopped,
    /// Children spawned, not all running yet.
    Starting,
    /// Every child is running.
    Running,
    /// A group-wide stop is in flight.
    Stopping,
    /// At least one child exhausted its restart budget.
    Fatal,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Fatal => "fatal",
        };
        write!(f, "{}", name)
    }
}

/// Reporting snapshot for a whole group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStatus {
    pub name: String,
    pub state: GroupState,
    pub desired: usize,
    pub running: usize,
    pub alive: usize,
    pub children: Vec<ProcessStatus>,
}

/// A homogeneous group of supervised children.
///
/// All progress happens inside [`monitor_children`](Self::monitor_children);
/// nothing here blocks or spawns threads. A group is not thread-safe; the
/// caller serializes access.
#[derive(Debug)]
pub struct ProcessGroup {
    config: GroupConfig,
    children: Vec<SupervisedProcess>,
    state: GroupState,
}

impl ProcessGroup {
    /// Creates an empty group around `config`. Children materialize on
    /// [`spawn_children`](Self::spawn_children).
    pub fn new(config: GroupConfig) -> Self {
        Self {
            config,
            children: Vec::new(),
            state: GroupState::Stopped,
        }
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn children(&self) -> &[SupervisedProcess] {
        &self.children
    }

    // ------------------------------------------------------------------
    // Group-wide operations
    // ------------------------------------------------------------------

    /// Materializes `numprocs` children and starts each one.
    ///
    /// Children that started before an error keep running and stay owned
    /// by the group; the error propagates to the caller.
    pub fn spawn_children(&mut self) -> Result<()> {
        let params = self.spawn_params()?;
        if self.config.numprocs == 0 {
            return Err(Error::NoProcesses);
        }

        let settings = self.child_settings();
        self.children = (0..self.config.numprocs)
            .map(|id| SupervisedProcess::new(id, settings))
            .collect();
        self.state = GroupState::Starting;

        for child in &mut self.children {
            child.start(&params)?;
        }
        info!(group = %self.config.name, numprocs = self.config.numprocs, "children spawned");
        Ok(())
    }

    /// Sends the configured stop signal to every alive child and schedules
    /// their SIGKILL escalation.
    ///
    /// A child that exits between the liveness check and the signal races
    /// into `InvalidState`; that is absorbed here.
    pub fn stop_children(&mut self) -> Result<()> {
        self.state = GroupState::Stopping;
        let (signal, timeout) = (self.config.stop_signal, self.config.stop_timeout_secs);
        for child in &mut self.children {
            if !child.is_alive() {
                continue;
            }
            match child.stop(signal, timeout) {
                Ok(()) => {}
                Err(e) if e.is_invalid_state() => {
                    debug!(group = %self.config.name, child = child.id(), "stop raced a self-exit");
                }
                Err(e) => return Err(e),
            }
        }
        info!(group = %self.config.name, %signal, "stop requested for all children");
        Ok(())
    }

    /// The event pump. Visits children in index order; for each child at
    /// most one coordination action fires per pass, in this precedence:
    /// backoff expiry, exit handling, post-backoff respawn.
    pub fn monitor_children(&mut self) -> Result<()> {
        for i in 0..self.children.len() {
            self.children[i].monitor()?;

            let state = self.children[i].state();
            if state == ProcessState::Backoff {
                if self.children[i].is_backoff_expired() {
                    self.children[i].finish_backoff();
                    debug!(group = %self.config.name, child = i, "backoff expired");
                }
            } else if self.children[i].has_exited() {
                let eligible = self.should_restart(&self.children[i])
                    && self.children[i].retries() < self.config.start_retries;
                if eligible {
                    self.children[i].record_retry();
                    self.children[i].enter_backoff();
                    debug!(
                        group = %self.config.name,
                        child = i,
                        retries = self.children[i].retries(),
                        "restart scheduled after cooldown"
                    );
                }
            } else if state == ProcessState::Stopped && self.should_restart(&self.children[i]) {
                let params = self.spawn_params()?;
                self.children[i].reset_for_restart();
                self.children[i].start(&params)?;
                info!(group = %self.config.name, child = i, "child restarted");
            }
        }
        self.refresh_state();
        Ok(())
    }

    /// Evaluates the restart policy against a child's exit disposition.
    pub fn should_restart(&self, child: &SupervisedProcess) -> bool {
        restart_on_exit(
            self.config.restart_policy,
            &self.config.exit_codes,
            child.exit_code(),
        )
    }

    // ------------------------------------------------------------------
    // Per-child operations
    // ------------------------------------------------------------------

    /// Gracefully stops child `index` with the group's signal and timeout.
    pub fn stop_child(&mut self, index: usize) -> Result<()> {
        let (signal, timeout) = (self.config.stop_signal, self.config.stop_timeout_secs);
        self.child_mut(index)?.stop(signal, timeout)
    }

    /// Force-kills child `index`.
    pub fn kill_child(&mut self, index: usize) -> Result<()> {
        self.child_mut(index)?.kill()
    }

    /// Restarts child `index`.
    ///
    /// An alive child is stopped and left for the monitor loop to bring
    /// back; a dead one is reset (restart budget included) and started
    /// immediately.
    pub fn restart_child(&mut self, index: usize) -> Result<()> {
        if self.child(index)?.is_alive() {
            return self.stop_child(index);
        }
        let params = self.spawn_params()?;
        let child = self.child_mut(index)?;
        child.reset();
        child.start(&params)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Children currently in `running`.
    pub fn running_count(&self) -> usize {
        self.children.iter().filter(|c| c.is_running()).count()
    }

    /// Children with a live OS process (`starting`, `running`, `stopping`).
    pub fn alive_count(&self) -> usize {
        self.children.iter().filter(|c| c.is_alive()).count()
    }

    /// True once every child is terminal. False for an empty group.
    pub fn all_exited(&self) -> bool {
        !self.children.is_empty() && self.children.iter().all(|c| c.has_exited())
    }

    /// True if any child sits in `exited` with its restart budget consumed.
    pub fn has_fatal_processes(&self) -> bool {
        self.children
            .iter()
            .any(|c| c.state() == ProcessState::Exited && c.retries() >= self.config.start_retries)
    }

    /// Summed uptime of the running children, in nanoseconds.
    pub fn total_uptime_ns(&self) -> u64 {
        self.children
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.uptime_ns()))
    }

    /// Reporting snapshot for the supervisor layer.
    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            name: self.config.name.clone(),
            state: self.state,
            desired: self.config.numprocs,
            running: self.running_count(),
            alive: self.alive_count(),
            children: self.children.iter().map(|c| c.status()).collect(),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn child(&self, index: usize) -> Result<&SupervisedProcess> {
        self.children
            .get(index)
            .ok_or_else(|| Error::invalid_child_id(index, self.children.len()))
    }

    fn child_mut(&mut self, index: usize) -> Result<&mut SupervisedProcess> {
        let count = self.children.len();
        self.children
            .get_mut(index)
            .ok_or_else(|| Error::invalid_child_id(index, count))
    }

    fn child_settings(&self) -> ChildSettings {
        ChildSettings {
            start_grace_secs: self.config.start_grace_secs,
            healthy_after_secs: self.config.healthy_after_secs,
            backoff_delay_secs: self.config.backoff_delay_secs,
        }
    }

    /// Validates the recipe and assembles the spawn parameters. Validation
    /// order is part of the contract: command, argv, envp, replica count.
    fn spawn_params(&self) -> Result<SpawnParams> {
        if self.config.command.is_empty() {
            return Err(Error::MissingCommand);
        }
        let argv = self.config.argv.as_ref().ok_or(Error::MissingArgv)?;
        let envp = self.config.envp.as_ref().ok_or(Error::MissingEnvp)?;
        Ok(SpawnParams {
            path: self.config.command.clone(),
            argv: argv.clone(),
            envp: envp.clone(),
            stdout_path: self.config.stdout_path.clone(),
            stderr_path: self.config.stderr_path.clone(),
            redirect_stdout: self.config.redirect_stdout,
            redirect_stderr: self.config.redirect_stderr,
            working_directory: self.config.working_directory.clone(),
            umask: self.config.umask,
        })
    }

    /// Recomputes the summary state at the end of a monitor pass. The
    /// transitional states set by `spawn_children` / `stop_children`
    /// persist until the children settle one way or the other.
    fn refresh_state(&mut self) {
        if self.children.is_empty() {
            return;
        }
        if self.has_fatal_processes() {
            if self.state != GroupState::Fatal {
                warn!(group = %self.config.name, "child out of restart budget, group fatal");
            }
            self.state = GroupState::Fatal;
        } else if self.children.iter().all(|c| c.is_running()) {
            self.state = GroupState::Running;
        } else if self.children.iter().all(|c| c.has_exited()) {
            self.state = GroupState::Stopped;
        }
    }
}

/// The policy decision, kept free of the group so it is trivially testable:
/// `always` and `never` are absolute; `unexpected` restarts on any exit
/// code outside the expected set, and on every statusless or signal death.
fn restart_on_exit(policy: RestartPolicy, expected: &[u8], exit_code: Option<u8>) -> bool {
    match policy {
        RestartPolicy::Always => true,
        RestartPolicy::Never => false,
        RestartPolicy::Unexpected => match exit_code {
            Some(code) => !expected.contains(&code),
            None => true,
        },
    }
}
