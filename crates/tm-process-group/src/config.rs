//! Group configuration: the shared spawn recipe and policy knobs.
//!
//! Parsing configuration files is the supervisor layer's job; this struct
//! is the already-validated in-memory shape. `argv` and `envp` are
//! `Option` so an unset vector is distinguishable from an intentionally
//! empty one.

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

/// When the group restarts an exited child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Restart after every exit, expected or not.
    Always,
    /// Never restart automatically.
    Never,
    /// Restart unless the exit code is in the expected set. Signal deaths
    /// and statusless disappearances always count as unexpected.
    Unexpected,
}

/// Shared recipe and policy for one homogeneous group of children.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Opaque label, echoed back in logs and status; never interpreted.
    pub name: String,
    /// Executable path handed to `execve`.
    pub command: String,
    /// Argument vector; `None` means "not configured".
    pub argv: Option<Vec<String>>,
    /// Environment vector; `None` means "not configured".
    pub envp: Option<Vec<String>>,
    /// Directory the child changes into before exec.
    pub working_directory: Option<String>,
    /// Output file for stdout; `None` redirects to the null device.
    pub stdout_path: Option<String>,
    /// Output file for stderr; `None` redirects to the null device.
    pub stderr_path: Option<String>,
    /// When false, stdout stays on the parent's descriptor.
    pub redirect_stdout: bool,
    /// When false, stderr stays on the parent's descriptor.
    pub redirect_stderr: bool,
    /// File-mode creation mask applied in the child.
    pub umask: Option<u16>,
    /// Desired replica count.
    pub numprocs: usize,
    /// Restart attempts each child may consume before it is left for dead.
    pub start_retries: u32,
    /// Seconds a child must survive before counting as `running`.
    pub start_grace_secs: u64,
    /// Seconds past `running` after which a child counts as stable.
    pub healthy_after_secs: u64,
    /// Advisory flag for the supervisor layer; not interpreted here.
    pub autostart: bool,
    /// Signal used by group-wide and per-child stops.
    pub stop_signal: Signal,
    /// Seconds between the stop signal and SIGKILL escalation.
    pub stop_timeout_secs: u64,
    /// Restart policy applied on child exit.
    pub restart_policy: RestartPolicy,
    /// Exit codes treated as expected under [`RestartPolicy::Unexpected`].
    pub exit_codes: Vec<u8>,
    /// Seconds a child waits in backoff between restart attempts.
    pub backoff_delay_secs: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            argv: None,
            envp: None,
            working_directory: None,
            stdout_path: None,
            stderr_path: None,
            redirect_stdout: true,
            redirect_stderr: true,
            umask: None,
            numprocs: 0,
            start_retries: 0,
            start_grace_secs: 0,
            healthy_after_secs: 1,
            autostart: true,
            stop_signal: Signal::SIGTERM,
            stop_timeout_secs: 0,
            restart_policy: RestartPolicy::Unexpected,
            exit_codes: vec![0],
            backoff_delay_secs: 1,
        }
    }
}

impl GroupConfig {
    /// Convenience constructor for the common case: a named group with a
    /// command, argv and an empty environment.
    pub fn new(name: impl Into<String>, command: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            argv: Some(argv),
            envp: Some(Vec::new()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = GroupConfig::default();
        assert_eq!(config.numprocs, 0);
        assert_eq!(config.start_retries, 0);
        assert_eq!(config.start_grace_secs, 0);
        assert_eq!(config.healthy_after_secs, 1);
        assert_eq!(config.stop_signal, Signal::SIGTERM);
        assert_eq!(config.stop_timeout_secs, 0);
        assert_eq!(config.restart_policy, RestartPolicy::Unexpected);
        assert_eq!(config.exit_codes, vec![0]);
        assert_eq!(config.backoff_delay_secs, 1);
        assert!(config.autostart);
        assert!(config.redirect_stdout);
        assert!(config.redirect_stderr);
        assert!(config.argv.is_none());
        assert!(config.envp.is_none());
    }

    #[test]
    fn new_sets_command_and_vectors() {
        let config = GroupConfig::new("web", "/bin/true", vec!["true".to_string()]);
        assert_eq!(config.name, "web");
        assert_eq!(config.command, "/bin/true");
        assert_eq!(config.argv.as_deref(), Some(&["true".to_string()][..]));
        assert_eq!(config.envp.as_deref(), Some(&[][..]));
    }

    #[test]
    fn restart_policy_serde_names() {
        assert_eq!(
            serde_json::to_string(&RestartPolicy::Unexpected).unwrap(),
            "\"unexpected\""
        );
        let p: RestartPolicy = serde_json::from_str("\"always\"").unwrap();
        assert_eq!(p, RestartPolicy::Always);
    }
}
