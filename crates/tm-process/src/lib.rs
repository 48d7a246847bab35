//! # tm-process
//!
//! Low-level POSIX process primitives for taskmaster-core.
//!
//! This crate provides:
//! - Process spawning via `fork`/`execve` with stream redirection
//! - Signal delivery with process-group fallback
//! - Non-blocking child reaping
//! - Argv/envp marshalling into `execve` shape
//!
//! Nothing here knows about states, policies or groups; those live in the
//! layers above.

pub mod marshal;
pub mod reap;
pub mod signal;
pub mod spawn;

pub use marshal::{to_cstring, to_cstring_vec};
pub use reap::{try_reap, ExitDisposition};
pub use signal::{deliver, force_kill, is_alive};
pub use spawn::{spawn, SpawnParams, CHILD_SETUP_EXIT_CODE};
