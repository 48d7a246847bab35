//! # tm-common
//!
//! Shared foundation for the taskmaster-core workspace.
//!
//! This crate provides:
//! - The common error type and `Result` alias
//! - Monotonic time helpers used by every timing gate
//!
//! It has no knowledge of processes or groups; the higher layers build on it.

pub mod clock;
pub mod errors;

pub use clock::{elapsed_ns, monotonic_ns, secs_to_ns, NANOS_PER_SEC};
pub use errors::{Error, Result};
