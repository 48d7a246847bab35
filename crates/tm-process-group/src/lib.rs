//! # tm-process-group
//!
//! The group coordinator: a flat collection of supervised children sharing
//! one spawn recipe, one restart policy and one desired replica count.
//!
//! This crate composes `tm-supervised-process` and adds the policy the
//! single-child layer deliberately lacks: restart decisions, backoff
//! cooldowns and the per-group state summary. Progress is made exclusively
//! inside [`ProcessGroup::monitor_children`], which the caller drives from
//! its poll loop.

pub mod config;
pub mod group;

pub use config::{GroupConfig, RestartPolicy};
pub use group::{GroupState, GroupStatus, ProcessGroup};
