//! # tm-supervised-process
//!
//! The single-child supervisor: one value object owning a child's pid, its
//! lifecycle state, the monotonic timing marks and the exit disposition.
//!
//! The owner drives progress by calling [`SupervisedProcess::monitor`]
//! repeatedly from its poll loop; every operation here is non-blocking.
//! Restart *policy* lives one layer up, in the group coordinator.

pub mod child;
pub mod status;

pub use child::{ChildSettings, SupervisedProcess};
pub use status::ProcessStatus;
