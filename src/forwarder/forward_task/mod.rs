//! Forward task execution -- the per-task loop and its cleanup.
//!
//! Split into focused submodules:
//! - [`context`] - Everything a running task owns
//! - [`orchestration`] - Enumerate, classify and dispatch until the range ends
//! - [`finalization`] - Terminal status, persistence, resource release

mod context;
mod finalization;
mod orchestration;


pub(crate) use context::{ForwardTaskContext, open_dedup_cache};
pub(crate) use orchestration::run_forward_task;
