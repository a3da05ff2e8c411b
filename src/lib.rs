//! Covent: a single-threaded cooperative task runtime over kernel completions.
//!
//! # Overview
//!
//! Application code is written as sequential `async` bodies wrapped in a
//! [`Task`]. A task suspends only where it awaits: another task, a
//! kernel-bound operation such as [`sleep`], or the implicit final suspension
//! when its body finishes. The [`EventLoop`] submits kernel operations to an
//! io_uring ring (or a deterministic lab driver), and resumes the suspended
//! task when the kernel reports the completion.
//!
//! # Core Guarantees
//!
//! - **Unique frames**: every task owns exactly one frame and releases it exactly once
//! - **Deferred failures**: errors and panics in a body are captured and re-raised on access
//! - **Call/return composition**: a parent awaiting a child resumes synchronously
//!   inside the call that finished the child
//! - **Fresh awaiters**: every kernel operation gets its own completion slot
//!
//! # Module Structure
//!
//! - [`task`]: Task handle, promise, result storage and the task-side awaiters
//! - [`runtime`]: Event loop, active-loop registry, kernel awaiters and drivers
//! - [`error`]: Error types
//! - [`util`]: Internal utilities (generation-checked arena)
//!
//! # Example
//!
//! ```ignore
//! use covent::{sleep, EventLoop, Task};
//! use std::time::Duration;
//!
//! let ev = EventLoop::new()?;
//! let _enter = ev.enter();
//! let task = Task::new(async {
//!     sleep(Duration::from_millis(10)).await?;
//!     Ok(7)
//! });
//! assert_eq!(*ev.block_on(&task)?, 7);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod error;
pub mod runtime;
pub mod task;
pub mod tracing_compat;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{Error, ErrorKind, Result, ResultExt};
pub use runtime::{
    sleep, yield_now, Completion, EventLoop, EventLoopBuilder, LabDriver, LoopConfig, LoopStats,
};
pub use task::{await_event, await_transform, InitialSuspend, Task};
