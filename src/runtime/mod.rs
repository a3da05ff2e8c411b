//! Event loop and kernel-completion machinery.
//!
//! This module contains the reactor side of the runtime:
//!
//! - [`event_loop`]: The loop, its frame/op tables and the turn logic
//! - [`local`]: Thread-local registry of the active loop
//! - [`op`]: Kernel-completion awaiter ([`Op`]) and the [`Operation`] hooks
//! - [`sleep`]: Timer and yield operations
//! - [`driver`]: Completion backends (io_uring and the lab driver)
//! - [`frame`]: Frame table behind every task
//! - [`waker`]: Frame wakers with deduplication
//! - [`config`], [`env_config`], [`builder`]: Loop configuration
//!
//! # Event Loop Builder
//!
//! ```ignore
//! use covent::runtime::{DriverKind, EventLoop};
//!
//! // Kernel ring with defaults.
//! let ev = EventLoop::new()?;
//!
//! // Environment overrides beneath explicit values.
//! let ev = EventLoop::builder()
//!     .ring_entries(64)
//!     .from_env()
//!     .build()?;
//!
//! // Deterministic virtual time.
//! let ev = EventLoop::builder().driver(DriverKind::Lab).build()?;
//! ```
//!
//! # Error Handling
//!
//! `EventLoopBuilder::build()` returns `Result<EventLoop, Error>`. Invalid
//! configuration surfaces as `ErrorKind::Config`; a kernel that refuses to
//! create a ring surfaces as `ErrorKind::Io`.

pub mod builder;
pub mod config;
pub mod driver;
pub mod env_config;
pub mod event_loop;
pub mod frame;
pub mod local;
pub mod op;
pub mod sleep;
pub mod waker;

pub use builder::EventLoopBuilder;
pub use config::{ConfigError, DriverKind, LoopConfig};
pub use driver::{Driver, IoUringDriver, LabDriver, Request, Timespec, Token};
pub use event_loop::{EventLoop, LoopStats};
pub use frame::FrameId;
pub use local::EnterGuard;
pub use op::{Completion, Op, Operation};
pub use sleep::{sleep, yield_now, Event, Nop, Sleep};
