//! Timer and yield operations.
//!
//! [`Sleep`] is the template for every kernel-bound operation: its setup hook
//! encodes a duration as a timeout request, and its finalization hook only
//! resumes. The kernel reports an expired timeout as `-ETIME`, so the result
//! code is not interpreted.
//!
//! [`Nop`] round-trips through the ring without doing anything, which gives a
//! task a way to yield to the loop. Unlike `Sleep`, it treats a negative
//! result as a failure.

use crate::error::{Error, Result};
use crate::runtime::driver::{Request, Timespec};
use crate::runtime::event_loop::EventLoop;
use crate::runtime::op::{Completion, Op, Operation};
use std::time::Duration;

/// Kernel timeout operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sleep {
    timespec: Timespec,
}

impl Sleep {
    /// Creates a timeout for `duration`.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            timespec: Timespec::from(duration),
        }
    }

    /// The requested duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.timespec.as_duration()
    }
}

impl Operation for Sleep {
    type Output = ();

    fn prepare(&mut self) -> Request {
        Request::Timeout(self.timespec)
    }

    fn finish(&mut self, _completion: Completion) -> Result<()> {
        Ok(())
    }
}

/// No-op operation used to yield to the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nop;

impl Operation for Nop {
    type Output = ();

    fn prepare(&mut self) -> Request {
        Request::Nop
    }

    fn finish(&mut self, completion: Completion) -> Result<()> {
        if completion.is_error() {
            return Err(Error::from_errno(completion.result));
        }
        Ok(())
    }
}

/// Operation arguments the loop can turn into an awaiter.
///
/// This is the argument side of
/// [`EventLoop::create_event_awaiter`]: each implementation names the awaiter
/// type it produces.
pub trait Event {
    /// The awaiter bound to the loop.
    type Awaiter;

    /// Binds these arguments to `event_loop`.
    fn create(self, event_loop: &EventLoop) -> Self::Awaiter;
}

impl Event for Sleep {
    type Awaiter = Op<Sleep>;

    fn create(self, event_loop: &EventLoop) -> Op<Sleep> {
        Op::new(event_loop, self)
    }
}

impl Event for Duration {
    type Awaiter = Op<Sleep>;

    fn create(self, event_loop: &EventLoop) -> Op<Sleep> {
        Op::new(event_loop, Sleep::new(self))
    }
}

impl Event for Nop {
    type Awaiter = Op<Nop>;

    fn create(self, event_loop: &EventLoop) -> Op<Nop> {
        Op::new(event_loop, self)
    }
}

/// Suspends the current task for `duration`.
///
/// # Panics
///
/// Panics if called outside an active event loop.
pub fn sleep(duration: Duration) -> Op<Sleep> {
    EventLoop::active().create_event_awaiter(duration)
}

/// Yields to the loop by round-tripping a no-op request through the ring.
///
/// # Panics
///
/// Panics if called outside an active event loop.
pub fn yield_now() -> Op<Nop> {
    EventLoop::active().create_event_awaiter(Nop)
}
