//! Kernel-completion awaiters.
//!
//! An [`Op`] is the suspension object for exactly one kernel request. It moves
//! through four states:
//!
//! ```text
//! Constructed ──poll──▶ Submitted ──completion──▶ Completed ──poll──▶ Consumed
//!  (prepare() builds      (slot holds the          (slot holds          (finish() reads
//!   the Request)           frame's waker)           result + flags)      result + flags)
//! ```
//!
//! The loop owns one [`OpSlot`] per submitted request. A completion is written
//! into the slot exactly once by [`OpSlot::complete`], which hands back the
//! waker without calling it; waking the frame is the loop's decision.
//!
//! Concrete operations implement [`Operation`]: a setup hook that builds the
//! request and a finalization hook that interprets the completion. See
//! [`Sleep`](super::sleep::Sleep) for the timer template.

use crate::error::{Error, Result};
use crate::runtime::driver::{Request, Token};
use crate::runtime::event_loop::{EventLoop, LoopRef};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// Result code and flags delivered with a kernel completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Completion {
    /// Kernel result: non-negative on success, `-errno` on failure.
    pub result: i32,
    /// Completion flags word.
    pub flags: u32,
}

impl Completion {
    /// Creates a completion pair.
    #[must_use]
    pub const fn new(result: i32, flags: u32) -> Self {
        Self { result, flags }
    }

    /// Returns true if the kernel reported a failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.result < 0
    }

    /// Converts a negative result into an [`Error`], passing successes through.
    pub fn into_result(self) -> Result<i32> {
        if self.is_error() {
            Err(Error::from_errno(self.result))
        } else {
            Ok(self.result)
        }
    }
}

/// Per-request bookkeeping owned by the loop.
#[derive(Debug)]
pub(crate) struct OpSlot {
    waker: Option<Waker>,
    completion: Option<Completion>,
    orphaned: bool,
}

impl OpSlot {
    pub(crate) fn new(waker: Waker) -> Self {
        Self {
            waker: Some(waker),
            completion: None,
            orphaned: false,
        }
    }

    /// Stores the completion pair and returns the waiting waker.
    ///
    /// Does not wake anything.
    pub(crate) fn complete(&mut self, completion: Completion) -> Option<Waker> {
        debug_assert!(self.completion.is_none(), "completion delivered twice");
        self.completion = Some(completion);
        self.waker.take()
    }

    /// Takes the completion if it has arrived, otherwise refreshes the waker.
    pub(crate) fn take(&mut self, waker: &Waker) -> Option<Completion> {
        let completion = self.completion.take();
        if completion.is_none() {
            match &self.waker {
                Some(current) if current.will_wake(waker) => {}
                _ => self.waker = Some(waker.clone()),
            }
        }
        completion
    }

    pub(crate) fn orphan(&mut self) {
        self.orphaned = true;
        self.waker = None;
    }

    pub(crate) const fn is_orphaned(&self) -> bool {
        self.orphaned
    }

    pub(crate) const fn has_completion(&self) -> bool {
        self.completion.is_some()
    }
}

/// The two hooks that distinguish one kernel operation from another.
pub trait Operation {
    /// Value produced once the completion has been interpreted.
    type Output;

    /// Builds the request descriptor. Called once, at first poll.
    fn prepare(&mut self) -> Request;

    /// Interprets the completion. Called once, when the op is resumed.
    fn finish(&mut self, completion: Completion) -> Result<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpState {
    Constructed,
    Submitted(Token),
    Consumed,
}

/// Awaiter bound to one kernel request.
///
/// Never ready on the first poll: the request always round-trips through the
/// loop. Dropping a submitted `Op` does not cancel the kernel request; the
/// loop discards its completion when it arrives.
#[must_use = "kernel operations do nothing unless awaited"]
#[derive(Debug)]
pub struct Op<O> {
    event_loop: LoopRef,
    state: OpState,
    operation: O,
}

impl<O: Operation> Op<O> {
    pub(crate) fn new(event_loop: &EventLoop, operation: O) -> Self {
        Self {
            event_loop: event_loop.downgrade(),
            state: OpState::Constructed,
            operation,
        }
    }

    /// Returns the operation this awaiter drives.
    #[must_use]
    pub fn operation(&self) -> &O {
        &self.operation
    }

    /// Returns the token of the submitted request, if submitted and not yet consumed.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.state {
            OpState::Submitted(token) => Some(token),
            _ => None,
        }
    }
}

impl<O: Operation + Unpin> Future for Op<O> {
    type Output = Result<O::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(ev) = this.event_loop.upgrade() else {
            this.state = OpState::Consumed;
            return Poll::Ready(Err(Error::no_event_loop()));
        };

        match this.state {
            OpState::Constructed => {
                let request = this.operation.prepare();
                match ev.submit(request, cx.waker().clone()) {
                    Ok(token) => {
                        this.state = OpState::Submitted(token);
                        Poll::Pending
                    }
                    Err(err) => {
                        this.state = OpState::Consumed;
                        Poll::Ready(Err(err))
                    }
                }
            }
            OpState::Submitted(token) => match ev.take_completion(token, cx.waker()) {
                Some(completion) => {
                    this.state = OpState::Consumed;
                    Poll::Ready(this.operation.finish(completion))
                }
                None => Poll::Pending,
            },
            OpState::Consumed => Poll::Ready(Err(Error::invalid_state(
                "kernel operation polled after completion",
            ))),
        }
    }
}

impl<O> Drop for Op<O> {
    fn drop(&mut self) {
        if let OpState::Submitted(token) = self.state {
            if let Some(ev) = self.event_loop.upgrade() {
                ev.orphan(token);
            }
        }
    }
}
