//! Task-side awaiters.
//!
//! - [`IdAwaiter`]: pass-through wrapper giving every suspension source the
//!   same shape (and the same trace events)
//! - [`FinalAwaiter`]: runs once when a body finishes and picks the next frame
//! - [`Join`] / [`JoinOwned`]: awaiting a [`Task`] by reference or by value
//!
//! # Awaiting a task
//!
//! ```text
//! parent polls Join ── child done? ──yes──▶ Ready(result)
//!                          │no
//!                          ▼
//!              record parent link, start child
//!              (child runs synchronously until it suspends or finishes)
//!                          │
//!      child finished ◀────┴────▶ child suspended: parent returns Pending
//!      Ready(result)               ...later the child finishes and its
//!                                  FinalAwaiter resumes the parent directly
//! ```

use crate::error::Result;
use crate::runtime::event_loop::EventLoop;
use crate::runtime::frame::FrameId;
use crate::runtime::sleep::Event;
use crate::task::promise::ParentLink;
use crate::task::Task;
use crate::tracing_compat::trace;
use pin_project::pin_project;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// Pass-through suspension wrapper.
///
/// Forwards readiness and output unchanged; records whether the wrapped
/// awaitable ever suspended.
#[pin_project]
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct IdAwaiter<F> {
    #[pin]
    inner: F,
    suspended: bool,
}

impl<F> IdAwaiter<F> {
    /// Wraps `inner`.
    pub const fn new(inner: F) -> Self {
        Self {
            inner,
            suspended: false,
        }
    }

    /// Returns true if the wrapped awaitable returned `Pending` at least once.
    #[must_use]
    pub const fn has_suspended(&self) -> bool {
        self.suspended
    }

    /// Unwraps the awaitable.
    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: Future> Future for IdAwaiter<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.inner.poll(cx) {
            Poll::Ready(output) => {
                if *this.suspended {
                    trace!("awaiter resumed");
                }
                Poll::Ready(output)
            }
            Poll::Pending => {
                if !*this.suspended {
                    *this.suspended = true;
                    trace!("awaiter suspended");
                }
                Poll::Pending
            }
        }
    }
}

/// Wraps any awaitable in an [`IdAwaiter`].
pub fn await_transform<A: IntoFuture>(awaitable: A) -> IdAwaiter<A::IntoFuture> {
    IdAwaiter::new(awaitable.into_future())
}

/// Asks the active loop for the awaiter of a kernel operation.
///
/// # Panics
///
/// Panics if no loop is active on this thread.
pub fn await_event<E: Event>(event: E) -> IdAwaiter<E::Awaiter> {
    IdAwaiter::new(EventLoop::active().create_event_awaiter(event))
}

/// Where control goes after a frame's final suspension.
#[derive(Debug, Clone)]
pub enum Continuation {
    /// Resume this suspended parent frame now.
    Resume(FrameId),
    /// Wake a foreign awaiter.
    Wake(Waker),
    /// Return to whoever resumed the finished frame.
    Noop,
}

/// Awaiter executed once when a task body finishes.
///
/// Never ready: the frame always suspends at its end so the loop decides
/// where control goes, and the frame itself stays alive until its task is
/// dropped.
#[derive(Debug, Clone)]
pub struct FinalAwaiter {
    parent: Option<ParentLink>,
}

impl FinalAwaiter {
    /// Creates the final awaiter for a frame with the given parent link.
    #[must_use]
    pub const fn new(parent: Option<ParentLink>) -> Self {
        Self { parent }
    }

    /// Always false.
    #[must_use]
    pub const fn ready(&self) -> bool {
        false
    }

    /// Picks the continuation.
    ///
    /// A parent frame is resumed only while it is suspended. A running parent
    /// is the frame that drove this one to completion and will observe the
    /// result when control returns to it; a finished or released parent has
    /// nothing left to resume.
    #[must_use]
    pub fn suspend(self, event_loop: &EventLoop) -> Continuation {
        match self.parent {
            Some(ParentLink::Frame(parent)) if event_loop.is_frame_suspended(parent) => {
                Continuation::Resume(parent)
            }
            Some(ParentLink::Waker(waker)) => Continuation::Wake(waker),
            Some(ParentLink::Frame(_)) | None => Continuation::Noop,
        }
    }
}

/// Awaits a borrowed task; resolves to a reference to its value.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Join<'a, T> {
    task: &'a Task<T>,
    linked: bool,
}

impl<'a, T> Join<'a, T> {
    pub(crate) fn new(task: &'a Task<T>) -> Self {
        Self {
            task,
            linked: false,
        }
    }
}

impl<'a, T> Future for Join<'a, T> {
    type Output = Result<&'a T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task = self.task;
        if task.done() {
            return Poll::Ready(task.result());
        }
        let first = !self.linked;
        self.linked = true;
        if task.await_suspend(cx, first) {
            return Poll::Ready(task.result());
        }
        Poll::Pending
    }
}

/// Awaits an owned task; resolves to its value and releases the frame.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct JoinOwned<T> {
    task: Option<Task<T>>,
    linked: bool,
}

impl<T> JoinOwned<T> {
    pub(crate) fn new(task: Task<T>) -> Self {
        Self {
            task: Some(task),
            linked: false,
        }
    }
}

impl<T> Future for JoinOwned<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let first = !self.linked;
        self.linked = true;
        let finished = match &self.task {
            None => {
                return Poll::Ready(Err(crate::Error::invalid_state(
                    "task join polled after completion",
                )))
            }
            Some(task) => task.done() || task.await_suspend(cx, first),
        };
        if !finished {
            return Poll::Pending;
        }
        match self.task.take() {
            Some(task) => Poll::Ready(task.into_result()),
            None => Poll::Pending,
        }
    }
}
