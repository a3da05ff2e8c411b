//! Per-frame control block and result storage.
//!
//! A [`Promise`] is shared between the [`Task`](super::Task) that owns a frame
//! and the frame itself. The frame writes the outcome exactly once; the task
//! reads it any number of times.
//!
//! # Result storage
//!
//! [`ResultHolder`] is either a captured failure or a value. Unit results are
//! stored as `Value(())` and reference results as `Value(&'static U)`, a
//! non-owning pointer to data the promise never owns. The holder sits in a
//! `OnceCell`, so "nothing stored" and "both stored" cannot be represented
//! once the body has finished.

use crate::error::{Error, Result};
use crate::runtime::event_loop::{EventLoop, LoopRef};
use crate::runtime::frame::{Frame, FrameId};
use crate::task::awaiter::FinalAwaiter;
use crate::tracing_compat::{trace, warn};
use core::fmt;
use pin_project::pin_project;
use std::cell::{OnceCell, RefCell};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Whether a new task runs before its constructor returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InitialSuspend {
    /// Lazy: the body does not run until the task is started or awaited.
    #[default]
    Always,
    /// Eager: the body runs to its first suspension point immediately.
    Never,
}

impl InitialSuspend {
    /// Returns true if the task is created suspended.
    #[must_use]
    pub const fn suspends(self) -> bool {
        matches!(self, Self::Always)
    }
}

/// Outcome of a finished task body.
#[derive(Debug, Clone)]
pub enum ResultHolder<T> {
    /// The body returned an error or panicked.
    Failure(Error),
    /// The body returned a value.
    Value(T),
}

impl<T> ResultHolder<T> {
    /// Borrows the value, or re-raises the captured failure.
    pub fn get(&self) -> Result<&T> {
        match self {
            Self::Failure(err) => Err(err.clone()),
            Self::Value(value) => Ok(value),
        }
    }

    /// Consumes the holder.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Failure(err) => Err(err),
            Self::Value(value) => Ok(value),
        }
    }

    /// Returns true if a failure was captured.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

impl<T> From<Result<T>> for ResultHolder<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(err) => Self::Failure(err),
        }
    }
}

/// Who is waiting for a frame to finish.
///
/// A non-owning back-reference: the child never keeps its parent alive.
#[derive(Debug, Clone)]
pub enum ParentLink {
    /// A task frame suspended on this one.
    Frame(FrameId),
    /// A foreign context awaiting this task outside any frame.
    Waker(Waker),
}

/// Control block for one task frame.
pub struct Promise<T> {
    event_loop: LoopRef,
    parent: RefCell<Option<ParentLink>>,
    result: OnceCell<ResultHolder<T>>,
}

#[allow(clippy::new_without_default)]
impl<T> Promise<T> {
    /// Creates a promise bound to the active event loop.
    ///
    /// # Panics
    ///
    /// Panics if no loop is active on this thread.
    #[must_use]
    pub fn new() -> Self {
        Self::bound_to(&EventLoop::active())
    }

    pub(crate) fn bound_to(event_loop: &EventLoop) -> Self {
        Self {
            event_loop: event_loop.downgrade(),
            parent: RefCell::new(None),
            result: OnceCell::new(),
        }
    }

    /// The loop this promise was created under, if it is still alive.
    #[must_use]
    pub fn event_loop(&self) -> Option<EventLoop> {
        self.event_loop.upgrade()
    }

    /// The recorded parent continuation.
    #[must_use]
    pub fn parent(&self) -> Option<ParentLink> {
        self.parent.borrow().clone()
    }

    /// Records who to resume when the body finishes.
    ///
    /// A frame parent is written once; a waker parent may be refreshed.
    pub(crate) fn set_parent(&self, link: ParentLink) {
        let mut parent = self.parent.borrow_mut();
        if let Some(ParentLink::Frame(existing)) = *parent {
            if let ParentLink::Frame(new) = link {
                if existing != new {
                    warn!(existing = ?existing, new = ?new, "task is already awaited by another frame");
                }
            }
            return;
        }
        *parent = Some(link);
    }

    /// Returns true once the body has finished, normally or not.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.result.get().is_some()
    }

    /// The stored outcome, once the body has finished.
    #[must_use]
    pub fn result(&self) -> Option<&ResultHolder<T>> {
        self.result.get()
    }

    /// Stores the body's return value. Returns false if an outcome was
    /// already stored.
    pub fn return_value(&self, value: T) -> bool {
        self.result.set(ResultHolder::Value(value)).is_ok()
    }

    /// Stores a failure raised by the body. Returns false if an outcome was
    /// already stored.
    pub fn unhandled_failure(&self, err: Error) -> bool {
        trace!(error = %err, "task body failed");
        self.result.set(ResultHolder::Failure(err)).is_ok()
    }

    /// Builds the awaiter that runs when the body finishes.
    #[must_use]
    pub fn final_suspend(&self) -> FinalAwaiter {
        FinalAwaiter::new(self.parent())
    }

    pub(crate) fn into_result(self) -> Result<T> {
        self.result
            .into_inner()
            .ok_or_else(|| Error::invalid_state("task has not finished"))?
            .into_result()
    }
}

impl Promise<()> {
    /// Marks a unit body as returned.
    pub fn return_void(&self) -> bool {
        self.return_value(())
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("parent", &self.parent.borrow())
            .field(
                "result",
                &self.result.get().map(|r| if r.is_failure() { "Failure" } else { "Value" }),
            )
            .finish_non_exhaustive()
    }
}

/// Frame adapter: a task body plus its promise.
#[pin_project]
pub(crate) struct PromiseFrame<F, T> {
    #[pin]
    body: F,
    promise: Rc<Promise<T>>,
}

impl<F, T> PromiseFrame<F, T> {
    pub(crate) fn new(body: F, promise: Rc<Promise<T>>) -> Self {
        Self { body, promise }
    }
}

impl<F, T> Frame for PromiseFrame<F, T>
where
    F: Future<Output = Result<T>>,
{
    fn resume(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.project();
        if this.promise.is_complete() {
            return Poll::Ready(());
        }

        match catch_unwind(AssertUnwindSafe(|| this.body.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(Ok(value))) => {
                this.promise.return_value(value);
                Poll::Ready(())
            }
            Ok(Poll::Ready(Err(err))) => {
                this.promise.unhandled_failure(err);
                Poll::Ready(())
            }
            Err(payload) => {
                this.promise
                    .unhandled_failure(Error::panicked(payload.as_ref()));
                Poll::Ready(())
            }
        }
    }

    fn final_suspend(&self) -> FinalAwaiter {
        self.promise.final_suspend()
    }
}
