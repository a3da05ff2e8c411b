//! Tasks: uniquely owned suspendable computations.
//!
//! A [`Task`] owns exactly one frame in its loop's frame table. The frame is
//! created with the task and released when the task is dropped, whether or
//! not it ever ran. Tasks are not `Clone`; [`Task::take`] moves ownership out
//! and leaves a broken handle behind.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──▶ created ──start()/await──▶ running ◀──resume()/completion──┐
//!  (lazy)                                 │  └──────── suspended ───────┘
//! eager() ─────────────────────────────▶  ▼
//!                                      finished (value or captured failure)
//! ```
//!
//! Precondition violations (starting twice, resuming before start or after
//! completion) panic. Failures raised by the body never do: they are stored
//! and re-raised each time the result is read.

pub mod awaiter;
pub mod promise;

pub use awaiter::{
    await_event, await_transform, Continuation, FinalAwaiter, IdAwaiter, Join, JoinOwned,
};
pub use promise::{InitialSuspend, ParentLink, Promise, ResultHolder};

use crate::error::{Error, Result};
use crate::runtime::event_loop::EventLoop;
use crate::runtime::frame::FrameId;
use crate::tracing_compat::trace;
use core::fmt;
use promise::PromiseFrame;
use std::cell::Cell;
use std::future::{Future, IntoFuture};
use std::rc::Rc;
use std::task::Context;

/// Handle owning one task frame.
#[must_use = "tasks do nothing unless started, awaited, or driven by the loop"]
pub struct Task<T> {
    promise: Option<Rc<Promise<T>>>,
    frame: Option<FrameId>,
    started: Cell<bool>,
}

impl<T: 'static> Task<T> {
    /// Creates a lazy task: the body does not run until started or awaited.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is active on this thread.
    pub fn new<F>(body: F) -> Self
    where
        F: Future<Output = Result<T>> + 'static,
    {
        Self::with_policy(body, InitialSuspend::Always)
    }

    /// Creates a task and runs its body to the first suspension point.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is active on this thread.
    pub fn eager<F>(body: F) -> Self
    where
        F: Future<Output = Result<T>> + 'static,
    {
        Self::with_policy(body, InitialSuspend::Never)
    }

    /// Creates a task with an explicit initial suspension policy.
    ///
    /// The task is bound to the loop active at this call, not to whichever
    /// loop later awaits it.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is active on this thread.
    pub fn with_policy<F>(body: F, policy: InitialSuspend) -> Self
    where
        F: Future<Output = Result<T>> + 'static,
    {
        let event_loop = EventLoop::active();
        let promise = Rc::new(Promise::bound_to(&event_loop));
        let frame = PromiseFrame::new(body, Rc::clone(&promise));
        let id = event_loop.insert_frame(Box::pin(frame));
        let task = Self {
            promise: Some(promise),
            frame: Some(id),
            started: Cell::new(false),
        };
        if !policy.suspends() {
            task.started.set(true);
            event_loop.resume_frame(id);
        }
        task
    }
}

impl<T> Task<T> {
    /// Returns true once the task has been started or was created eager.
    #[must_use]
    pub fn started(&self) -> bool {
        self.started.get()
    }

    /// Returns true if the task owns no frame or its body has finished.
    #[must_use]
    pub fn done(&self) -> bool {
        self.promise.as_ref().map_or(true, |p| p.is_complete())
    }

    /// The frame this task owns.
    #[must_use]
    pub fn frame_id(&self) -> Option<FrameId> {
        self.frame
    }

    /// The control block of the owned frame.
    #[must_use]
    pub fn promise(&self) -> Option<&Promise<T>> {
        self.promise.as_deref()
    }

    /// Runs the body until its first suspension point or completion.
    ///
    /// # Panics
    ///
    /// Panics if the task is already done or was already started.
    pub fn start(&self) {
        assert!(!self.done(), "cannot start a task that is already done");
        assert!(
            !self.started.get(),
            "cannot start a task that is already running"
        );
        self.started.set(true);
        trace!(frame = ?self.frame, "task started");
        self.drive();
    }

    /// Re-enters the body at its last suspension point.
    ///
    /// # Panics
    ///
    /// Panics if the task was never started or is already done.
    pub fn resume(&self) {
        assert!(
            self.started.get(),
            "cannot resume a task that is not running"
        );
        assert!(!self.done(), "cannot resume a task that is already done");
        self.drive();
    }

    /// Borrows the result, re-raising a captured failure.
    ///
    /// Repeated calls return the same value without re-running the body.
    /// Fails with `BrokenTask` if the task owns no frame, and with
    /// `InvalidState` if the body has not finished.
    pub fn result(&self) -> Result<&T> {
        let promise = self.promise.as_ref().ok_or_else(Error::broken_task)?;
        promise
            .result()
            .ok_or_else(|| Error::invalid_state("task has not finished"))?
            .get()
    }

    /// Releases the frame and returns the owned result.
    pub fn into_result(mut self) -> Result<T> {
        let promise = self.release().ok_or_else(Error::broken_task)?;
        match Rc::try_unwrap(promise) {
            Ok(promise) => promise.into_result(),
            Err(_) => Err(Error::invalid_state("task promise is still shared")),
        }
    }

    /// Moves the frame out, leaving this handle done and broken.
    pub fn take(&mut self) -> Self {
        std::mem::replace(
            self,
            Self {
                promise: None,
                frame: None,
                started: Cell::new(false),
            },
        )
    }

    fn drive(&self) {
        if let (Some(promise), Some(id)) = (&self.promise, self.frame) {
            if let Some(event_loop) = promise.event_loop() {
                event_loop.resume_frame(id);
            }
        }
    }

    /// Links the awaiting context as parent and, on first await of an
    /// unstarted task, transfers control into its frame.
    ///
    /// Returns true if the task is done afterwards.
    pub(crate) fn await_suspend(&self, cx: &Context<'_>, first: bool) -> bool {
        let (Some(promise), Some(id)) = (&self.promise, self.frame) else {
            return true;
        };
        let Some(event_loop) = promise.event_loop() else {
            return true;
        };

        match event_loop.current_frame() {
            Some(parent) if first => promise.set_parent(ParentLink::Frame(parent)),
            Some(_) => {}
            None => promise.set_parent(ParentLink::Waker(cx.waker().clone())),
        }
        if !self.started.get() {
            self.started.set(true);
            trace!(frame = ?id, parent = ?event_loop.current_frame(), "awaited task started");
            event_loop.resume_frame(id);
        }
        self.done()
    }

    /// Destroys the owned frame, returning the promise.
    fn release(&mut self) -> Option<Rc<Promise<T>>> {
        let promise = self.promise.take()?;
        if let Some(id) = self.frame.take() {
            if let Some(event_loop) = promise.event_loop() {
                event_loop.destroy_frame(id);
            }
        }
        Some(promise)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        drop(self.release());
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("frame", &self.frame)
            .field("started", &self.started.get())
            .field("done", &self.done())
            .finish()
    }
}

impl<'a, T> IntoFuture for &'a Task<T> {
    type Output = Result<&'a T>;
    type IntoFuture = IdAwaiter<Join<'a, T>>;

    fn into_future(self) -> Self::IntoFuture {
        IdAwaiter::new(Join::new(self))
    }
}

impl<T> IntoFuture for Task<T> {
    type Output = Result<T>;
    type IntoFuture = IdAwaiter<JoinOwned<T>>;

    fn into_future(self) -> Self::IntoFuture {
        IdAwaiter::new(JoinOwned::new(self))
    }
}
