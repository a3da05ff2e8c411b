//! Single-threaded event loop over a completion driver.
//!
//! The loop owns three tables:
//!
//! - **frames**: every task frame, keyed by [`FrameId`]
//! - **ops**: one [`OpSlot`] per submitted kernel request, keyed by [`Token`]
//! - **wakers**: the deduplicated list of frames woken since the last turn
//!
//! A [`turn`](EventLoop::turn) first resumes woken frames. If none were woken it
//! waits on the driver, delivers each completion into its slot, wakes the
//! frame that submitted it, and resumes those frames. When a frame finishes,
//! its [`FinalAwaiter`](crate::task::FinalAwaiter) decides whether a suspended parent is resumed on the
//! spot.
//!
//! Tokens are the op slot's arena index packed with its generation, so a
//! completion can never be delivered to a slot reused by a later request.

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::config::{DriverKind, LoopConfig};
use crate::runtime::driver::{Driver, LabDriver, Request, Token};
use crate::runtime::frame::{BoxedFrame, FrameId, FrameTable};
use crate::runtime::local::{self, EnterGuard};
use crate::runtime::op::{Completion, OpSlot};
use crate::runtime::sleep::Event;
use crate::runtime::waker::WakerState;
use crate::runtime::EventLoopBuilder;
use crate::task::{Continuation, Task};
use crate::tracing_compat::{debug, trace, warn};
use crate::util::{Arena, ArenaIndex};
use core::fmt;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Waker};
use std::time::Duration;

/// Counters describing the work a loop has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Frame resumptions, including synchronous parent resumptions.
    pub frames_resumed: u64,
    /// Requests handed to the driver.
    pub submissions: u64,
    /// Completions delivered to a live awaiter.
    pub completions: u64,
    /// Completions discarded because their awaiter was dropped.
    pub orphaned_completions: u64,
}

pub(crate) struct LoopInner {
    driver: RefCell<Box<dyn Driver>>,
    frames: RefCell<FrameTable>,
    ops: RefCell<Arena<OpSlot>>,
    wakers: Arc<WakerState>,
    current: Cell<Option<FrameId>>,
    completions: RefCell<Vec<(Token, Completion)>>,
    stats: Cell<LoopStats>,
    config: LoopConfig,
}

impl Drop for LoopInner {
    fn drop(&mut self) {
        let pending = self.ops.get_mut().len();
        if pending > 0 {
            debug!(pending, "event loop dropped with operations in flight");
        }
    }
}

/// Handle to a single-threaded event loop.
///
/// Cheap to clone; clones refer to the same loop. The loop is not `Send`.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

/// Non-owning back-reference to a loop, held by promises and awaiters.
#[derive(Clone, Default)]
pub(crate) struct LoopRef(Weak<LoopInner>);

impl LoopRef {
    pub(crate) fn upgrade(&self) -> Option<EventLoop> {
        self.0.upgrade().map(|inner| EventLoop { inner })
    }
}

impl fmt::Debug for LoopRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoopRef")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("driver", &self.driver_name())
            .field("frames", &self.live_frames())
            .field("pending_operations", &self.pending_operations())
            .field("stats", &self.stats())
            .finish()
    }
}

impl EventLoop {
    /// Creates an io_uring-backed loop with default configuration.
    pub fn new() -> Result<Self> {
        EventLoopBuilder::new().build()
    }

    /// Creates a loop driven by a fresh virtual-time [`LabDriver`].
    #[must_use]
    pub fn lab() -> Self {
        let config = LoopConfig {
            driver: DriverKind::Lab,
            ..LoopConfig::default()
        };
        Self::from_parts(config, Box::new(LabDriver::new()))
    }

    /// Returns a builder for custom configuration.
    #[must_use]
    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder::new()
    }

    pub(crate) fn from_parts(config: LoopConfig, driver: Box<dyn Driver>) -> Self {
        Self {
            inner: Rc::new(LoopInner {
                driver: RefCell::new(driver),
                frames: RefCell::new(FrameTable::new()),
                ops: RefCell::new(Arena::new()),
                wakers: Arc::new(WakerState::new()),
                current: Cell::new(None),
                completions: RefCell::new(Vec::with_capacity(config.completion_batch)),
                stats: Cell::new(LoopStats::default()),
                config,
            }),
        }
    }

    /// Registers this loop as the active loop for the current thread.
    pub fn enter(&self) -> EnterGuard<'_> {
        local::enter(self)
    }

    /// Returns the active loop of the current thread.
    ///
    /// # Panics
    ///
    /// Panics if no loop is active.
    #[must_use]
    pub fn active() -> Self {
        local::active()
    }

    /// Returns the active loop of the current thread, if any.
    #[must_use]
    pub fn try_active() -> Option<Self> {
        local::try_active()
    }

    /// Returns true if both handles refer to the same loop.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Builds the awaiter for `event`, bound to this loop.
    ///
    /// The request is submitted when the awaiter is first polled.
    pub fn create_event_awaiter<E: Event>(&self, event: E) -> E::Awaiter {
        event.create(self)
    }

    /// Resolved configuration of this loop.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.inner.config
    }

    /// Name of the completion driver.
    #[must_use]
    pub fn driver_name(&self) -> &'static str {
        self.inner.driver.borrow().name()
    }

    /// Snapshot of the loop counters.
    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.inner.stats.get()
    }

    /// The frame currently being resumed, if any.
    #[must_use]
    pub fn current_frame(&self) -> Option<FrameId> {
        self.inner.current.get()
    }

    /// Op slots that have not been consumed or discarded yet.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.inner.ops.borrow().len()
    }

    /// Frames currently owned by live tasks.
    #[must_use]
    pub fn live_frames(&self) -> usize {
        self.inner.frames.borrow().len()
    }

    /// Runs one reactor iteration.
    ///
    /// Returns `Ok(false)` when the loop is idle: no frame was woken and no
    /// request is in flight.
    pub fn turn(&self, timeout: Option<Duration>) -> Result<bool> {
        let _enter = self.enter();
        if self.resume_woken() > 0 {
            return Ok(true);
        }
        if self.inner.driver.borrow().in_flight() == 0 {
            return Ok(false);
        }

        let mut completions = std::mem::take(&mut *self.inner.completions.borrow_mut());
        let reaped = self
            .inner
            .driver
            .borrow_mut()
            .wait(&mut completions, timeout);
        let reaped = match reaped {
            Ok(n) => n,
            Err(err) => {
                *self.inner.completions.borrow_mut() = completions;
                return Err(Error::from(err).with_message("waiting for completions failed"));
            }
        };
        trace!(reaped, "completions reaped");

        for (token, completion) in completions.drain(..) {
            self.dispatch(token, completion);
        }
        *self.inner.completions.borrow_mut() = completions;

        self.resume_woken();
        Ok(true)
    }

    /// Drives `task` to completion and returns its result.
    ///
    /// Starts the task if it has not been started. Fails with
    /// [`ErrorKind::Stalled`] if the task is still pending while the loop has
    /// nothing left to do.
    pub fn block_on<'t, T>(&self, task: &'t Task<T>) -> Result<&'t T> {
        let _enter = self.enter();
        if !task.started() && !task.done() {
            task.start();
        }
        while !task.done() {
            if !self.turn(None)? {
                warn!(frame = ?task.frame_id(), "task stalled: nothing submitted or woken");
                return Err(Error::new(ErrorKind::Stalled)
                    .with_message("task is suspended but the loop has no pending work"));
            }
        }
        task.result()
    }

    /// Drives `task` to completion and returns its owned result.
    pub fn run<T>(&self, task: Task<T>) -> Result<T> {
        self.block_on(&task).map(drop)?;
        task.into_result()
    }

    /// Turns until no frame is woken and no request is in flight.
    pub fn run_until_idle(&self) -> Result<()> {
        while self.turn(None)? {}
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> LoopRef {
        LoopRef(Rc::downgrade(&self.inner))
    }

    pub(crate) fn insert_frame(&self, frame: BoxedFrame) -> FrameId {
        let id = self.inner.frames.borrow_mut().insert(frame);
        trace!(frame = ?id, "frame created");
        id
    }

    /// Releases a frame. The frame is dropped outside the table borrow so
    /// that child tasks it owns can release their own frames.
    pub(crate) fn destroy_frame(&self, id: FrameId) {
        let slot = self.inner.frames.borrow_mut().remove(id);
        if slot.is_some() {
            trace!(frame = ?id, "frame destroyed");
        }
        drop(slot);
    }

    pub(crate) fn is_frame_suspended(&self, id: FrameId) -> bool {
        self.inner.frames.borrow().is_suspended(id)
    }

    /// Resumes a suspended frame until its next suspension point.
    ///
    /// Returns false if the frame is missing, running, or finished. When the
    /// frame finishes, its final awaiter runs before this returns, and a
    /// suspended parent it names is resumed in the same call. Parents are
    /// walked in a loop, so a long chain finishing at once uses constant stack.
    pub(crate) fn resume_frame(&self, id: FrameId) -> bool {
        let Some(mut continuation) = self.step_frame(id) else {
            return false;
        };
        loop {
            match continuation {
                Continuation::Resume(parent) => {
                    trace!(parent = ?parent, "resuming parent");
                    match self.step_frame(parent) {
                        Some(next) => continuation = next,
                        None => break,
                    }
                }
                Continuation::Wake(waker) => {
                    waker.wake();
                    break;
                }
                Continuation::Noop => break,
            }
        }
        true
    }

    /// Runs one frame once. `None` if it could not be checked out; otherwise
    /// where control goes next (`Noop` if the frame only suspended).
    fn step_frame(&self, id: FrameId) -> Option<Continuation> {
        let (mut frame, resumes) = self.inner.frames.borrow_mut().checkout(id)?;

        let _enter = self.enter();
        let previous = self.inner.current.replace(Some(id));
        let waker = self.inner.wakers.waker_for(id);
        let mut cx = Context::from_waker(&waker);
        trace!(frame = ?id, resumes, "resuming frame");
        let finished = frame.as_mut().resume(&mut cx).is_ready();
        self.inner.current.set(previous);

        let final_awaiter = finished.then(|| frame.final_suspend());
        let leftover = self.inner.frames.borrow_mut().checkin(id, frame, finished);
        drop(leftover);
        self.update_stats(|stats| stats.frames_resumed += 1);

        Some(match final_awaiter {
            Some(final_awaiter) => {
                trace!(frame = ?id, "frame reached final suspension");
                final_awaiter.suspend(self)
            }
            None => Continuation::Noop,
        })
    }

    /// Resumes every frame woken since the last call. Returns how many ran.
    ///
    /// A woken frame that is running (its body called `block_on`) is queued
    /// again for a later turn instead of losing the wake.
    fn resume_woken(&self) -> usize {
        let woken = self.inner.wakers.drain_woken();
        let mut resumed = 0;
        for id in woken {
            if self.resume_frame(id) {
                resumed += 1;
            } else if self.inner.frames.borrow().is_running(id) {
                trace!(frame = ?id, "woken frame is running, deferring wake");
                self.inner.wakers.wake(id);
            }
        }
        resumed
    }

    pub(crate) fn submit(&self, request: Request, waker: Waker) -> Result<Token> {
        let index = self.inner.ops.borrow_mut().insert(OpSlot::new(waker));
        let token = Token(index.to_u64());
        let submitted = self.inner.driver.borrow_mut().submit(token, request);
        if let Err(err) = submitted {
            self.inner.ops.borrow_mut().remove(index);
            return Err(Error::from(err).with_message("request submission failed"));
        }
        self.update_stats(|stats| stats.submissions += 1);
        trace!(token = token.0, ?request, frame = ?self.current_frame(), "request submitted");
        Ok(token)
    }

    /// Takes the completion for `token` if it has arrived; otherwise records
    /// `waker` as the one to wake.
    pub(crate) fn take_completion(&self, token: Token, waker: &Waker) -> Option<Completion> {
        let index = ArenaIndex::from_u64(token.0);
        let mut ops = self.inner.ops.borrow_mut();
        let completion = ops.get_mut(index)?.take(waker)?;
        ops.remove(index);
        Some(completion)
    }

    /// Detaches the awaiter from `token`. Its completion is discarded.
    pub(crate) fn orphan(&self, token: Token) {
        let index = ArenaIndex::from_u64(token.0);
        let mut ops = self.inner.ops.borrow_mut();
        let Some(slot) = ops.get_mut(index) else {
            return;
        };
        if slot.has_completion() {
            ops.remove(index);
        } else {
            slot.orphan();
        }
        trace!(token = token.0, "operation orphaned");
    }

    fn dispatch(&self, token: Token, completion: Completion) {
        let index = ArenaIndex::from_u64(token.0);
        let mut ops = self.inner.ops.borrow_mut();
        let Some(slot) = ops.get_mut(index) else {
            warn!(token = token.0, "completion for unknown token");
            return;
        };
        if slot.is_orphaned() {
            ops.remove(index);
            drop(ops);
            self.update_stats(|stats| stats.orphaned_completions += 1);
            trace!(token = token.0, result = completion.result, "orphaned completion discarded");
            return;
        }
        let waker = slot.complete(completion);
        drop(ops);
        self.update_stats(|stats| stats.completions += 1);
        trace!(
            token = token.0,
            result = completion.result,
            flags = completion.flags,
            "completion delivered"
        );
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut LoopStats)) {
        let mut stats = self.inner.stats.get();
        f(&mut stats);
        self.inner.stats.set(stats);
    }
}
