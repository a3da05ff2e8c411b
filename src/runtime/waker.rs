//! Frame wakers.
//!
//! Each resumption hands the frame a [`Waker`] carrying its [`FrameId`].
//! Waking only queues the id: the loop drains the queue on its own thread and
//! resumes the frames there, so a waker may be cloned into other threads.
//!
//! A frame is queued at most once between two drains. The queue keeps wake
//! order, and a set beside it answers "already queued?" without scanning.

use crate::runtime::frame::FrameId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Wake, Waker};

#[derive(Debug, Default)]
struct WokenQueue {
    order: Vec<FrameId>,
    queued: HashSet<FrameId>,
}

/// Queue of frames woken since the loop last looked.
#[derive(Debug, Default)]
pub struct WakerState {
    woken: Mutex<WokenQueue>,
}

impl WakerState {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the waker handed to `frame` while it runs.
    #[must_use]
    pub fn waker_for(self: &Arc<Self>, frame: FrameId) -> Waker {
        Waker::from(Arc::new(FrameWaker {
            state: Arc::clone(self),
            frame,
        }))
    }

    /// Queues `frame` unless it is already queued.
    pub fn wake(&self, frame: FrameId) {
        let mut woken = self.woken.lock();
        if woken.queued.insert(frame) {
            woken.order.push(frame);
        }
    }

    /// Takes the queued frames in wake order.
    pub fn drain_woken(&self) -> Vec<FrameId> {
        let mut woken = self.woken.lock();
        woken.queued.clear();
        std::mem::take(&mut woken.order)
    }
}

struct FrameWaker {
    state: Arc<WakerState>,
    frame: FrameId,
}

impl Wake for FrameWaker {
    fn wake(self: Arc<Self>) {
        self.state.wake(self.frame);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.state.wake(self.frame);
    }
}
