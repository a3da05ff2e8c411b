//! Frame table: storage for suspended task bodies.
//!
//! A frame is the type-erased state machine behind one [`Task`](crate::Task).
//! Frames live in a generation-checked arena owned by the event loop; the
//! task holds the [`FrameId`] and is the only party allowed to remove it.
//!
//! While a frame runs it is checked out of the table (state `Running`), so a
//! body can freely create, await, or drop other tasks without holding a
//! borrow of the table.

use crate::task::FinalAwaiter;
use crate::util::{Arena, ArenaIndex};
use core::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Identifier of a frame in the loop's frame table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(ArenaIndex);

impl FrameId {
    /// Creates a frame id from an arena index (primarily for testing).
    #[must_use]
    pub const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    /// Returns the underlying arena index.
    #[must_use]
    pub const fn arena_index(self) -> ArenaIndex {
        self.0
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({}:{})", self.0.index(), self.0.generation())
    }
}

/// A resumable task body with its control block.
pub(crate) trait Frame {
    /// Runs the body until its next suspension point or completion.
    ///
    /// Returns `Ready` once the result has been stored; never polls the body
    /// again after that.
    fn resume(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()>;

    /// The awaiter that runs once the body has finished.
    fn final_suspend(&self) -> FinalAwaiter;
}

pub(crate) type BoxedFrame = Pin<Box<dyn Frame>>;

enum FrameState {
    Suspended(BoxedFrame),
    Running,
    Finished(BoxedFrame),
}

impl FrameState {
    const fn name(&self) -> &'static str {
        match self {
            Self::Suspended(_) => "Suspended",
            Self::Running => "Running",
            Self::Finished(_) => "Finished",
        }
    }
}

pub(crate) struct FrameSlot {
    state: FrameState,
    resumes: u64,
}

impl fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSlot")
            .field("state", &self.state.name())
            .field("resumes", &self.resumes)
            .finish()
    }
}

#[derive(Debug, Default)]
pub(crate) struct FrameTable {
    frames: Arena<FrameSlot>,
}

impl FrameTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn insert(&mut self, frame: BoxedFrame) -> FrameId {
        FrameId(self.frames.insert(FrameSlot {
            state: FrameState::Suspended(frame),
            resumes: 0,
        }))
    }

    /// Takes a suspended frame out for resumption.
    ///
    /// Returns `None` if the frame is gone, already running, or finished.
    pub(crate) fn checkout(&mut self, id: FrameId) -> Option<(BoxedFrame, u64)> {
        let slot = self.frames.get_mut(id.0)?;
        match std::mem::replace(&mut slot.state, FrameState::Running) {
            FrameState::Suspended(frame) => {
                slot.resumes += 1;
                Some((frame, slot.resumes))
            }
            other => {
                slot.state = other;
                None
            }
        }
    }

    /// Returns a frame after resumption.
    ///
    /// If the slot was removed meanwhile, the frame is handed back so the
    /// caller can drop it outside any borrow of the table.
    pub(crate) fn checkin(
        &mut self,
        id: FrameId,
        frame: BoxedFrame,
        finished: bool,
    ) -> Option<BoxedFrame> {
        let Some(slot) = self.frames.get_mut(id.0) else {
            return Some(frame);
        };
        slot.state = if finished {
            FrameState::Finished(frame)
        } else {
            FrameState::Suspended(frame)
        };
        None
    }

    pub(crate) fn remove(&mut self, id: FrameId) -> Option<FrameSlot> {
        self.frames.remove(id.0)
    }

    pub(crate) fn is_suspended(&self, id: FrameId) -> bool {
        matches!(
            self.frames.get(id.0).map(|s| &s.state),
            Some(FrameState::Suspended(_))
        )
    }

    pub(crate) fn is_running(&self, id: FrameId) -> bool {
        matches!(
            self.frames.get(id.0).map(|s| &s.state),
            Some(FrameState::Running)
        )
    }

    #[cfg(test)]
    pub(crate) fn resumes(&self, id: FrameId) -> Option<u64> {
        self.frames.get(id.0).map(|s| s.resumes)
    }
}
