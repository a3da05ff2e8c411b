//! Thread-local registry of the active event loop.
//!
//! A loop becomes active for the current thread while an [`EnterGuard`] from
//! [`EventLoop::enter`] is alive. Every promise captures the active loop when
//! it is constructed, and every kernel-bound awaiter is manufactured by it.
//! Guards nest; dropping one restores the loop that was active before it.

use crate::runtime::event_loop::EventLoop;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    /// Loop currently registered on this thread.
    static ACTIVE: RefCell<Option<EventLoop>> = const { RefCell::new(None) };
}

/// Scope guard returned by [`EventLoop::enter`].
///
/// Not `Send`: the registration belongs to the thread that created it.
#[must_use = "the loop is only active while the guard is alive"]
#[derive(Debug)]
pub struct EnterGuard<'a> {
    previous: Option<EventLoop>,
    _loop: PhantomData<&'a EventLoop>,
    _not_send: PhantomData<*const ()>,
}

pub(crate) fn enter(event_loop: &EventLoop) -> EnterGuard<'_> {
    let previous = ACTIVE.with(|active| active.borrow_mut().replace(event_loop.clone()));
    EnterGuard {
        previous,
        _loop: PhantomData,
        _not_send: PhantomData,
    }
}

impl Drop for EnterGuard<'_> {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // The displaced loop may be the last strong handle; drop it outside the borrow.
        let _displaced = ACTIVE.with(|active| std::mem::replace(&mut *active.borrow_mut(), previous));
    }
}

/// Returns the loop active on this thread, if any.
pub(crate) fn try_active() -> Option<EventLoop> {
    ACTIVE.with(|active| active.borrow().clone())
}

/// Returns the loop active on this thread.
///
/// # Panics
///
/// Panics if no loop is active.
pub(crate) fn active() -> EventLoop {
    match try_active() {
        Some(event_loop) => event_loop,
        None => panic!("no active event loop: call `EventLoop::enter` or run inside `block_on`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_registers_and_restores() {
        assert!(try_active().is_none());
        let outer = EventLoop::lab();
        let inner = EventLoop::lab();
        {
            let _outer = outer.enter();
            assert!(try_active().is_some_and(|ev| ev.ptr_eq(&outer)));
            {
                let _inner = inner.enter();
                assert!(active().ptr_eq(&inner));
            }
            assert!(active().ptr_eq(&outer));
        }
        assert!(try_active().is_none());
    }

    #[test]
    #[should_panic(expected = "no active event loop")]
    fn active_outside_scope_panics() {
        let _ = active();
    }
}
