//! Deterministic lab driver for testing.
//!
//! The [`LabDriver`] stands in for the kernel ring. Instead of blocking, a
//! [`wait`](Driver::wait) call advances a virtual clock to the next armed
//! timeout, so a 10 second sleep completes instantly and reproducibly.
//!
//! # Features
//!
//! - **Virtual time**: time advances only through `wait()` or [`LabDriver::advance`]
//! - **Kernel-shaped results**: timeouts complete with `-ETIME`, nops with `0`
//! - **Fault injection**: [`LabDriver::fail_next`] fails the next submission
//!
//! The driver is a cheap handle; clones share state, so a test can keep one
//! clone to inspect the clock while the loop owns another.
//!
//! ```ignore
//! let lab = LabDriver::new();
//! let ev = EventLoop::builder().driver_instance(lab.clone()).build()?;
//! // ... run a task that sleeps 10ms ...
//! assert_eq!(lab.now(), Duration::from_millis(10));
//! ```

use super::{Driver, Request, Token};
use crate::runtime::op::Completion;
use crate::tracing_compat::trace;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Default)]
struct LabState {
    now: Duration,
    /// Armed timeouts keyed by `(deadline, submission number)`, so equal
    /// deadlines expire in submission order.
    timers: BTreeMap<(Duration, u64), Token>,
    ready: VecDeque<(Token, Completion)>,
    fail_next: Option<i32>,
    submitted: u64,
}

impl LabState {
    fn arm(&mut self, token: Token, deadline: Duration) {
        self.timers.insert((deadline, self.submitted), token);
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.timers.keys().next().map(|&(deadline, _)| deadline)
    }

    /// Moves every timeout due at or before `now` to the ready queue.
    fn expire(&mut self) {
        let pending = self.timers.split_off(&(self.now, u64::MAX));
        let due = std::mem::replace(&mut self.timers, pending);
        for token in due.into_values() {
            self.ready.push_back((token, Completion::new(-libc::ETIME, 0)));
        }
    }
}

/// Virtual-time completion driver.
#[derive(Debug, Clone, Default)]
pub struct LabDriver {
    state: Rc<RefCell<LabState>>,
}

impl LabDriver {
    /// Creates a driver with the virtual clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Moves the virtual clock forward, expiring any timeouts it passes.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.borrow_mut();
        state.now = state.now.saturating_add(by);
        state.expire();
    }

    /// Makes the next submitted request complete with `-errno`.
    pub fn fail_next(&self, errno: i32) {
        self.state.borrow_mut().fail_next = Some(errno);
    }

    /// Total number of requests submitted so far.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.state.borrow().submitted
    }

    /// Number of armed, not yet expired timeouts.
    #[must_use]
    pub fn armed_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }
}

impl Driver for LabDriver {
    fn name(&self) -> &'static str {
        "lab"
    }

    fn submit(&mut self, token: Token, request: Request) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.submitted += 1;
        if let Some(errno) = state.fail_next.take() {
            state.ready.push_back((token, Completion::new(-errno, 0)));
            return Ok(());
        }
        match request {
            Request::Nop => state.ready.push_back((token, Completion::new(0, 0))),
            Request::Timeout(ts) => {
                let deadline = state.now.saturating_add(ts.as_duration());
                state.arm(token, deadline);
            }
        }
        trace!(token = token.0, ?request, "lab request submitted");
        Ok(())
    }

    fn wait(
        &mut self,
        out: &mut Vec<(Token, Completion)>,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.ready.is_empty() {
            if let Some(deadline) = state.next_deadline() {
                let limit = timeout.map_or(deadline, |t| state.now.saturating_add(t));
                state.now = state.now.max(deadline.min(limit));
                state.expire();
            }
        }

        let n = state.ready.len();
        out.extend(state.ready.drain(..));
        Ok(n)
    }

    fn in_flight(&self) -> usize {
        let state = self.state.borrow();
        state.ready.len() + state.timers.len()
    }
}
