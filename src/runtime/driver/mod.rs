//! Completion-driver abstraction over the kernel submission/completion ring.
//!
//! The [`EventLoop`](crate::runtime::EventLoop) owns exactly one [`Driver`].
//! Tasks never touch it; kernel-bound awaiters hand it a [`Request`] through
//! the loop and later receive the `(result, flags)` pair of the matching
//! completion, keyed by the [`Token`] chosen at submission time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  submit(token, request)  ┌──────────────┐
//! │  EventLoop   │ ───────────────────────▶ │    Driver    │
//! │ (op slots)   │ ◀─────────────────────── │ (io_uring /  │
//! └──────────────┘  wait() → (token, cqe)   │  lab clock)  │
//!                                            └──────────────┘
//! ```
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | [`IoUringDriver`] | `io_uring.rs` | Linux kernel ring (`io-uring` feature) |
//! | [`LabDriver`] | `lab.rs` | Deterministic virtual time for tests |

mod io_uring;
mod lab;

pub use self::io_uring::IoUringDriver;
pub use lab::LabDriver;

use crate::runtime::op::Completion;
use std::io;
use std::time::Duration;

/// Identifies one submitted request; echoed back with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

/// A duration in the kernel's timeout-request layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Timespec {
    /// Whole seconds.
    pub sec: u64,
    /// Nanoseconds past `sec` (always below one second).
    pub nsec: u32,
}

impl Timespec {
    /// Converts back into a [`Duration`].
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::new(self.sec, self.nsec)
    }
}

impl From<Duration> for Timespec {
    fn from(d: Duration) -> Self {
        Self {
            sec: d.as_secs(),
            nsec: d.subsec_nanos(),
        }
    }
}

/// An operation request descriptor built by an awaiter's setup hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Request {
    /// Completes immediately with result `0`.
    Nop,
    /// Relative timeout; completes with `-ETIME` once it expires.
    Timeout(Timespec),
}

/// Kernel submission/completion backend.
///
/// Delivery is reliable and exactly-once per submitted request.
pub trait Driver {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Submits `request`; its completion will carry `token`.
    fn submit(&mut self, token: Token, request: Request) -> io::Result<()>;

    /// Appends ready completions to `out` and returns how many were added.
    ///
    /// Blocks until at least one completion is available, or `timeout`
    /// elapses. `Some(Duration::ZERO)` never blocks. Returns immediately with
    /// `0` when nothing is in flight.
    fn wait(
        &mut self,
        out: &mut Vec<(Token, Completion)>,
        timeout: Option<Duration>,
    ) -> io::Result<usize>;

    /// Number of submitted requests whose completion has not been reaped.
    fn in_flight(&self) -> usize;
}
