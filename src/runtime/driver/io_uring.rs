//! io_uring-backed completion driver (Linux only, feature-gated).
//!
//! Each [`Request`] becomes one SQE whose `user_data` is the loop's token.
//! Timeout requests point the kernel at a [`types::Timespec`]; those are kept
//! in a per-token box until the matching CQE is reaped.
//!
//! NOTE: This module uses unsafe to push SQEs. The safety invariants are
//! documented inline.

#[cfg(all(target_os = "linux", feature = "io-uring"))]
mod imp {
    #![allow(unsafe_code)]

    use super::super::{Driver, Request, Token};
    use crate::runtime::op::Completion;
    use crate::tracing_compat::{debug, trace};
    use ::io_uring::{opcode, squeue, types, IoUring};
    use std::collections::HashMap;
    use std::io;
    use std::time::Duration;

    /// io_uring completion driver.
    pub struct IoUringDriver {
        ring: IoUring,
        /// Timespecs referenced by in-flight timeout SQEs.
        timeouts: HashMap<Token, Box<types::Timespec>>,
        in_flight: usize,
    }

    impl std::fmt::Debug for IoUringDriver {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("IoUringDriver")
                .field("in_flight", &self.in_flight)
                .finish_non_exhaustive()
        }
    }

    impl IoUringDriver {
        /// Creates a ring with `entries` submission slots.
        pub fn new(entries: u32) -> io::Result<Self> {
            let ring = IoUring::new(entries)?;
            debug!(entries, "io_uring ring created");
            Ok(Self {
                ring,
                timeouts: HashMap::new(),
                in_flight: 0,
            })
        }

        fn build_entry(&mut self, token: Token, request: Request) -> squeue::Entry {
            match request {
                Request::Nop => opcode::Nop::new().build().user_data(token.0),
                Request::Timeout(ts) => {
                    let boxed = Box::new(types::Timespec::new().sec(ts.sec).nsec(ts.nsec));
                    let ptr: *const types::Timespec = &*boxed;
                    self.timeouts.insert(token, boxed);
                    opcode::Timeout::new(ptr).build().user_data(token.0)
                }
            }
        }

        fn push(&mut self, entry: &squeue::Entry) -> io::Result<()> {
            // SAFETY: the only pointer an entry carries is a timeout's
            // Timespec, boxed in `self.timeouts` until its CQE is reaped.
            if unsafe { self.ring.submission().push(entry) }.is_ok() {
                return Ok(());
            }
            // Queue full: flush to the kernel and retry once.
            self.ring.submit()?;
            unsafe { self.ring.submission().push(entry) }
                .map_err(|_| io::Error::new(io::ErrorKind::WouldBlock, "submission queue full"))
        }

        /// Queues the SQE for `request`. Once queued it counts as in flight,
        /// whether or not the flush that follows reaches the kernel.
        fn enqueue(&mut self, token: Token, request: Request) -> io::Result<()> {
            let entry = self.build_entry(token, request);
            if let Err(err) = self.push(&entry) {
                self.timeouts.remove(&token);
                return Err(err);
            }
            self.in_flight += 1;
            Ok(())
        }

        /// A failed flush leaves the SQE queued; the next wait submits it.
        fn note_flush(&self, token: Token, flushed: io::Result<usize>) {
            if let Err(err) = flushed {
                debug!(
                    token = token.0,
                    error = %err,
                    in_flight = self.in_flight,
                    "flush deferred to next wait"
                );
            }
        }

        fn reap(&mut self, out: &mut Vec<(Token, Completion)>) -> usize {
            let mut reaped = 0;
            for cqe in self.ring.completion() {
                let token = Token(cqe.user_data());
                self.timeouts.remove(&token);
                out.push((token, Completion::new(cqe.result(), cqe.flags())));
                reaped += 1;
            }
            self.in_flight = self.in_flight.saturating_sub(reaped);
            reaped
        }
    }

    impl Driver for IoUringDriver {
        fn name(&self) -> &'static str {
            "io_uring"
        }

        fn submit(&mut self, token: Token, request: Request) -> io::Result<()> {
            self.enqueue(token, request)?;
            let flushed = self.ring.submit();
            self.note_flush(token, flushed);
            trace!(token = token.0, ?request, "sqe submitted");
            Ok(())
        }

        fn wait(
            &mut self,
            out: &mut Vec<(Token, Completion)>,
            timeout: Option<Duration>,
        ) -> io::Result<usize> {
            if self.in_flight == 0 {
                return Ok(0);
            }

            let waited = match timeout {
                None => self.ring.submitter().submit_and_wait(1).map(drop),
                Some(t) if t == Duration::ZERO => self.ring.submitter().submit().map(drop),
                Some(t) => {
                    let ts = types::Timespec::new()
                        .sec(t.as_secs())
                        .nsec(t.subsec_nanos());
                    let args = types::SubmitArgs::new().timespec(&ts);
                    self.ring.submitter().submit_with_args(1, &args).map(drop)
                }
            };
            match waited {
                Ok(()) => {}
                Err(err)
                    if err.raw_os_error() == Some(libc::ETIME)
                        || err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }

            Ok(self.reap(out))
        }

        fn in_flight(&self) -> usize {
            self.in_flight
        }
    }

}

#[cfg(all(target_os = "linux", feature = "io-uring"))]
pub use imp::IoUringDriver;

#[cfg(not(all(target_os = "linux", feature = "io-uring")))]
mod imp {
    use super::super::{Driver, Request, Token};
    use crate::runtime::op::Completion;
    use std::io;
    use std::time::Duration;

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "IoUringDriver is not available (linux + io-uring feature required)",
        )
    }

    /// Stub io_uring driver for non-Linux or when the feature is disabled.
    #[derive(Debug, Default)]
    pub struct IoUringDriver;

    impl IoUringDriver {
        /// Always fails on this platform/config.
        pub fn new(_entries: u32) -> io::Result<Self> {
            Err(unsupported())
        }
    }

    impl Driver for IoUringDriver {
        fn name(&self) -> &'static str {
            "io_uring (unavailable)"
        }

        fn submit(&mut self, _token: Token, _request: Request) -> io::Result<()> {
            Err(unsupported())
        }

        fn wait(
            &mut self,
            _out: &mut Vec<(Token, Completion)>,
            _timeout: Option<Duration>,
        ) -> io::Result<usize> {
            Err(unsupported())
        }

        fn in_flight(&self) -> usize {
            0
        }
    }
}

#[cfg(not(all(target_os = "linux", feature = "io-uring")))]
pub use imp::IoUringDriver;
