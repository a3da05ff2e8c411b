//! Task lifecycle integration tests.
//!
//! # Construction
//! - Eager tasks run to their first suspension inside the constructor
//! - Lazy tasks do nothing until started or awaited
//!
//! # Results
//! - Values are stable across repeated reads
//! - Captured failures are re-raised on every read, verbatim
//! - Moved-from handles report the broken-task condition
//!
//! # Ownership
//! - Exactly one frame per task, released exactly once

#[macro_use]
mod common;

use common::*;
use covent::{sleep, Error, ErrorKind, Task};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug)]
struct Refused;

impl std::fmt::Display for Refused {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("connection refused")
    }
}

impl std::error::Error for Refused {}

#[test]
fn eager_task_returning_42() {
    init_test_logging();
    test_phase!("eager_task_returning_42");
    let (ev, _lab) = lab_loop();
    let _enter = ev.enter();

    let a = Task::eager(async { Ok(42) });
    assert_with_log!(a.done(), "done immediately", true, a.done());
    assert_eq!(*a.result().unwrap(), 42);
    test_complete!("eager_task_returning_42");
}

#[test]
fn lazy_task_sleeps_then_returns_7() {
    init_test_logging();
    test_phase!("lazy_task_sleeps_then_returns_7");
    let (ev, lab) = lab_loop();
    let _enter = ev.enter();

    let b = Task::new(async {
        sleep(Duration::from_millis(10)).await?;
        Ok(7)
    });
    assert!(!b.done());
    assert!(!b.started());

    test_section!("start suspends on the timer");
    b.start();
    assert!(!b.done());
    assert_eq!(lab.armed_timers(), 1);

    test_section!("loop delivers the timer completion");
    ev.run_until_idle().unwrap();
    assert!(b.done());
    assert_eq!(*b.result().unwrap(), 7);
    assert_eq!(lab.now(), Duration::from_millis(10));
    test_complete!("lazy_task_sleeps_then_returns_7");
}

#[test]
fn failing_task_reraises_exact_failure() {
    init_test_logging();
    test_phase!("failing_task_reraises_exact_failure");
    let (ev, _lab) = lab_loop();
    let _enter = ev.enter();

    let c: Task<()> = Task::new(async { Err(Error::from_source(Refused)) });
    let err = ev.block_on(&c).unwrap_err();
    assert!(c.done());
    assert_eq!(err.kind(), ErrorKind::User);
    assert_eq!(err.to_string(), "User: connection refused");

    let again = c.result().unwrap_err();
    assert!(err.same_source(&again), "later reads keep re-raising the same failure");
    let source = std::error::Error::source(&again).expect("source kept");
    assert!(source.downcast_ref::<Refused>().is_some());
    test_complete!("failing_task_reraises_exact_failure");
}

#[test]
fn result_before_completion_is_invalid_state() {
    init_test_logging();
    let (ev, _lab) = lab_loop();
    let _enter = ev.enter();

    let task = Task::new(async { Ok(1) });
    assert_eq!(task.result().unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn body_runs_once_regardless_of_reads() {
    init_test_logging();
    let (ev, _lab) = lab_loop();
    let _enter = ev.enter();
    let runs = Rc::new(Cell::new(0));

    let task = Task::new({
        let runs = Rc::clone(&runs);
        async move {
            runs.set(runs.get() + 1);
            Ok(runs.get())
        }
    });
    for _ in 0..3 {
        assert_eq!(*ev.block_on(&task).unwrap(), 1);
    }
    assert_eq!(runs.get(), 1);
}

#[test]
fn moving_a_task_transfers_its_single_frame() {
    init_test_logging();
    test_phase!("moving_a_task_transfers_its_single_frame");
    let (ev, _lab) = lab_loop();
    let _enter = ev.enter();

    let mut source = Task::new(async {
        sleep(Duration::from_millis(1)).await?;
        Ok("moved")
    });
    let frame = source.frame_id();
    let target = source.take();

    assert!(source.done());
    assert!(source.result().unwrap_err().is_broken_task());
    assert_eq!(target.frame_id(), frame);
    assert_eq!(*ev.block_on(&target).unwrap(), "moved");

    drop(source);
    drop(target);
    assert_eq!(ev.live_frames(), 0);
    test_complete!("moving_a_task_transfers_its_single_frame");
}

#[test]
fn dropping_loop_first_is_harmless() {
    init_test_logging();
    let (ev, _lab) = lab_loop();
    let task = {
        let _enter = ev.enter();
        Task::eager(async {
            sleep(Duration::from_secs(1)).await?;
            Ok(())
        })
    };
    drop(ev);
    assert!(!task.done());
    assert_eq!(task.result().unwrap_err().kind(), ErrorKind::InvalidState);
    drop(task);
}

#[test]
#[should_panic(expected = "no active event loop")]
fn creating_a_task_outside_a_loop_panics() {
    let _task = Task::new(async { Ok(()) });
}
