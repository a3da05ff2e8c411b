//! io_uring driver tests against the real kernel.
//!
//! Skipped at runtime when the kernel refuses to create a ring (old kernels,
//! seccomp-restricted containers).

#![cfg(all(target_os = "linux", feature = "io-uring"))]

#[macro_use]
mod common;

use common::*;
use covent::{sleep, yield_now, EventLoop, Task};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn kernel_loop() -> Option<EventLoop> {
    match EventLoop::new() {
        Ok(ev) => Some(ev),
        Err(err) => {
            tracing::warn!(error = %err, "io_uring unavailable, skipping");
            None
        }
    }
}

#[test]
fn sleep_waits_at_least_its_duration() {
    init_test_logging();
    test_phase!("sleep_waits_at_least_its_duration");
    let Some(ev) = kernel_loop() else { return };
    assert_eq!(ev.driver_name(), "io_uring");
    let _enter = ev.enter();

    let started = Instant::now();
    let task = Task::new(async {
        sleep(Duration::from_millis(20)).await?;
        Ok(7)
    });
    assert_eq!(*ev.block_on(&task).unwrap(), 7);
    let elapsed = started.elapsed();
    assert_with_log!(
        elapsed >= Duration::from_millis(20),
        "sleep duration honored",
        ">= 20ms",
        elapsed
    );
    test_complete!("sleep_waits_at_least_its_duration");
}

#[test]
fn zero_sleep_still_round_trips() {
    init_test_logging();
    let Some(ev) = kernel_loop() else { return };
    let _enter = ev.enter();

    let task = Task::eager(async {
        sleep(Duration::ZERO).await?;
        Ok(())
    });
    assert!(!task.done(), "never ready before the kernel answers");
    ev.block_on(&task).unwrap();
    assert_eq!(ev.stats().completions, 1);
}

#[test]
fn kernel_timers_complete_in_deadline_order() {
    init_test_logging();
    test_phase!("kernel_timers_complete_in_deadline_order");
    let Some(ev) = kernel_loop() else { return };
    let _enter = ev.enter();
    let order = Rc::new(RefCell::new(Vec::new()));

    let tasks: Vec<Task<()>> = [30_u64, 5, 15]
        .into_iter()
        .map(|ms| {
            let order = Rc::clone(&order);
            Task::eager(async move {
                sleep(Duration::from_millis(ms)).await?;
                order.borrow_mut().push(ms);
                Ok(())
            })
        })
        .collect();
    ev.run_until_idle().unwrap();
    assert!(tasks.iter().all(Task::done));
    assert_eq!(*order.borrow(), vec![5, 15, 30]);
    test_complete!("kernel_timers_complete_in_deadline_order");
}

#[test]
fn nop_yield_round_trips_through_ring() {
    init_test_logging();
    let Some(ev) = kernel_loop() else { return };
    let _enter = ev.enter();

    let task = Task::new(async {
        for _ in 0..4 {
            yield_now().await?;
        }
        Ok(4)
    });
    assert_eq!(*ev.block_on(&task).unwrap(), 4);
    assert_eq!(ev.stats().submissions, 4);
    assert_eq!(ev.pending_operations(), 0);
}

#[test]
fn dropped_kernel_sleep_is_discarded() {
    init_test_logging();
    let Some(ev) = kernel_loop() else { return };
    let _enter = ev.enter();

    let task = Task::eager(async {
        sleep(Duration::from_millis(5)).await?;
        Ok(())
    });
    drop(task);
    ev.run_until_idle().unwrap();
    assert_eq!(ev.stats().orphaned_completions, 1);
    assert_eq!(ev.pending_operations(), 0);
}
