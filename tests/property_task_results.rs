//! Property-based tests for task results and completion delivery.
//!
//! # Properties
//!
//! 1. **Stable results**: reading a finished task's result any number of
//!    times yields the same value and never re-runs the body
//! 2. **Verbatim failures**: a failed body re-raises the same failure on
//!    every read
//! 3. **Virtual time**: a task sleeping a sequence of durations finishes at
//!    exactly their sum on the lab clock
//! 4. **Frame accounting**: every frame created is released once its task
//!    is dropped, whatever mix of eager and lazy tasks was used

#[macro_use]
mod common;

use common::*;
use covent::{sleep, yield_now, Error, EventLoop, Task};
use proptest::prelude::*;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Sleep(u64),
    Yield,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0_u64..50).prop_map(Step::Sleep),
        Just(Step::Yield),
    ]
}

fn arb_steps(max_len: usize) -> impl Strategy<Value = Vec<Step>> {
    proptest::collection::vec(arb_step(), 0..max_len)
}

fn run_steps(steps: Vec<Step>, value: i64) -> Task<i64> {
    Task::new(async move {
        for step in steps {
            match step {
                Step::Sleep(ms) => sleep(Duration::from_millis(ms)).await?,
                Step::Yield => yield_now().await?,
            }
        }
        Ok(value)
    })
}

proptest! {
    #![proptest_config(test_proptest_config(64))]

    #[test]
    fn repeated_reads_are_stable(value in any::<i64>(), steps in arb_steps(6), reads in 1_usize..8) {
        init_test_logging();
        let (ev, _lab) = lab_loop();
        let _enter = ev.enter();
        let runs = Rc::new(Cell::new(0_u32));

        let task = Task::new({
            let runs = Rc::clone(&runs);
            let inner = run_steps(steps, value);
            async move {
                runs.set(runs.get() + 1);
                inner.await
            }
        });
        for _ in 0..reads {
            prop_assert_eq!(*ev.block_on(&task).unwrap(), value);
        }
        prop_assert_eq!(runs.get(), 1);
    }

    #[test]
    fn failures_reraise_verbatim(message in "[a-z]{1,16}", steps in arb_steps(4), reads in 1_usize..6) {
        init_test_logging();
        let (ev, _lab) = lab_loop();
        let _enter = ev.enter();

        let failing = message.clone();
        let task: Task<()> = Task::new(async move {
            run_steps(steps, 0).await?;
            Err(Error::from_source(std::io::Error::new(std::io::ErrorKind::Other, failing)))
        });
        let first = ev.block_on(&task).unwrap_err();
        prop_assert_eq!(first.message(), Some(message.as_str()));
        for _ in 0..reads {
            let again = task.result().unwrap_err();
            prop_assert!(first.same_source(&again));
            prop_assert_eq!(again.kind(), first.kind());
        }
    }

    #[test]
    fn sleeping_lands_on_exact_virtual_deadline(durations in proptest::collection::vec(0_u64..100, 0..8)) {
        init_test_logging();
        let (ev, lab) = lab_loop();
        let _enter = ev.enter();

        let total: u64 = durations.iter().sum();
        let count = durations.len() as u64;
        let steps = durations.into_iter().map(Step::Sleep).collect();
        let task = run_steps(steps, 1);
        prop_assert_eq!(*ev.block_on(&task).unwrap(), 1);
        prop_assert_eq!(lab.now(), Duration::from_millis(total));
        prop_assert_eq!(lab.submitted(), count);
        prop_assert_eq!(ev.pending_operations(), 0);
    }

    #[test]
    fn every_frame_is_released(eager in proptest::collection::vec(any::<bool>(), 1..10), drive in any::<bool>()) {
        init_test_logging();
        let (ev, _lab) = lab_loop();
        let _enter = ev.enter();

        let tasks: Vec<Task<usize>> = eager
            .iter()
            .enumerate()
            .map(|(i, &is_eager)| {
                let body = async move {
                    yield_now().await?;
                    Ok(i)
                };
                if is_eager { Task::eager(body) } else { Task::new(body) }
            })
            .collect();
        prop_assert_eq!(ev.live_frames(), tasks.len());

        if drive {
            for (i, task) in tasks.iter().enumerate() {
                prop_assert_eq!(*ev.block_on(task).unwrap(), i);
            }
        }
        drop(tasks);
        prop_assert_eq!(ev.live_frames(), 0);
        ev.run_until_idle().unwrap();
        prop_assert_eq!(ev.pending_operations(), 0);
        prop_assert!(EventLoop::try_active().is_some());
    }
}
