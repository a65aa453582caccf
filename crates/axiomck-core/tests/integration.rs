//! End-to-end engine tests exercising `Execution::run` with real
//! `ThreadProgram` state machines, rather than driving `perform` by hand
//! (see the unit tests colocated with `execution.rs` for that level).

use axiomck_core::action::{Action, ActionType, Location, MemoryOrder, ThreadId};
use axiomck_core::execution::PerformOutcome;
use axiomck_core::scheduler::StepResult;
use axiomck_core::{CheckerConfig, Execution, RandomFuzzer, ThreadProgram};

/// A tiny two-step program: do one action, then finish. Good enough to
/// express the fixed-size demo scenarios below without a generic
/// expression language.
struct Steps {
    remaining: Vec<Action>,
}

impl Steps {
    fn new(actions: Vec<Action>) -> Self {
        Steps { remaining: actions }
    }
}

impl ThreadProgram for Steps {
    fn step(&mut self, exec: &mut Execution, tid: ThreadId) -> StepResult {
        if self.remaining.is_empty() {
            return StepResult::Finished;
        }
        let action = self.remaining.remove(0);
        exec.perform(tid, action);
        if self.remaining.is_empty() {
            StepResult::Finished
        } else {
            StepResult::Continue
        }
    }
}

/// A program that spins re-reading `flag` until it observes `expect`,
/// then performs `then` and finishes. Models the classic message-passing
/// consumer without a general expression language.
struct SpinThenAct {
    flag: Location,
    expect: u64,
    order: MemoryOrder,
    then: Option<Action>,
    satisfied: bool,
}

impl ThreadProgram for SpinThenAct {
    fn step(&mut self, exec: &mut Execution, tid: ThreadId) -> StepResult {
        if !self.satisfied {
            let read = Action::new(tid, ActionType::AtomicRead, self.order, self.flag, 0, 8);
            if let PerformOutcome::Value(v) = exec.perform(tid, read) {
                if v == self.expect {
                    self.satisfied = true;
                }
            }
            return StepResult::Continue;
        }
        match self.then.take() {
            Some(action) => {
                exec.perform(tid, action);
                StepResult::Finished
            }
            None => StepResult::Finished,
        }
    }
}

fn store(loc: Location, value: u64, order: MemoryOrder) -> Action {
    Action::new(ThreadId::new(0), ActionType::AtomicWrite, order, loc, value, 8)
}

#[test]
fn message_passing_producer_consumer_is_race_free() {
    let data = Location::new(1);
    let flag = Location::new(2);

    let producer = Steps::new(vec![
        store(data, 99, MemoryOrder::Relaxed),
        store(flag, 1, MemoryOrder::Release),
    ]);
    let consumer = SpinThenAct {
        flag,
        expect: 1,
        order: MemoryOrder::Acquire,
        then: Some(Action::new(ThreadId::new(1), ActionType::AtomicRead, MemoryOrder::Relaxed, data, 0, 8)),
        satisfied: false,
    };

    let mut exec = Execution::new(CheckerConfig::default().with_max_executions(1), Box::new(RandomFuzzer::with_seed(3)));
    let report = exec.run(vec![Box::new(producer), Box::new(consumer)]);

    assert!(report.clean, "unexpected bugs: {:?}", report.bugs);
    assert!(report.races.is_empty());
}

#[test]
fn two_mutexes_locked_in_opposite_order_deadlock() {
    let mutex_a = Location::new(10);
    let mutex_b = Location::new(11);

    let lock = |tid: u32, loc: Location| Action::new(ThreadId::new(tid), ActionType::Lock, MemoryOrder::SeqCst, loc, 0, 0);

    // Thread 0: lock A, lock B.
    let t0 = Steps::new(vec![lock(0, mutex_a), lock(0, mutex_b)]);
    // Thread 1: lock B, lock A — classic lock-order inversion.
    let t1 = Steps::new(vec![lock(1, mutex_b), lock(1, mutex_a)]);

    let mut exec = Execution::new(CheckerConfig::default(), Box::new(RandomFuzzer::with_seed(5)));
    let report = exec.run(vec![Box::new(t0), Box::new(t1)]);

    assert!(!report.clean);
    assert!(report.bugs.iter().any(|b| matches!(b.kind, axiomck_core::EngineError::Deadlock { .. })));
}

#[test]
fn relaxed_writes_from_two_threads_are_flagged_as_racy() {
    let loc = Location::new(1);
    let t0 = Steps::new(vec![store(loc, 1, MemoryOrder::Relaxed)]);
    let t1 = Steps::new(vec![Action::new(ThreadId::new(1), ActionType::AtomicWrite, MemoryOrder::Relaxed, loc, 2, 8)]);

    let mut exec = Execution::new(CheckerConfig::default(), Box::new(RandomFuzzer::with_seed(11)));
    let report = exec.run(vec![Box::new(t0), Box::new(t1)]);

    assert!(!report.races.is_empty());
}
