//! Small resumable thread programs built from a tiny op vocabulary, used
//! both as the CLI's bundled demos and as this crate's test fixtures.
//!
//! A real instrumented program would build `Action`s from inline atomic
//! calls in arbitrary Rust control flow; since that instrumentation shim
//! is out of this system's scope, [`Program`] stands in as a minimal
//! interpreter over a fixed op list, general enough to express every
//! scenario in this module without per-scenario bespoke state machines.

use axiomck_core::action::{Action, ActionType, Location, MemoryOrder, ThreadId};
use axiomck_core::execution::PerformOutcome;
use axiomck_core::scheduler::StepResult;
use axiomck_core::{Execution, ThreadProgram};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Where an op's written value comes from: a literal, a previously loaded
/// local, or a previously loaded local plus a constant (fetch-add-shaped
/// read-then-write, expressed as two ops since this interpreter has no
/// closures to carry "new = f(old)" through a single RMW call).
#[derive(Clone, Copy, Debug)]
pub enum ValueSource {
    Const(u64),
    Local(usize),
    LocalPlus(usize, u64),
}

impl ValueSource {
    fn resolve(self, locals: &HashMap<usize, u64>) -> u64 {
        match self {
            ValueSource::Const(v) => v,
            ValueSource::Local(slot) => *locals.get(&slot).unwrap_or(&0),
            ValueSource::LocalPlus(slot, delta) => locals.get(&slot).unwrap_or(&0) + delta,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Op {
    Store { loc: Location, value: ValueSource, order: MemoryOrder },
    Load { loc: Location, order: MemoryOrder, into: usize },
    /// Retries the same program point until the read observes `expect`.
    SpinUntil { loc: Location, order: MemoryOrder, expect: u64 },
    /// An unconditional atomic RMW (no compare-exchange failure branch is
    /// modeled — see DESIGN.md); writes `value`, and also records the
    /// value actually read into `into` for later use.
    Rmw { loc: Location, order: MemoryOrder, value: ValueSource, into: usize },
    Fence(MemoryOrder),
    Lock(Location),
    Unlock(Location),
    Wait(Location),
    Notify { loc: Location, all: bool },
    ThreadCreate(ThreadId),
    ThreadStart,
    ThreadJoin(ThreadId),
}

/// A thread program: an op list plus a program counter and a small local
/// register file, resumed one op at a time by the scheduler.
pub struct Program {
    ops: Vec<Op>,
    pc: usize,
    locals: HashMap<usize, u64>,
}

impl Program {
    pub fn new(ops: Vec<Op>) -> Self {
        Program { ops, pc: 0, locals: HashMap::new() }
    }
}

impl ThreadProgram for Program {
    fn step(&mut self, exec: &mut Execution, tid: ThreadId) -> StepResult {
        if self.pc >= self.ops.len() {
            return StepResult::Finished;
        }

        match self.ops[self.pc].clone() {
            Op::Store { loc, value, order } => {
                let value = value.resolve(&self.locals);
                exec.perform(tid, Action::new(tid, ActionType::AtomicWrite, order, loc, value, 8));
                self.pc += 1;
            }
            Op::Load { loc, order, into } => {
                let action = Action::new(tid, ActionType::AtomicRead, order, loc, 0, 8);
                if let PerformOutcome::Value(v) = exec.perform(tid, action) {
                    self.locals.insert(into, v);
                }
                self.pc += 1;
            }
            Op::SpinUntil { loc, order, expect } => {
                let action = Action::new(tid, ActionType::AtomicRead, order, loc, 0, 8);
                if let PerformOutcome::Value(v) = exec.perform(tid, action) {
                    if v == expect {
                        self.pc += 1;
                    }
                }
            }
            Op::Rmw { loc, order, value, into } => {
                let new_value = value.resolve(&self.locals);
                let action = Action::new(tid, ActionType::AtomicRmw, order, loc, new_value, 8);
                if let PerformOutcome::Value(old) = exec.perform(tid, action) {
                    self.locals.insert(into, old);
                }
                self.pc += 1;
            }
            Op::Fence(order) => {
                exec.perform(tid, Action::new(tid, ActionType::Fence, order, Location::FENCE, 0, 0));
                self.pc += 1;
            }
            Op::Lock(loc) => {
                let action = Action::new(tid, ActionType::Lock, MemoryOrder::SeqCst, loc, 0, 0);
                match exec.perform(tid, action) {
                    PerformOutcome::Blocked => return StepResult::Blocked,
                    _ => self.pc += 1,
                }
            }
            Op::Unlock(loc) => {
                exec.perform(tid, Action::new(tid, ActionType::Unlock, MemoryOrder::SeqCst, loc, 0, 0));
                self.pc += 1;
            }
            Op::Wait(loc) => {
                let action = Action::new(tid, ActionType::Wait, MemoryOrder::SeqCst, loc, 0, 0);
                match exec.perform(tid, action) {
                    PerformOutcome::Blocked => return StepResult::Blocked,
                    _ => self.pc += 1,
                }
            }
            Op::Notify { loc, all } => {
                exec.perform(tid, Action::new(tid, ActionType::Notify { all }, MemoryOrder::SeqCst, loc, 0, 0));
                self.pc += 1;
            }
            Op::ThreadCreate(child) => {
                let action = Action::new(tid, ActionType::ThreadCreate, MemoryOrder::Release, Location::FENCE, 0, 0)
                    .with_thread_operand(child);
                exec.perform(tid, action);
                self.pc += 1;
            }
            Op::ThreadStart => {
                exec.perform(tid, Action::new(tid, ActionType::ThreadStart, MemoryOrder::Acquire, Location::FENCE, 0, 0));
                self.pc += 1;
            }
            Op::ThreadJoin(target) => {
                let action = Action::new(tid, ActionType::ThreadJoin, MemoryOrder::Acquire, Location::FENCE, 0, 0)
                    .with_thread_operand(target);
                match exec.perform(tid, action) {
                    PerformOutcome::Blocked => return StepResult::Blocked,
                    _ => self.pc += 1,
                }
            }
        }

        if self.pc >= self.ops.len() {
            StepResult::Finished
        } else {
            StepResult::Continue
        }
    }
}

/// The six bundled scenarios.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScenarioName {
    Iriw,
    MessagePassing,
    MutexExclusion,
    CasCoalescing,
    Deadlock,
    Notify,
}

impl ScenarioName {
    pub const ALL: [ScenarioName; 6] = [
        ScenarioName::Iriw,
        ScenarioName::MessagePassing,
        ScenarioName::MutexExclusion,
        ScenarioName::CasCoalescing,
        ScenarioName::Deadlock,
        ScenarioName::Notify,
    ];

    pub fn description(self) -> &'static str {
        match self {
            ScenarioName::Iriw => "independent reads of independent writes across four threads",
            ScenarioName::MessagePassing => "release-store/acquire-load producer-consumer handoff",
            ScenarioName::MutexExclusion => "several threads incrementing a counter under one mutex",
            ScenarioName::CasCoalescing => "concurrent RMWs coalescing into one modification-order chain",
            ScenarioName::Deadlock => "two threads locking two mutexes in opposite order",
            ScenarioName::Notify => "condvar wait/notify handoff between two threads",
        }
    }
}

impl fmt::Display for ScenarioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioName::Iriw => "iriw",
            ScenarioName::MessagePassing => "message-passing",
            ScenarioName::MutexExclusion => "mutex-exclusion",
            ScenarioName::CasCoalescing => "cas-coalescing",
            ScenarioName::Deadlock => "deadlock",
            ScenarioName::Notify => "notify",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownScenario(pub String);

impl fmt::Display for UnknownScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown scenario: {}", self.0)
    }
}

impl std::error::Error for UnknownScenario {}

impl FromStr for ScenarioName {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iriw" => Ok(ScenarioName::Iriw),
            "message-passing" => Ok(ScenarioName::MessagePassing),
            "mutex-exclusion" => Ok(ScenarioName::MutexExclusion),
            "cas-coalescing" => Ok(ScenarioName::CasCoalescing),
            "deadlock" => Ok(ScenarioName::Deadlock),
            "notify" => Ok(ScenarioName::Notify),
            other => Err(UnknownScenario(other.to_string())),
        }
    }
}

fn tid(n: u32) -> ThreadId {
    ThreadId::new(n)
}

/// Build the thread programs for `name`; `programs[i]` is thread `i`.
pub fn build_programs(name: ScenarioName) -> Vec<Box<dyn ThreadProgram>> {
    match name {
        ScenarioName::Iriw => iriw_programs(),
        ScenarioName::MessagePassing => message_passing_programs(),
        ScenarioName::MutexExclusion => mutex_exclusion_programs(),
        ScenarioName::CasCoalescing => cas_coalescing_programs(),
        ScenarioName::Deadlock => deadlock_programs(),
        ScenarioName::Notify => notify_programs(),
    }
}

fn iriw_programs() -> Vec<Box<dyn ThreadProgram>> {
    let x = Location::new(1);
    let y = Location::new(2);
    vec![
        Box::new(Program::new(vec![Op::Store { loc: x, value: ValueSource::Const(1), order: MemoryOrder::SeqCst }])),
        Box::new(Program::new(vec![Op::Store { loc: y, value: ValueSource::Const(1), order: MemoryOrder::SeqCst }])),
        Box::new(Program::new(vec![
            Op::Load { loc: x, order: MemoryOrder::SeqCst, into: 0 },
            Op::Load { loc: y, order: MemoryOrder::SeqCst, into: 1 },
        ])),
        Box::new(Program::new(vec![
            Op::Load { loc: y, order: MemoryOrder::SeqCst, into: 0 },
            Op::Load { loc: x, order: MemoryOrder::SeqCst, into: 1 },
        ])),
    ]
}

fn message_passing_programs() -> Vec<Box<dyn ThreadProgram>> {
    let data = Location::new(1);
    let flag = Location::new(2);
    vec![
        Box::new(Program::new(vec![
            Op::Store { loc: data, value: ValueSource::Const(99), order: MemoryOrder::Relaxed },
            Op::Store { loc: flag, value: ValueSource::Const(1), order: MemoryOrder::Release },
        ])),
        Box::new(Program::new(vec![
            Op::SpinUntil { loc: flag, order: MemoryOrder::Acquire, expect: 1 },
            Op::Load { loc: data, order: MemoryOrder::Relaxed, into: 0 },
        ])),
    ]
}

fn mutex_exclusion_programs() -> Vec<Box<dyn ThreadProgram>> {
    let counter = Location::new(1);
    let lock = Location::new(2);
    let worker = || {
        Program::new(vec![
            Op::Lock(lock),
            Op::Load { loc: counter, order: MemoryOrder::Relaxed, into: 0 },
            Op::Store { loc: counter, value: ValueSource::LocalPlus(0, 1), order: MemoryOrder::Relaxed },
            Op::Unlock(lock),
        ])
    };
    vec![Box::new(worker()), Box::new(worker()), Box::new(worker())]
}

fn cas_coalescing_programs() -> Vec<Box<dyn ThreadProgram>> {
    let counter = Location::new(1);
    let rmw = |new_value: u64| Program::new(vec![Op::Rmw { loc: counter, order: MemoryOrder::AcqRel, value: ValueSource::Const(new_value), into: 0 }]);
    vec![Box::new(rmw(10)), Box::new(rmw(20)), Box::new(rmw(30))]
}

fn deadlock_programs() -> Vec<Box<dyn ThreadProgram>> {
    let mutex_a = Location::new(1);
    let mutex_b = Location::new(2);
    vec![
        Box::new(Program::new(vec![Op::Lock(mutex_a), Op::Lock(mutex_b)])),
        Box::new(Program::new(vec![Op::Lock(mutex_b), Op::Lock(mutex_a)])),
    ]
}

fn notify_programs() -> Vec<Box<dyn ThreadProgram>> {
    let lock = Location::new(1);
    let condvar = Location::new(2);
    let ready = Location::new(3);
    vec![
        // waiter
        Box::new(Program::new(vec![
            Op::Lock(lock),
            Op::Wait(condvar),
            Op::Store { loc: ready, value: ValueSource::Const(1), order: MemoryOrder::Relaxed },
            Op::Unlock(lock),
        ])),
        // notifier
        Box::new(Program::new(vec![Op::Lock(lock), Op::Notify { loc: condvar, all: false }, Op::Unlock(lock)])),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_name_round_trips_through_display_and_parse() {
        for name in ScenarioName::ALL {
            let parsed: ScenarioName = name.to_string().parse().unwrap();
            assert_eq!(parsed, name);
        }
    }

    #[test]
    fn unknown_scenario_name_is_rejected() {
        assert!("not-a-scenario".parse::<ScenarioName>().is_err());
    }

    #[test]
    fn value_source_local_plus_defaults_missing_local_to_zero() {
        let locals = HashMap::new();
        assert_eq!(ValueSource::LocalPlus(0, 5).resolve(&locals), 5);
    }
}
