//! Bundled scenario fixtures and the invariant battery run against them.
//!
//! Grounded on `openentropy-tests`: [`ScenarioResult`] mirrors its
//! `TestResult`'s name/passed/detail shape, but here "passed" means a
//! memory-model property held across many random executions rather than a
//! statistical test passing a p-value threshold. [`run_scenario`] is the
//! single entry point both this crate's own test battery and the CLI's
//! `run` subcommand call into, so the two can never drift.

pub mod scenarios;

use axiomck_core::{CheckerConfig, Execution, ExecutionReport, Fuzzer};
use scenarios::ScenarioName;

/// The outcome of checking one memory-model invariant against a scenario,
/// shaped after `openentropy-tests::TestResult` (name/passed/detail).
#[derive(Clone, Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl ScenarioResult {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        ScenarioResult { name: name.into(), passed: true, detail: detail.into() }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        ScenarioResult { name: name.into(), passed: false, detail: detail.into() }
    }
}

/// Run `name`'s bundled thread programs to completion under `fuzzer`,
/// exploring one execution. Driving `max_executions` of these is the
/// caller's job (the CLI loops this; the battery below loops it too).
pub fn run_scenario(name: ScenarioName, config: CheckerConfig, fuzzer: Box<dyn Fuzzer>) -> ExecutionReport {
    let mut exec = Execution::new(config, fuzzer);
    exec.run(scenarios::build_programs(name))
}

/// Run `executions` independent executions of `name`, each under its own
/// freshly-seeded fuzzer, and fold them into one [`ScenarioResult`] per
/// invariant `check` flags as violated. `check` receives each execution's
/// report and returns `Some(detail)` describing the violation, if any.
fn check_invariant(
    invariant_name: &str,
    scenario: ScenarioName,
    executions: u32,
    check: impl Fn(&ExecutionReport) -> Option<String>,
) -> ScenarioResult {
    for i in 0..executions {
        let config = CheckerConfig::default().with_max_executions(1);
        let fuzzer = Box::new(axiomck_core::RandomFuzzer::with_seed(u64::from(i) * 2 + 1));
        let report = run_scenario(scenario, config, fuzzer);
        if let Some(detail) = check(&report) {
            return ScenarioResult::fail(invariant_name, format!("execution {i}: {detail}"));
        }
    }
    ScenarioResult::pass(invariant_name, format!("held across {executions} executions of {scenario}"))
}

/// spec.md §8's quantified invariant for the race-free producer/consumer
/// scenario: no execution ever reports a data race or an uninitialized
/// read, across many random schedules.
pub fn check_message_passing_is_always_race_free(executions: u32) -> ScenarioResult {
    check_invariant("message-passing is always race-free", ScenarioName::MessagePassing, executions, |report| {
        if !report.races.is_empty() {
            Some(format!("{} race(s) reported", report.races.len()))
        } else if !report.clean {
            Some(format!("unexpected bugs: {:?}", report.bugs))
        } else {
            None
        }
    })
}

/// The mutex-exclusion demo never races on its counter, under any
/// schedule — the lock serializes every access.
pub fn check_mutex_exclusion_never_races(executions: u32) -> ScenarioResult {
    check_invariant("mutex exclusion never races", ScenarioName::MutexExclusion, executions, |report| {
        (!report.races.is_empty()).then(|| format!("{} race(s) reported", report.races.len()))
    })
}

/// The lock-order-inversion demo always deadlocks, under any schedule —
/// neither thread ever unlocks, so by pigeonhole one of them always ends
/// up waiting forever on a mutex the other holds.
pub fn check_deadlock_scenario_always_deadlocks(executions: u32) -> ScenarioResult {
    check_invariant("opposite-order locking always deadlocks", ScenarioName::Deadlock, executions, |report| {
        let saw_deadlock = report.bugs.iter().any(|b| matches!(b.kind, axiomck_core::EngineError::Deadlock { .. }));
        (!saw_deadlock).then(|| "no deadlock reported".to_string())
    })
}

/// The notify demo never deadlocks — the notifier always runs eventually
/// (it never contends for anything but the lock the waiter releases while
/// parked) and wakes the waiter.
pub fn check_notify_scenario_never_deadlocks(executions: u32) -> ScenarioResult {
    check_invariant("wait/notify handoff never deadlocks", ScenarioName::Notify, executions, |report| {
        (!report.clean).then(|| format!("unexpected bugs: {:?}", report.bugs))
    })
}

/// Run every bundled invariant, for use by a driver that wants a single
/// pass/fail battery rather than calling each check individually.
pub fn run_invariant_battery(executions: u32) -> Vec<ScenarioResult> {
    vec![
        check_message_passing_is_always_race_free(executions),
        check_mutex_exclusion_never_races(executions),
        check_deadlock_scenario_always_deadlocks(executions),
        check_notify_scenario_never_deadlocks(executions),
    ]
}
