//! Checker-wide tunables, grounded on C11Tester's `model_params` struct.
//!
//! Kept as a plain `serde`-derived value type (mirroring
//! `openentropy-core::session`'s config structs) rather than a
//! global/singleton, so a driver can run several independently configured
//! `Execution`s in the same process.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Mirrors `-v`/`-vv`/`-vvv`: `0` is silent, higher values enable more
    /// of the `trace!`/`debug!` instrumentation in `execution`/`mograph`.
    pub verbose: u8,
    /// The value an uninitialized atomic read observes, absent a more
    /// specific initializing write. C11Tester defaults this to `0`.
    pub uninitialized_value: u64,
    /// Upper bound on how many distinct executions a driver loop (CLI,
    /// conformance battery) will explore before giving up.
    pub max_executions: u32,
    /// Always behaves as if set: this implementation never forks a child
    /// process to isolate an execution (spec.md's snapshot/fork facility is
    /// an external collaborator, out of scope here), so every execution
    /// already runs in-process like C11Tester's `--disable-forking` mode.
    pub no_fork: bool,
    /// Safety valve, not a modeled concept: caps how many `step` calls a
    /// single execution will take before `Execution::run` gives up and
    /// logs a warning, so a pathological fuzzer seed spinning a busy-wait
    /// thread forever can't hang a batch run.
    pub max_steps: u32,
    /// How many committed actions accumulate before the online GC sweep
    /// runs (see `gc::GarbageCollector`).
    pub gc_sweep_interval: u32,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            verbose: 0,
            uninitialized_value: 0,
            max_executions: 1000,
            no_fork: true,
            max_steps: 100_000,
            gc_sweep_interval: 64,
        }
    }
}

impl CheckerConfig {
    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_max_executions(mut self, max_executions: u32) -> Self {
        self.max_executions = max_executions;
        self
    }

    pub fn with_uninitialized_value(mut self, value: u64) -> Self {
        self.uninitialized_value = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_forces_no_fork() {
        assert!(CheckerConfig::default().no_fork);
    }

    #[test]
    fn builder_methods_are_additive() {
        let cfg = CheckerConfig::default().with_verbose(2).with_max_executions(50);
        assert_eq!(cfg.verbose, 2);
        assert_eq!(cfg.max_executions, 50);
        assert!(cfg.no_fork);
    }
}
