//! Error and bug-report types.
//!
//! [`EngineError`] serves double duty: most variants are never propagated
//! through a `Result` (the engine doesn't unwind when it finds a data race
//! or an uninitialized read — it *records* the finding and keeps exploring
//! the rest of the execution, per spec). The exception is
//! [`EngineError::InvalidSync`], which indicates the driver misused the
//! engine's own API (e.g. a read observing an action ID that doesn't
//! exist) rather than a bug in the modeled program, and is returned as a
//! real `Err`.

use crate::action::{ActionId, Location, ThreadId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("thread {reader} read uninitialized memory at {location:?}")]
    UninitializedRead { reader: ThreadId, location: Location },

    #[error("deadlock: no thread in {threads:?} can make progress")]
    Deadlock { threads: Vec<ThreadId> },

    #[error("data race on {location:?} between {first:?} and {second:?}")]
    DataRace { location: Location, first: ActionId, second: ActionId },

    #[error("user assertion failed: {message}")]
    UserAssert { message: String },

    #[error("modification order inconsistency at {location:?}: {detail}")]
    MoInconsistency { location: Location, detail: String },

    #[error("invalid use of the checker API: {detail}")]
    InvalidSync { detail: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A single finding recorded against an execution. Distinct from
/// `EngineError` in that a `BugReport` is always a *finding* (pushed to
/// `Execution::bugs`), never something the caller can pattern-match on to
/// recover; `kind` reuses `EngineError`'s variants purely as a tagged
/// payload so the two report the same vocabulary (spec.md's bug kinds) in
/// different guises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugReport {
    pub kind: EngineError,
    pub execution_seq: u64,
}

impl BugReport {
    pub fn new(kind: EngineError, execution_seq: u64) -> Self {
        BugReport { kind, execution_seq }
    }
}

impl std::fmt::Display for BugReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[execution {}] {}", self.execution_seq, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bug_report_display_includes_execution_number() {
        let report = BugReport::new(
            EngineError::UserAssert { message: "x == 1".into() },
            3,
        );
        let rendered = report.to_string();
        assert!(rendered.contains("execution 3"));
        assert!(rendered.contains("x == 1"));
    }
}
