//! Mutex and condition-variable state, grounded on C11Tester's
//! `mutex.cc`/`condition_variable.cc` — both just perform the lock
//! bookkeeping here and then hand control back to the scheduler via
//! `Execution::check_current_action`; the blocking/waking itself is the
//! scheduler's job (`scheduler::Scheduler`), not this module's.

use crate::action::ThreadId;
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutexKind {
    Plain,
    Recursive,
}

/// A single modeled mutex's state. `location` ties it back to the
/// `Location` key the engine uses for race-detection/mo purposes — a
/// mutex's internal state is itself subject to the same happens-before
/// bookkeeping as any other atomic location (spec.md treats lock/unlock as
/// acquire/release actions on that location).
#[derive(Debug)]
pub struct MutexState {
    pub kind: MutexKind,
    owner: Option<ThreadId>,
    recursion_depth: u32,
    waiters: VecDeque<ThreadId>,
}

impl MutexState {
    pub fn new(kind: MutexKind) -> Self {
        MutexState { kind, owner: None, recursion_depth: 0, waiters: VecDeque::new() }
    }

    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    /// Attempt to lock on behalf of `tid`. Returns `true` on success. A
    /// recursive mutex already held by `tid` just bumps the depth counter;
    /// any other mutex already held by someone else fails and the caller
    /// (scheduler) should mark `tid` blocked.
    pub fn try_lock(&mut self, tid: ThreadId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(tid);
                self.recursion_depth = 1;
                true
            }
            Some(owner) if owner == tid && self.kind == MutexKind::Recursive => {
                self.recursion_depth += 1;
                true
            }
            _ => false,
        }
    }

    /// Unlock on behalf of `tid`. Returns the thread (if any) now free to
    /// be woken and retry its lock attempt. Panics if `tid` doesn't hold
    /// the lock — a driver-level misuse, surfaced by the caller as
    /// `EngineError::InvalidSync` before this is ever called.
    pub fn unlock(&mut self, tid: ThreadId) -> Option<ThreadId> {
        assert_eq!(self.owner, Some(tid), "unlock by non-owner");
        self.recursion_depth -= 1;
        if self.recursion_depth == 0 {
            self.owner = None;
            self.waiters.pop_front()
        } else {
            None
        }
    }

    pub fn enqueue_waiter(&mut self, tid: ThreadId) {
        if !self.waiters.contains(&tid) {
            self.waiters.push_back(tid);
        }
    }
}

/// A condition variable's wait set, separate from any particular mutex
/// (spec.md models `wait`/`notify` on a location independent of the lock
/// used to guard it, matching C11Tester's `cond.cc`).
#[derive(Debug, Default)]
pub struct CondvarState {
    waiters: VecDeque<ThreadId>,
}

impl CondvarState {
    pub fn new() -> Self {
        CondvarState::default()
    }

    pub fn wait(&mut self, tid: ThreadId) {
        if !self.waiters.contains(&tid) {
            self.waiters.push_back(tid);
        }
    }

    pub fn notify_one(&mut self) -> Option<ThreadId> {
        self.waiters.pop_front()
    }

    pub fn notify_all(&mut self) -> Vec<ThreadId> {
        self.waiters.drain(..).collect()
    }

    pub fn is_waiting(&self, tid: ThreadId) -> bool {
        self.waiters.contains(&tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mutex_excludes_second_locker() {
        let mut m = MutexState::new(MutexKind::Plain);
        assert!(m.try_lock(ThreadId::new(0)));
        assert!(!m.try_lock(ThreadId::new(1)));
    }

    #[test]
    fn recursive_mutex_allows_reentry() {
        let mut m = MutexState::new(MutexKind::Recursive);
        assert!(m.try_lock(ThreadId::new(0)));
        assert!(m.try_lock(ThreadId::new(0)));
        assert!(m.unlock(ThreadId::new(0)).is_none());
        assert!(m.is_locked());
        assert!(m.unlock(ThreadId::new(0)).is_none());
        assert!(!m.is_locked());
    }

    #[test]
    fn unlock_wakes_a_waiter() {
        let mut m = MutexState::new(MutexKind::Plain);
        m.try_lock(ThreadId::new(0));
        m.enqueue_waiter(ThreadId::new(1));
        let woken = m.unlock(ThreadId::new(0));
        assert_eq!(woken, Some(ThreadId::new(1)));
    }

    #[test]
    fn notify_one_pops_a_single_waiter() {
        let mut cv = CondvarState::new();
        cv.wait(ThreadId::new(0));
        cv.wait(ThreadId::new(1));
        assert_eq!(cv.notify_one(), Some(ThreadId::new(0)));
        assert!(cv.is_waiting(ThreadId::new(1)));
        assert!(!cv.is_waiting(ThreadId::new(0)));
    }

    #[test]
    fn notify_all_drains_every_waiter() {
        let mut cv = CondvarState::new();
        cv.wait(ThreadId::new(0));
        cv.wait(ThreadId::new(1));
        let woken = cv.notify_all();
        assert_eq!(woken, vec![ThreadId::new(0), ThreadId::new(1)]);
        assert!(!cv.is_waiting(ThreadId::new(0)));
    }
}
