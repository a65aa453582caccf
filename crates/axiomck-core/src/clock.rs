//! Vector clocks used to approximate the happens-before relation.
//!
//! A [`ClockVector`] is a finite function from thread id to sequence number:
//! the downward-closed set of events a given point in the trace has observed.
//! Threads that have not been observed read as clock `0`.

use crate::action::{SeqNum, ThreadId};

/// A dense vector clock, one component per thread seen so far.
///
/// Unseen threads implicitly read as `0`. `merge`/`minmerge` grow the vector
/// as needed so callers never have to pre-size it to the thread count.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClockVector {
    clock: Vec<u32>,
}

impl ClockVector {
    /// An empty clock vector (every thread reads as 0).
    pub fn new() -> Self {
        ClockVector { clock: Vec::new() }
    }

    /// Build a clock vector seeded from `parent` (or empty if `None`), then
    /// clock `tid` forward to `seq` — the construction used for a freshly
    /// committed action's own clock vector.
    pub fn from_parent(parent: Option<&ClockVector>, tid: ThreadId, seq: SeqNum) -> Self {
        let mut cv = match parent {
            Some(p) => p.clone(),
            None => ClockVector::new(),
        };
        cv.set_clock(tid, seq.get());
        cv
    }

    fn ensure_len(&mut self, tid: usize) {
        if self.clock.len() <= tid {
            self.clock.resize(tid + 1, 0);
        }
    }

    /// The clock value recorded for `tid`, or `0` if never observed.
    pub fn get_clock(&self, tid: ThreadId) -> u32 {
        self.clock.get(tid.index()).copied().unwrap_or(0)
    }

    fn set_clock(&mut self, tid: ThreadId, value: u32) {
        self.ensure_len(tid.index());
        let slot = &mut self.clock[tid.index()];
        if value > *slot {
            *slot = value;
        }
    }

    /// Elementwise max-merge of `other` into `self`. Returns `true` iff any
    /// component strictly grew (used to decide whether propagation through
    /// the mo-graph needs to keep recursing).
    pub fn merge(&mut self, other: &ClockVector) -> bool {
        self.ensure_len(other.clock.len().saturating_sub(1));
        let mut grew = false;
        for (i, &v) in other.clock.iter().enumerate() {
            if v > self.clock[i] {
                self.clock[i] = v;
                grew = true;
            }
        }
        grew
    }

    /// Elementwise min-merge of `other` into `self`, used by the GC pass to
    /// compute the frontier clock vector across all live threads.
    pub fn minmerge(&mut self, other: &ClockVector) {
        let len = self.clock.len().max(other.clock.len());
        self.ensure_len(len.saturating_sub(1));
        for i in 0..len {
            let o = other.clock.get(i).copied().unwrap_or(0);
            if i >= self.clock.len() {
                self.clock.push(o);
            } else if o < self.clock[i] {
                self.clock[i] = o;
            }
        }
    }

    /// `true` iff the event of thread `tid` at `seq` happens-before (is
    /// dominated by) this clock vector — i.e. this clock "knows about" it.
    pub fn synchronized_since(&self, tid: ThreadId, seq: SeqNum) -> bool {
        self.get_clock(tid) >= seq.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u32) -> ThreadId {
        ThreadId::new(n)
    }
    fn seq(n: u32) -> SeqNum {
        SeqNum::new(n)
    }

    #[test]
    fn empty_reads_as_zero() {
        let cv = ClockVector::new();
        assert_eq!(cv.get_clock(tid(3)), 0);
    }

    #[test]
    fn from_parent_clocks_self_forward() {
        let mut parent = ClockVector::new();
        parent.merge(&ClockVector::from_parent(None, tid(0), seq(5)));
        let child = ClockVector::from_parent(Some(&parent), tid(1), seq(2));
        assert_eq!(child.get_clock(tid(0)), 5);
        assert_eq!(child.get_clock(tid(1)), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = ClockVector::from_parent(None, tid(0), seq(4));
        let grew_first = a.clone().merge(&a.clone());
        assert!(!grew_first);
    }

    #[test]
    fn merge_twice_equals_merge_once() {
        let base = ClockVector::from_parent(None, tid(0), seq(4));
        let other = ClockVector::from_parent(None, tid(1), seq(7));

        let mut once = base.clone();
        once.merge(&other);

        let mut twice = base.clone();
        twice.merge(&other);
        twice.merge(&other);

        assert_eq!(once, twice);
    }

    #[test]
    fn synchronized_since_matches_seq_number() {
        let cv = ClockVector::from_parent(None, tid(2), seq(10));
        assert!(cv.synchronized_since(tid(2), seq(10)));
        assert!(cv.synchronized_since(tid(2), seq(3)));
        assert!(!cv.synchronized_since(tid(2), seq(11)));
        assert!(!cv.synchronized_since(tid(5), seq(1)));
    }

    #[test]
    fn minmerge_takes_elementwise_minimum() {
        let mut a = ClockVector::new();
        a.merge(&ClockVector::from_parent(None, tid(0), seq(10)));
        a.merge(&ClockVector::from_parent(None, tid(1), seq(10)));

        let mut b = ClockVector::new();
        b.merge(&ClockVector::from_parent(None, tid(0), seq(3)));
        b.merge(&ClockVector::from_parent(None, tid(1), seq(20)));

        a.minmerge(&b);
        assert_eq!(a.get_clock(tid(0)), 3);
        assert_eq!(a.get_clock(tid(1)), 10);
    }
}
