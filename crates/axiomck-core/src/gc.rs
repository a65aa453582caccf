//! Online trace garbage collection.
//!
//! A stateless checker that never discarded old actions would grow the
//! trace (and the mo-graph, and the shadow table) without bound across a
//! long execution. spec.md §4.7 calls for reclaiming any action no future
//! read could legally target: once every live thread's clock vector
//! already dominates an action's `(tid, seq)`, nothing left to run can
//! ever read from it or race with it, so it's safe to drop.
//!
//! The frontier is the elementwise minimum of every live thread's current
//! clock vector (`ClockVector::minmerge`) — anything at or below that
//! frontier is dead weight.

use crate::action::{ActionId, SeqNum, ThreadId};
use crate::actionlist::IndexedActionList;
use crate::clock::ClockVector;
use crate::mograph::MoGraph;
use std::collections::HashMap;

/// Computes the reclaimable frontier and performs the actual removal from
/// the indexed action list and per-location mo-graphs it's handed.
pub struct GarbageCollector {
    /// How many committed actions accumulate between sweeps; running a
    /// sweep after every single action would make the minmerge cost
    /// dominate, so batching amortizes it (mirrors how C11Tester only
    /// checks for a GC opportunity periodically, not on every action).
    pub sweep_interval: u32,
    actions_since_sweep: u32,
}

impl GarbageCollector {
    pub fn new(sweep_interval: u32) -> Self {
        GarbageCollector { sweep_interval: sweep_interval.max(1), actions_since_sweep: 0 }
    }

    /// Call once per committed action; returns `true` when a sweep is due.
    pub fn note_action_committed(&mut self) -> bool {
        self.actions_since_sweep += 1;
        if self.actions_since_sweep >= self.sweep_interval {
            self.actions_since_sweep = 0;
            true
        } else {
            false
        }
    }

    /// Compute the frontier clock vector across every still-live thread.
    /// A thread with no recorded clock vector yet contributes nothing (an
    /// empty clock dominates nothing, so it can't widen the frontier) —
    /// callers should not invoke this before at least one action has
    /// committed per live thread.
    pub fn compute_frontier<'a>(live_thread_cvs: impl Iterator<Item = &'a ClockVector>) -> Option<ClockVector> {
        let mut iter = live_thread_cvs;
        let mut frontier = iter.next()?.clone();
        for cv in iter {
            frontier.minmerge(cv);
        }
        Some(frontier)
    }

    /// Remove every action whose `(tid, seq)` is dominated by `frontier`
    /// from `list`, and its mo-node (if any) from the per-location graph
    /// supplied via `mo_lookup`. Returns how many actions were collected.
    pub fn sweep(
        &self,
        frontier: &ClockVector,
        doomed: &[(ThreadId, SeqNum, ActionId)],
        list: &mut IndexedActionList,
        mo_graphs: &mut HashMap<crate::action::Location, MoGraph>,
        mo_node_for: impl Fn(ActionId) -> Option<(crate::action::Location, crate::mograph::MoNodeId)>,
    ) -> usize {
        let mut collected = 0;
        for &(tid, seq, action) in doomed {
            if frontier.synchronized_since(tid, seq) {
                list.remove(seq);
                if let Some((location, node)) = mo_node_for(action) {
                    if let Some(graph) = mo_graphs.get_mut(&location) {
                        graph.free_node(node);
                    }
                }
                collected += 1;
            }
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ThreadId;

    #[test]
    fn sweep_interval_fires_after_n_actions() {
        let mut gc = GarbageCollector::new(3);
        assert!(!gc.note_action_committed());
        assert!(!gc.note_action_committed());
        assert!(gc.note_action_committed());
        assert!(!gc.note_action_committed());
    }

    #[test]
    fn frontier_is_elementwise_minimum_across_threads() {
        let mut a = ClockVector::from_parent(None, ThreadId::new(0), SeqNum::new(10));
        a.merge(&ClockVector::from_parent(None, ThreadId::new(1), SeqNum::new(10)));

        let mut b = ClockVector::from_parent(None, ThreadId::new(0), SeqNum::new(3));
        b.merge(&ClockVector::from_parent(None, ThreadId::new(1), SeqNum::new(20)));

        let frontier = GarbageCollector::compute_frontier(vec![&a, &b].into_iter()).unwrap();
        assert_eq!(frontier.get_clock(ThreadId::new(0)), 3);
        assert_eq!(frontier.get_clock(ThreadId::new(1)), 10);
    }

    #[test]
    fn no_live_threads_yields_no_frontier() {
        let empty: Vec<&ClockVector> = Vec::new();
        assert!(GarbageCollector::compute_frontier(empty.into_iter()).is_none());
    }

    #[test]
    fn sweep_collects_only_dominated_actions() {
        let gc = GarbageCollector::new(1);
        let frontier = ClockVector::from_parent(None, ThreadId::new(0), SeqNum::new(5));
        let mut list = IndexedActionList::new();
        list.insert(SeqNum::new(2), ActionId::new(0));
        list.insert(SeqNum::new(9), ActionId::new(1));

        let doomed = vec![
            (ThreadId::new(0), SeqNum::new(2), ActionId::new(0)),
            (ThreadId::new(0), SeqNum::new(9), ActionId::new(1)),
        ];
        let mut mo_graphs = HashMap::new();
        let collected = gc.sweep(&frontier, &doomed, &mut list, &mut mo_graphs, |_| None);
        assert_eq!(collected, 1);
        assert_eq!(list.get(SeqNum::new(2)), None);
        assert_eq!(list.get(SeqNum::new(9)), Some(ActionId::new(1)));
    }
}
