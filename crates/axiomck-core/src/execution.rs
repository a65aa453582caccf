//! The execution engine: orchestrates one full run of a set of modeled
//! threads, committing each action to the trace and maintaining every
//! invariant (clock vectors, modification order, shadow memory, mutex
//! state) along the way.
//!
//! Grounded on C11Tester's `ModelExecution` (`execution.h`): one
//! `Execution` per run, owning every other module's per-location/
//! per-thread state, with a single entry point (`check_current_action`
//! there, [`Execution::perform`] here) that every modeled atomic op funnels
//! through.

use crate::action::{Action, ActionId, ActionType, Location, MemoryOrder, SeqNum, ThreadId};
use crate::actionlist::{IndexedActionList, PerThreadWriteList};
use crate::clock::ClockVector;
use crate::config::CheckerConfig;
use crate::datarace::{RaceReport, ShadowTable};
use crate::error::{BugReport, EngineError};
use crate::fuzzer::Fuzzer;
use crate::gc::GarbageCollector;
use crate::mograph::{MoGraph, MoNodeId};
use crate::mutex::{CondvarState, MutexKind, MutexState};
use crate::scheduler::{Scheduler, StepResult, ThreadProgram};
use log::{debug, trace, warn};
use std::collections::{HashMap, HashSet};

/// What a completed or blocked [`Execution::perform`] call tells the
/// calling [`ThreadProgram`].
#[derive(Debug)]
pub enum PerformOutcome {
    /// A read (or the read half of an RMW) observed this value.
    Value(u64),
    /// A write, fence, unlock, or notify completed.
    Done,
    /// Could not proceed right now (lock contention, wait, unfinished
    /// join target). The caller must not advance its program counter —
    /// the same action will be retried the next time the scheduler picks
    /// this thread.
    Blocked,
}

/// Everything collected over one run: any bugs found, every confirmed
/// race, and how many actions were actually committed (useful for
/// regression tests asserting GC kept the trace bounded).
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub bugs: Vec<BugReport>,
    pub races: Vec<RaceReport>,
    pub actions_committed: u64,
    pub clean: bool,
}

struct ThreadBookkeeping {
    last_action_cv: Option<ClockVector>,
    last_action: Option<ActionId>,
    finished_cv: Option<ClockVector>,
}

impl Default for ThreadBookkeeping {
    fn default() -> Self {
        ThreadBookkeeping { last_action_cv: None, last_action: None, finished_cv: None }
    }
}

pub struct Execution {
    config: CheckerConfig,
    fuzzer: Box<dyn Fuzzer>,
    scheduler: Scheduler,

    actions: Vec<Option<Action>>,
    by_seq: IndexedActionList,
    write_list: PerThreadWriteList,
    location_writes: HashMap<Location, Vec<ActionId>>,
    threads: HashMap<ThreadId, ThreadBookkeeping>,

    mo_graphs: HashMap<Location, MoGraph>,
    mo_node_of: HashMap<ActionId, (Location, MoNodeId)>,

    shadow: ShadowTable,
    mutexes: HashMap<Location, MutexState>,
    condvars: HashMap<Location, CondvarState>,
    /// The clock vector synchronized-in by the most recent unlock of each
    /// mutex, handed to the next locker on an acquire (the lock/unlock
    /// analogue of a release-acquire pair).
    last_unlock_cv: HashMap<Location, ClockVector>,
    /// Threads parked on `join(target)`, keyed by the target thread.
    join_waiters: HashMap<ThreadId, Vec<ThreadId>>,

    /// The last seq_cst write committed per location, chained by
    /// `process_write` into a total mo order over seq_cst writes
    /// (spec.md §4.2.2).
    last_seqcst_write: HashMap<Location, ActionId>,
    /// Writes already claimed as the head of an RMW chain — a write may be
    /// the `reads_from` target of at most one RMW (spec.md §4.2.1 step 2b).
    rmw_source_claimed: HashSet<ActionId>,
    /// Threads that have executed at least one release fence; every write
    /// they commit from that point on is release-participating even at a
    /// relaxed memory order (spec.md §4.2.5).
    release_fenced_threads: HashSet<ThreadId>,
    /// Writes committed while their thread was release-fenced.
    release_fenced_writes: HashSet<ActionId>,
    /// Per-thread clock vector accumulated from relaxed reads that read
    /// from a release-participating write but weren't themselves acquiring
    /// — consumed by that thread's next acquire fence (spec.md §4.2, stage
    /// 7 / SPEC_FULL §3.7).
    pending_fence_acquire: HashMap<ThreadId, ClockVector>,

    next_seq: u32,
    execution_seq: u64,
    gc: GarbageCollector,

    bugs: Vec<BugReport>,
    races: Vec<RaceReport>,
}

impl Execution {
    pub fn new(config: CheckerConfig, fuzzer: Box<dyn Fuzzer>) -> Self {
        let gc = GarbageCollector::new(config.gc_sweep_interval);
        Execution {
            config,
            fuzzer,
            scheduler: Scheduler::new(),
            actions: Vec::new(),
            by_seq: IndexedActionList::new(),
            write_list: PerThreadWriteList::new(),
            location_writes: HashMap::new(),
            threads: HashMap::new(),
            mo_graphs: HashMap::new(),
            mo_node_of: HashMap::new(),
            shadow: ShadowTable::new(),
            mutexes: HashMap::new(),
            condvars: HashMap::new(),
            last_unlock_cv: HashMap::new(),
            join_waiters: HashMap::new(),
            last_seqcst_write: HashMap::new(),
            rmw_source_claimed: HashSet::new(),
            release_fenced_threads: HashSet::new(),
            release_fenced_writes: HashSet::new(),
            pending_fence_acquire: HashMap::new(),
            next_seq: 0,
            execution_seq: 1,
            gc,
            bugs: Vec::new(),
            races: Vec::new(),
        }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn action(&self, id: ActionId) -> &Action {
        self.actions[id.index()].as_ref().expect("dangling ActionId")
    }

    fn bookkeeping(&mut self, tid: ThreadId) -> &mut ThreadBookkeeping {
        self.threads.entry(tid).or_default()
    }

    /// Drive `programs[i]` as thread `i` to completion (or deadlock).
    pub fn run(&mut self, mut programs: Vec<Box<dyn ThreadProgram>>) -> ExecutionReport {
        for i in 0..programs.len() {
            self.scheduler.add_thread(ThreadId::new(i as u32));
        }

        let mut steps = 0u32;
        loop {
            if steps >= self.config.max_steps {
                warn!("execution {} hit the step safety valve ({} steps); aborting run", self.execution_seq, steps);
                break;
            }
            let Some(tid) = self.scheduler.select_next_thread(self.fuzzer.as_mut()) else {
                break;
            };
            let program = &mut programs[tid.index()];
            match program.step(self, tid) {
                StepResult::Continue => self.scheduler.requeue(tid),
                StepResult::Finished => {
                    self.finish_thread(tid);
                }
                StepResult::Blocked => self.scheduler.block(tid),
            }
            steps += 1;
        }

        let all_finished = (0..programs.len()).all(|i| self.scheduler.is_finished(ThreadId::new(i as u32)));
        if !all_finished && steps < self.config.max_steps {
            let stalled = self.scheduler.stalled_threads();
            self.record_bug(EngineError::Deadlock { threads: stalled });
        }

        ExecutionReport {
            clean: self.bugs.is_empty(),
            bugs: self.bugs.clone(),
            races: self.races.clone(),
            actions_committed: self.by_seq.len() as u64,
        }
    }

    fn finish_thread(&mut self, tid: ThreadId) {
        let cv = self.bookkeeping(tid).last_action_cv.clone();
        self.bookkeeping(tid).finished_cv = cv;
        self.scheduler.mark_finished(tid);
        if let Some(waiters) = self.join_waiters.remove(&tid) {
            for waiter in waiters {
                self.scheduler.wake(waiter);
            }
        }
    }

    fn record_bug(&mut self, kind: EngineError) {
        warn!("execution {}: {}", self.execution_seq, kind);
        self.bugs.push(BugReport::new(kind, self.execution_seq));
    }

    fn alloc_action_id(&mut self) -> ActionId {
        self.actions.push(None);
        ActionId::new(self.actions.len() - 1)
    }

    fn parent_cv(&self, tid: ThreadId) -> Option<ClockVector> {
        self.threads.get(&tid).and_then(|b| b.last_action_cv.clone())
    }

    /// The single entry point every modeled atomic op funnels through —
    /// the `switch_thread` hand-off of spec.md §4.6, collapsed into a
    /// direct call since there is no real second call stack to switch to
    /// (see `scheduler`'s module doc).
    pub fn perform(&mut self, tid: ThreadId, mut action: Action) -> PerformOutcome {
        action.tid = tid;

        match action.ty {
            ActionType::Lock | ActionType::TryLock => {
                if let Some(outcome) = self.try_process_lock(tid, &mut action) {
                    return outcome;
                }
            }
            ActionType::Wait => {
                if let Some(outcome) = self.try_process_wait(tid, &mut action) {
                    return outcome;
                }
            }
            ActionType::ThreadJoin => {
                if let Some(outcome) = self.try_process_join(tid, &mut action) {
                    return outcome;
                }
            }
            _ => {}
        }

        let seq = SeqNum::new({
            self.next_seq += 1;
            self.next_seq
        });
        action.seq = seq;
        let id = self.alloc_action_id();

        let value = match action.ty {
            ActionType::AtomicRead | ActionType::AtomicInit => self.process_read(&mut action),
            ActionType::AtomicRmw => {
                let read_value = self.process_read(&mut action);
                self.process_write(id, tid, &action);
                read_value
            }
            ActionType::AtomicWrite => {
                self.process_write(id, tid, &action);
                action.value
            }
            ActionType::NonAtomicWrite => {
                self.process_non_atomic_write(id, tid, &action);
                action.value
            }
            ActionType::Fence => {
                self.process_fence(tid, &mut action);
                0
            }
            ActionType::Free | ActionType::Annotation => 0,
            ActionType::Unlock => {
                self.process_unlock(tid, &action);
                0
            }
            ActionType::Notify { all } => {
                self.process_notify(&action, all);
                0
            }
            ActionType::ThreadCreate => {
                self.process_thread_create(tid, &mut action);
                0
            }
            ActionType::ThreadStart => {
                self.process_thread_start(tid, &mut action);
                0
            }
            ActionType::ThreadFinish => 0,
            // Reaching here means the early `try_process_*` call above
            // already decided this thread may proceed (lock acquired,
            // spurious re-poll, or join target already finished); there is
            // no further bookkeeping left to do but commit the action.
            ActionType::Lock | ActionType::TryLock => action.value,
            ActionType::Wait | ActionType::ThreadJoin => 0,
        };

        self.check_race(id, tid, &action);
        self.commit(id, tid, action);

        if self.gc.note_action_committed() {
            self.run_gc_sweep();
        }

        trace!("execution {} committed action {:?} -> {}", self.execution_seq, id, value);

        match self.actions[id.index()].as_ref().unwrap().ty {
            ActionType::AtomicRead | ActionType::AtomicRmw | ActionType::AtomicInit => PerformOutcome::Value(value),
            _ => PerformOutcome::Done,
        }
    }

    fn commit(&mut self, id: ActionId, tid: ThreadId, mut action: Action) {
        let parent = self.parent_cv(tid);
        action.create_cv(parent.as_ref());
        let cv = action.cv.clone().expect("create_cv always sets cv");
        self.by_seq.insert(action.seq, id);
        // A non-atomic write never gets a modification-order node of its
        // own at commit time; it only enters `location_writes`/the mo-graph
        // if and when `maybe_synthesize_non_atomic_write` back-dates it.
        if action.is_write() && action.ty != ActionType::NonAtomicWrite {
            self.write_list.record_write(tid, action.location, id);
            self.location_writes.entry(action.location).or_default().push(id);
        }
        self.actions[id.index()] = Some(action);
        let book = self.bookkeeping(tid);
        book.last_action_cv = Some(cv);
        book.last_action = Some(id);
    }

    // ---- reads -------------------------------------------------------

    fn process_read(&mut self, action: &mut Action) -> u64 {
        self.maybe_synthesize_non_atomic_write(action.location);

        let reader_is_seqcst = action.is_seqcst();
        let reader_is_rmw = action.is_rmw();
        let expected = action.expected;
        let mut candidates =
            self.candidate_writes(action.location, action.tid, reader_is_seqcst, reader_is_rmw, expected);

        if candidates.is_empty() {
            self.record_bug(EngineError::UninitializedRead { reader: action.tid, location: action.location });
            return self.config.uninitialized_value;
        }

        // r_modification_order (spec.md §4.2.1 step 3): picking a candidate
        // imposes mo-edges from every write the reader already happens-after
        // onto the chosen one. If that would contradict an mo edge already
        // established the other way, the candidate is mo-inconsistent and
        // must be discarded in favor of another.
        let chosen = loop {
            let pick = if candidates.len() == 1 { candidates[0] } else { self.fuzzer.choose_write(&candidates) };
            if self.impose_read_mo_edges(action.tid, action.location, pick) {
                break Some(pick);
            }
            candidates.retain(|&c| c != pick);
            if candidates.is_empty() {
                break None;
            }
        };

        let Some(chosen) = chosen else {
            self.record_bug(EngineError::MoInconsistency {
                location: action.location,
                detail: format!("thread {} has no mo-consistent candidate write left to read from", action.tid),
            });
            return self.config.uninitialized_value;
        };

        action.reads_from = Some(chosen);
        let (value, chosen_cv, chosen_is_release) = {
            let chosen_action = self.action(chosen);
            (chosen_action.value, chosen_action.cv.clone(), chosen_action.is_release())
        };
        // get_hb_from_write (spec.md §4.2.5, SPEC_FULL §3.7): a write is
        // release-sequence-participating if it is itself a release write,
        // was made release-participating by a release fence, or is a
        // (possibly relaxed) RMW that already inherited a head's clock —
        // which is exactly the case once `rfcv` below has been cached on
        // it. Checking `rfcv` instead of re-walking `reads_from` each time
        // is what "cache the result on the originating write" means here.
        let chosen_is_rmw = self.action(chosen).is_rmw();
        let chosen_carries_chain = chosen_is_rmw && self.action(chosen).rfcv.is_some();
        let release_participating =
            chosen_is_release || self.release_fenced_writes.contains(&chosen) || chosen_carries_chain;

        if let Some(cv) = &chosen_cv {
            if release_participating && (action.is_acquire() || reader_is_rmw) {
                // An acquiring read synchronizes normally. A (possibly
                // relaxed) RMW reading a release-sequence write extends the
                // sequence one link further: caching the head's clock on
                // the RMW's own `rfcv` is the "walk reads_from backward
                // through non-release RMWs" step, done incrementally
                // instead of re-walking the chain from scratch on every
                // later read.
                action.synchronize_with(cv);
            }
            if release_participating {
                // Even a merely-relaxed, non-RMW read that observes a
                // release-participating write banks that write's clock
                // vector for this thread's next acquire fence to pick up
                // (SPEC_FULL §3.7's rfcv propagation through fences).
                self.pending_fence_acquire.entry(action.tid).or_default().merge(cv);
            }
        }

        value
    }

    /// The first modeled atomic read of a location that only has a recorded
    /// non-atomic store and no atomic writes yet synthesizes that store as a
    /// back-dated write candidate (spec.md §4.2.1 step 1) — the action was
    /// already committed by `process_non_atomic_write`, so this only wires
    /// its existing `ActionId` into the mo-graph and `location_writes` it
    /// was left out of at commit time.
    fn maybe_synthesize_non_atomic_write(&mut self, location: Location) {
        if self.location_writes.get(&location).map(|w| !w.is_empty()).unwrap_or(false) {
            return;
        }
        let Some(id) = self.shadow.non_atomic_store_action(location) else { return };
        let Some((tid, _clock)) = self.shadow.get_store_thread_and_clock(location) else { return };
        let node = self.mo_graphs.entry(location).or_default().add_node(id, tid);
        self.mo_node_of.insert(id, (location, node));
        self.location_writes.entry(location).or_default().push(id);
        self.shadow.set_atomic_store_flag(location);
    }

    /// Writes to `location` not already overwritten-and-observed from
    /// `reader`'s perspective — i.e. every write not mo-before some other
    /// write the reader's own happens-before already dominates — minus the
    /// spec.md §4.2.1 step 2 exclusions: a seq_cst reader can't reach behind
    /// the latest seq_cst write, an RMW can't read a write already claimed
    /// by another RMW, and a failing-CAS candidate must match `expected`.
    fn candidate_writes(
        &self,
        location: Location,
        reader: ThreadId,
        reader_is_seqcst: bool,
        reader_is_rmw: bool,
        expected: Option<u64>,
    ) -> Vec<ActionId> {
        let writes = match self.location_writes.get(&location) {
            Some(w) if !w.is_empty() => w,
            _ => return Vec::new(),
        };
        let reader_cv = self.parent_cv(reader);
        let last_seqcst = self.last_seqcst_write.get(&location).copied();

        writes
            .iter()
            .copied()
            .filter(|&w| {
                !writes.iter().any(|&later| {
                    later != w
                        && self.mo_reachable(w, later)
                        && reader_cv
                            .as_ref()
                            .map(|cv| cv.synchronized_since(self.action(later).tid, self.action(later).seq))
                            .unwrap_or(false)
                })
            })
            .filter(|&w| match (reader_is_seqcst, last_seqcst) {
                (true, Some(s)) if s != w => {
                    let w_action = self.action(w);
                    !self.action(s).happens_before(w_action.tid, w_action.seq)
                }
                _ => true,
            })
            .filter(|&w| !reader_is_rmw || !self.rmw_source_claimed.contains(&w))
            .filter(|&w| expected.map(|e| self.action(w).value == e).unwrap_or(true))
            .collect()
    }

    /// Imposes the mo-edges a committed read's choice of `chosen` requires:
    /// every write the reader's own happens-before already dominates must
    /// precede `chosen` in modification order. Returns `false` without
    /// mutating the graph if that would contradict an edge already
    /// established the other way (`chosen` already mo-before one of them),
    /// letting the caller retry with a different candidate.
    fn impose_read_mo_edges(&mut self, reader: ThreadId, location: Location, chosen: ActionId) -> bool {
        let Some(&(_, chosen_node)) = self.mo_node_of.get(&chosen) else { return true };
        let Some(reader_cv) = self.parent_cv(reader) else { return true };
        let others: Vec<ActionId> = self.location_writes.get(&location).cloned().unwrap_or_default();

        let mut to_link = Vec::new();
        for other in others {
            if other == chosen {
                continue;
            }
            let other_action = self.action(other);
            if !reader_cv.synchronized_since(other_action.tid, other_action.seq) {
                continue;
            }
            let Some(&(_, other_node)) = self.mo_node_of.get(&other) else { continue };
            if self.mo_graphs.get(&location).map(|g| g.is_reachable(chosen_node, other_node)).unwrap_or(false) {
                return false;
            }
            to_link.push(other_node);
        }

        if let Some(graph) = self.mo_graphs.get_mut(&location) {
            for other_node in to_link {
                graph.add_edge(other_node, chosen_node);
            }
        }
        true
    }

    fn mo_reachable(&self, from: ActionId, to: ActionId) -> bool {
        let (Some(&(loc_from, node_from)), Some(&(loc_to, node_to))) =
            (self.mo_node_of.get(&from), self.mo_node_of.get(&to))
        else {
            return false;
        };
        if loc_from != loc_to {
            return false;
        }
        self.mo_graphs.get(&loc_from).map(|g| g.is_reachable(node_from, node_to)).unwrap_or(false)
    }

    // ---- writes --------------------------------------------------------

    fn process_write(&mut self, id: ActionId, tid: ThreadId, action: &Action) {
        let location = action.location;
        let graph = self.mo_graphs.entry(location).or_default();
        let node = graph.add_node(id, tid);
        self.mo_node_of.insert(id, (location, node));

        if action.is_rmw() {
            if let Some(source) = action.reads_from {
                if let Some(&(_, source_node)) = self.mo_node_of.get(&source) {
                    self.mo_graphs.get_mut(&location).unwrap().add_rmw_edge(source_node, node);
                }
                self.rmw_source_claimed.insert(source);
            }
        }

        // Coherence: any write this write's thread already happens-after
        // must precede it in modification order.
        let existing: Vec<ActionId> = self.location_writes.get(&location).cloned().unwrap_or_default();
        for other in existing {
            if other == id {
                continue;
            }
            let parent = self.parent_cv(tid);
            let other_action = self.action(other);
            let hb = parent.as_ref().map(|cv| cv.synchronized_since(other_action.tid, other_action.seq)).unwrap_or(false);
            if hb {
                if let Some(&(_, other_node)) = self.mo_node_of.get(&other) {
                    self.mo_graphs.get_mut(&location).unwrap().add_edge(other_node, node);
                }
            }
        }

        // seq_cst writes additionally chain onto the previous seq_cst write
        // at this location (spec.md §4.2.2), approximating the cross-thread
        // total seq_cst order as a single per-location mo chain.
        if action.is_seqcst() {
            if let Some(&prev) = self.last_seqcst_write.get(&location) {
                if prev != id {
                    if let Some(&(_, prev_node)) = self.mo_node_of.get(&prev) {
                        self.mo_graphs.get_mut(&location).unwrap().add_edge(prev_node, node);
                    }
                }
            }
            self.last_seqcst_write.insert(location, id);
        }

        if self.release_fenced_threads.contains(&tid) {
            self.release_fenced_writes.insert(id);
        }
    }

    fn process_non_atomic_write(&mut self, id: ActionId, tid: ThreadId, action: &Action) {
        self.shadow.record_non_atomic_store(action.location, id, tid, action.seq.get());
    }

    // ---- fences --------------------------------------------------------

    fn process_fence(&mut self, tid: ThreadId, action: &mut Action) {
        // An acquire fence catches this thread up on every release-
        // participating write a prior relaxed read of its own observed but
        // didn't itself synchronize with (spec.md §4.2 stage 7).
        if action.order.is_acquire() {
            if let Some(cv) = self.pending_fence_acquire.remove(&tid) {
                action.synchronize_with(&cv);
            }
        }
        // A release fence makes every subsequent write on this thread
        // release-participating, even at a relaxed memory order (spec.md
        // §4.2.5) — latched for the rest of the run, per the fence's own
        // semantics (there is no "un-release-fencing" a thread).
        if action.order.is_release() {
            self.release_fenced_threads.insert(tid);
        }
    }

    // ---- mutexes --------------------------------------------------------

    fn try_process_lock(&mut self, tid: ThreadId, action: &mut Action) -> Option<PerformOutcome> {
        let location = action.location;
        let try_variant = action.ty == ActionType::TryLock;
        let mutex = self.mutexes.entry(location).or_insert_with(|| MutexState::new(MutexKind::Plain));
        if mutex.try_lock(tid) {
            action.value = 1;
            if let Some(cv) = self.last_unlock_cv.get(&location).cloned() {
                action.synchronize_with(&cv);
            }
            None
        } else if try_variant {
            action.value = 0;
            None
        } else {
            self.mutexes.get_mut(&location).unwrap().enqueue_waiter(tid);
            Some(PerformOutcome::Blocked)
        }
    }

    fn process_unlock(&mut self, tid: ThreadId, action: &Action) {
        let location = action.location;
        let woken = self.mutexes.get_mut(&location).and_then(|m| m.unlock(tid));
        let cv = self.prospective_cv(tid, action);
        self.last_unlock_cv.insert(location, cv);
        if let Some(woken) = woken {
            self.scheduler.wake(woken);
        }
    }

    fn try_process_wait(&mut self, tid: ThreadId, action: &mut Action) -> Option<PerformOutcome> {
        let location = action.location;
        let cv = self.condvars.entry(location).or_default();
        if cv.is_waiting(tid) {
            // Already parked; only reachable again once notified, at
            // which point the caller's ThreadProgram should not re-issue
            // wait for this step (it re-acquires the mutex instead). We
            // still block defensively in case of a spurious re-poll.
            None
        } else {
            cv.wait(tid);
            self.scheduler.block(tid);
            Some(PerformOutcome::Blocked)
        }
    }

    fn process_notify(&mut self, action: &Action, all: bool) {
        let location = action.location;
        let Some(cv) = self.condvars.get_mut(&location) else { return };
        if all {
            for waiter in cv.notify_all() {
                self.scheduler.wake(waiter);
            }
        } else if let Some(waiter) = cv.notify_one() {
            self.scheduler.wake(waiter);
        }
    }

    // ---- thread lifecycle -----------------------------------------------

    fn process_thread_create(&mut self, tid: ThreadId, action: &mut Action) {
        let Some(child) = action.thread_operand else { return };
        self.scheduler.add_thread(child);
        let _ = tid;
    }

    fn process_thread_start(&mut self, tid: ThreadId, action: &mut Action) {
        // A thread's first action synchronizes with the ThreadCreate that
        // spawned it, found as the most recent committed ThreadCreate
        // naming this thread as its operand.
        let creator_cv = self
            .actions
            .iter()
            .flatten()
            .find(|a| a.ty == ActionType::ThreadCreate && a.thread_operand == Some(tid))
            .and_then(|a| a.cv.clone());
        if let Some(cv) = creator_cv {
            action.synchronize_with(&cv);
        }
    }

    fn try_process_join(&mut self, joiner: ThreadId, action: &mut Action) -> Option<PerformOutcome> {
        let Some(target) = action.thread_operand else { return None };
        let finished_cv = self.threads.get(&target).and_then(|b| b.finished_cv.clone());
        match finished_cv {
            Some(cv) => {
                action.synchronize_with(&cv);
                None
            }
            None => {
                self.join_waiters.entry(target).or_default().push(joiner);
                Some(PerformOutcome::Blocked)
            }
        }
    }

    // ---- race detection --------------------------------------------------

    /// The clock vector this action will commit with, computed ahead of
    /// `commit` so race detection can ask "does this access already
    /// happen-after that one" before the action is actually stored.
    fn prospective_cv(&self, tid: ThreadId, action: &Action) -> ClockVector {
        let mut cv = ClockVector::from_parent(self.parent_cv(tid).as_ref(), tid, action.seq);
        if let Some(rfcv) = &action.rfcv {
            cv.merge(rfcv);
        }
        cv
    }

    fn check_race(&mut self, id: ActionId, tid: ThreadId, action: &Action) {
        if action.location == Location::FENCE {
            return;
        }
        let is_atomic = !action.order.is_volatile() && action.ty != ActionType::NonAtomicWrite;
        let clock = action.seq.get();
        let prospective = self.prospective_cv(tid, action);
        let race = self.shadow.check_and_record(
            action.location,
            id,
            tid,
            clock,
            action.is_write(),
            is_atomic,
            move |other_tid, other_clock| prospective.synchronized_since(other_tid, SeqNum::new(other_clock)),
        );
        if let Some(report) = race {
            self.races.push(report.clone());
            self.record_bug(EngineError::DataRace { location: report.location, first: report.first, second: report.second });
        }
    }

    fn run_gc_sweep(&mut self) {
        let live_cvs: Vec<ClockVector> = self
            .threads
            .iter()
            .filter(|(tid, b)| !self.scheduler.is_finished(**tid) && b.last_action_cv.is_some())
            .map(|(_, b)| b.last_action_cv.clone().unwrap())
            .collect();
        let Some(frontier) = GarbageCollector::compute_frontier(live_cvs.iter()) else { return };

        let doomed: Vec<(ThreadId, SeqNum, ActionId)> =
            self.actions.iter().flatten().map(|a| (a.tid, a.seq, self.by_seq.get(a.seq))).filter_map(|(t, s, opt)| opt.map(|id| (t, s, id))).collect();

        let mo_node_of = &self.mo_node_of;
        self.gc.sweep(&frontier, &doomed, &mut self.by_seq, &mut self.mo_graphs, |action_id| mo_node_of.get(&action_id).copied());
        debug!("execution {}: gc sweep over frontier {:?}", self.execution_seq, frontier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzer::RandomFuzzer;

    fn new_exec() -> Execution {
        Execution::new(CheckerConfig::default(), Box::new(RandomFuzzer::with_seed(1)))
    }

    fn store(tid: ThreadId, loc: Location, value: u64, order: MemoryOrder) -> Action {
        Action::new(tid, ActionType::AtomicWrite, order, loc, value, 8)
    }

    fn load(tid: ThreadId, loc: Location, order: MemoryOrder) -> Action {
        Action::new(tid, ActionType::AtomicRead, order, loc, 0, 8)
    }

    #[test]
    fn read_with_no_prior_write_is_uninitialized() {
        let mut exec = new_exec();
        let outcome = exec.perform(ThreadId::new(0), load(ThreadId::new(0), Location::new(1), MemoryOrder::Relaxed));
        assert!(matches!(outcome, PerformOutcome::Value(v) if v == 0));
        assert_eq!(exec.bugs.len(), 1);
        assert!(matches!(exec.bugs[0].kind, EngineError::UninitializedRead { .. }));
    }

    #[test]
    fn relaxed_write_then_read_observes_it() {
        let mut exec = new_exec();
        let loc = Location::new(1);
        exec.perform(ThreadId::new(0), store(ThreadId::new(0), loc, 42, MemoryOrder::Relaxed));
        let outcome = exec.perform(ThreadId::new(0), load(ThreadId::new(0), loc, MemoryOrder::Relaxed));
        assert!(matches!(outcome, PerformOutcome::Value(42)));
    }

    #[test]
    fn release_acquire_pair_synchronizes_clock_vectors() {
        let mut exec = new_exec();
        let flag = Location::new(1);
        let data = Location::new(2);

        exec.perform(ThreadId::new(0), store(ThreadId::new(0), data, 7, MemoryOrder::Relaxed));
        exec.perform(ThreadId::new(0), store(ThreadId::new(0), flag, 1, MemoryOrder::Release));

        let read_flag = exec.perform(ThreadId::new(1), load(ThreadId::new(1), flag, MemoryOrder::Acquire));
        assert!(matches!(read_flag, PerformOutcome::Value(1)));

        let read_data = exec.perform(ThreadId::new(1), load(ThreadId::new(1), data, MemoryOrder::Relaxed));
        assert!(matches!(read_data, PerformOutcome::Value(7)));
        assert!(exec.bugs.is_empty());
    }

    #[test]
    fn mutex_excludes_concurrent_holders_until_unlocked() {
        let mut exec = new_exec();
        let lock_loc = Location::new(9);
        let lock = || Action::new(ThreadId::new(0), ActionType::Lock, MemoryOrder::SeqCst, lock_loc, 0, 0);

        let outcome = exec.perform(ThreadId::new(0), lock());
        assert!(matches!(outcome, PerformOutcome::Done));

        let second_lock = Action::new(ThreadId::new(1), ActionType::Lock, MemoryOrder::SeqCst, lock_loc, 0, 0);
        let blocked = exec.perform(ThreadId::new(1), second_lock.clone());
        assert!(matches!(blocked, PerformOutcome::Blocked));

        let unlock = Action::new(ThreadId::new(0), ActionType::Unlock, MemoryOrder::SeqCst, lock_loc, 0, 0);
        exec.perform(ThreadId::new(0), unlock);

        let retried = exec.perform(ThreadId::new(1), second_lock);
        assert!(matches!(retried, PerformOutcome::Done));
    }

    #[test]
    fn unsynchronized_concurrent_writes_are_a_race() {
        let mut exec = new_exec();
        let loc = Location::new(1);
        exec.perform(ThreadId::new(0), store(ThreadId::new(0), loc, 1, MemoryOrder::Relaxed));
        exec.perform(ThreadId::new(1), store(ThreadId::new(1), loc, 2, MemoryOrder::Relaxed));
        assert!(!exec.races.is_empty());
    }

    #[test]
    fn first_atomic_read_synthesizes_a_back_dated_non_atomic_write() {
        let mut exec = new_exec();
        let loc = Location::new(1);

        let plain_store = Action::new(ThreadId::new(0), ActionType::NonAtomicWrite, MemoryOrder::VolatileStore, loc, 42, 8);
        exec.perform(ThreadId::new(0), plain_store);

        let outcome = exec.perform(ThreadId::new(0), load(ThreadId::new(0), loc, MemoryOrder::Relaxed));
        assert!(matches!(outcome, PerformOutcome::Value(42)));
        assert_eq!(exec.location_writes.get(&loc).map(|w| w.len()), Some(1));
        assert!(exec.bugs.is_empty());

        // A second read does not re-synthesize the same store.
        exec.perform(ThreadId::new(0), load(ThreadId::new(0), loc, MemoryOrder::Relaxed));
        assert_eq!(exec.location_writes.get(&loc).unwrap().len(), 1);
    }

    #[test]
    fn acquire_fence_completes_synchronization_missed_by_a_relaxed_read() {
        let mut exec = new_exec();
        let flag = Location::new(1);
        let data = Location::new(2);

        exec.perform(ThreadId::new(0), store(ThreadId::new(0), data, 7, MemoryOrder::Relaxed));
        exec.perform(ThreadId::new(0), store(ThreadId::new(0), flag, 1, MemoryOrder::Release));

        exec.perform(ThreadId::new(1), load(ThreadId::new(1), flag, MemoryOrder::Relaxed));
        let pre_fence_cv = exec.threads.get(&ThreadId::new(1)).unwrap().last_action_cv.clone().unwrap();
        assert_eq!(pre_fence_cv.get_clock(ThreadId::new(0)), 0);

        let acquire_fence = Action::new(ThreadId::new(1), ActionType::Fence, MemoryOrder::Acquire, Location::FENCE, 0, 0);
        exec.perform(ThreadId::new(1), acquire_fence);

        let post_fence_cv = exec.threads.get(&ThreadId::new(1)).unwrap().last_action_cv.clone().unwrap();
        assert!(post_fence_cv.get_clock(ThreadId::new(0)) >= 2);
    }

    #[test]
    fn release_fence_makes_a_later_relaxed_write_release_participating() {
        let mut exec = new_exec();
        let flag = Location::new(1);
        let data = Location::new(2);

        exec.perform(ThreadId::new(0), store(ThreadId::new(0), data, 7, MemoryOrder::Relaxed));
        let release_fence = Action::new(ThreadId::new(0), ActionType::Fence, MemoryOrder::Release, Location::FENCE, 0, 0);
        exec.perform(ThreadId::new(0), release_fence);
        exec.perform(ThreadId::new(0), store(ThreadId::new(0), flag, 1, MemoryOrder::Relaxed));

        exec.perform(ThreadId::new(1), load(ThreadId::new(1), flag, MemoryOrder::Acquire));
        let cv = exec.threads.get(&ThreadId::new(1)).unwrap().last_action_cv.clone().unwrap();
        assert!(cv.get_clock(ThreadId::new(0)) >= 2);
    }

    #[test]
    fn seqcst_writes_chain_in_modification_order() {
        let mut exec = new_exec();
        let loc = Location::new(1);

        exec.perform(ThreadId::new(0), store(ThreadId::new(0), loc, 1, MemoryOrder::SeqCst));
        exec.perform(ThreadId::new(1), store(ThreadId::new(1), loc, 2, MemoryOrder::SeqCst));

        let writes = exec.location_writes.get(&loc).cloned().unwrap();
        assert_eq!(writes.len(), 2);
        assert!(exec.mo_reachable(writes[0], writes[1]));
    }

    #[test]
    fn rmw_chain_excludes_an_already_claimed_source() {
        let mut exec = new_exec();
        let loc = Location::new(1);

        exec.perform(ThreadId::new(0), store(ThreadId::new(0), loc, 0, MemoryOrder::Relaxed));

        let rmw = |tid: ThreadId, value: u64| Action::new(tid, ActionType::AtomicRmw, MemoryOrder::Relaxed, loc, value, 8);

        let first = exec.perform(ThreadId::new(1), rmw(ThreadId::new(1), 1));
        assert!(matches!(first, PerformOutcome::Value(0)));

        // Thread 2's RMW may not re-read the initial write — thread 1's RMW
        // already claimed it as an mo-chain head — so it must observe 1.
        let second = exec.perform(ThreadId::new(2), rmw(ThreadId::new(2), 2));
        assert!(matches!(second, PerformOutcome::Value(1)));
    }

    #[test]
    fn failing_cas_candidate_filter_keeps_only_the_matching_value() {
        let mut exec = new_exec();
        let loc = Location::new(1);

        exec.perform(ThreadId::new(0), store(ThreadId::new(0), loc, 5, MemoryOrder::Relaxed));
        exec.perform(ThreadId::new(1), store(ThreadId::new(1), loc, 9, MemoryOrder::Relaxed));

        let read = Action::new(ThreadId::new(2), ActionType::AtomicRead, MemoryOrder::Relaxed, loc, 0, 8).with_expected(5);
        let outcome = exec.perform(ThreadId::new(2), read);
        assert!(matches!(outcome, PerformOutcome::Value(5)));
        assert!(exec.bugs.is_empty());
    }

    #[test]
    fn relaxed_rmw_extends_a_release_sequence_to_a_later_acquire_read() {
        // T0 releases x=1; T1's relaxed fetch_add reads it without itself
        // acquiring, then releases "done"; T2 acquires "done" (picking up
        // T1's clock but not yet knowing about T1's rmw specifically) and
        // finally re-reads x acquire. Only the rmw's write is a valid
        // candidate at that point (the shadowing filter has excluded T0's
        // store via T2's synchronization with T1), so getting thread 0's
        // clock into T2 depends entirely on the rmw chain having cached it.
        let mut exec = new_exec();
        let x = Location::new(1);
        let done = Location::new(2);

        exec.perform(ThreadId::new(0), store(ThreadId::new(0), x, 1, MemoryOrder::Release));

        let rmw = Action::new(ThreadId::new(1), ActionType::AtomicRmw, MemoryOrder::Relaxed, x, 2, 8);
        let rmw_outcome = exec.perform(ThreadId::new(1), rmw);
        assert!(matches!(rmw_outcome, PerformOutcome::Value(1)));
        exec.perform(ThreadId::new(1), store(ThreadId::new(1), done, 1, MemoryOrder::Release));

        exec.perform(ThreadId::new(2), load(ThreadId::new(2), done, MemoryOrder::Acquire));
        let outcome = exec.perform(ThreadId::new(2), load(ThreadId::new(2), x, MemoryOrder::Acquire));
        assert!(matches!(outcome, PerformOutcome::Value(2)));

        let cv = exec.threads.get(&ThreadId::new(2)).unwrap().last_action_cv.clone().unwrap();
        assert!(cv.get_clock(ThreadId::new(0)) >= 1);
        assert!(exec.bugs.is_empty());
    }
}
