//! Shadow-memory race detector.
//!
//! Grounded on C11Tester's `datarace.h`/`datarace.cc`: each location gets a
//! *shadow* word recording who touched it last. C11Tester packs that word
//! into a 64-bit integer — 6 bits thread id, 25 bits clock, a write/atomic
//! flag — with a fallback "expanded" record (a full reader list) when a
//! location has been read by more threads than the compact encoding can
//! track, and addresses the table with a two-level radix split over the
//! low/high bits of a real virtual address.
//!
//! This checker has no real address space to radix-index (a `Location` is
//! an opaque key; the instrumentation shim that would map it to actual
//! memory is out of scope, per spec.md), so the table here is a
//! `HashMap<Location, ShadowCell>` — but the *cell* itself keeps
//! C11Tester's compact/expanded duality and bit-packing verbatim, since
//! that encoding (not the radix indexing) is what spec.md's race-detection
//! behavior actually depends on.

use crate::action::{ActionId, Location, ThreadId};
use std::collections::HashMap;

const CLOCK_BITS: u32 = 25;
const CLOCK_MASK: u64 = (1 << CLOCK_BITS) - 1;
const THREAD_BITS: u32 = 6;
const THREAD_MASK: u64 = (1 << THREAD_BITS) - 1;
const ATOMIC_FLAG: u64 = 1 << (THREAD_BITS + CLOCK_BITS);

/// One thread's last access to a location. The `bits` word packs
/// thread/clock/atomic the way C11Tester's `modelclock_t`/`thread_id_t`
/// pair is packed into a `uint64_t` for cheap comparison; `action` is
/// carried alongside it because C11Tester's own `RaceRecord` keeps the
/// actual `ModelAction*` too (`getStoreOp`/`getReadOp`) for bug reporting —
/// the packed word alone can't answer "which action was this exactly".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CompactRecord {
    bits: u64,
    action: ActionId,
}

impl CompactRecord {
    fn encode(tid: ThreadId, clock: u32, atomic: bool, action: ActionId) -> Self {
        let mut bits = (tid.get() as u64 & THREAD_MASK) | ((clock as u64 & CLOCK_MASK) << THREAD_BITS);
        if atomic {
            bits |= ATOMIC_FLAG;
        }
        CompactRecord { bits, action }
    }

    fn thread(self) -> ThreadId {
        ThreadId::new((self.bits & THREAD_MASK) as u32)
    }

    fn clock(self) -> u32 {
        ((self.bits >> THREAD_BITS) & CLOCK_MASK) as u32
    }

    fn is_atomic(self) -> bool {
        self.bits & ATOMIC_FLAG != 0
    }
}

/// A non-atomic ("volatile") access recorded against a location beyond
/// what the compact single-writer/single-reader-set encoding can track.
/// C11Tester calls this the "expanded" `RaceRecord`; it grows its reader
/// list on demand instead of overflowing the compact word.
#[derive(Clone, Debug, Default)]
struct ExpandedRecord {
    readers: Vec<CompactRecord>,
}

#[derive(Clone, Debug)]
enum ShadowCell {
    Compact {
        last_write: Option<CompactRecord>,
        last_read: Option<CompactRecord>,
    },
    Expanded {
        last_write: Option<CompactRecord>,
        reads: ExpandedRecord,
    },
}

impl Default for ShadowCell {
    fn default() -> Self {
        ShadowCell::Compact { last_write: None, last_read: None }
    }
}

/// One confirmed data race: two non-synchronized accesses to the same
/// location where at least one is a write and neither happens-before the
/// other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaceReport {
    pub location: Location,
    pub first: ActionId,
    pub second: ActionId,
}

/// A plain (non-atomic) store recorded against a location, kept separate
/// from the atomic mo/rf machinery entirely — spec.md §4.2.1 step 1: the
/// first modeled atomic read of a location with a prior non-atomic store
/// and no atomic writes yet synthesizes a back-dated `NonAtomicWrite`
/// action as that read's candidate. `synthesized` latches once that
/// happens so a location only ever gets one synthesized write no matter
/// how many later atomic reads land on it.
#[derive(Clone, Copy, Debug)]
struct NonAtomicStore {
    action: ActionId,
    tid: ThreadId,
    clock: u32,
    synthesized: bool,
}

/// Per-execution shadow memory, one cell per location ever touched.
#[derive(Debug, Default)]
pub struct ShadowTable {
    cells: HashMap<Location, ShadowCell>,
    non_atomic_stores: HashMap<Location, NonAtomicStore>,
}

impl ShadowTable {
    pub fn new() -> Self {
        ShadowTable::default()
    }

    /// Record a non-atomic store to `location`, grounded on
    /// `original_source/datarace.h`'s `record_write` call for a plain
    /// store. Overwrites any earlier recorded non-atomic store and resets
    /// the synthesized latch, since a fresh plain store is a new candidate
    /// for the next atomic read to pick up.
    pub fn record_non_atomic_store(&mut self, location: Location, action: ActionId, tid: ThreadId, clock: u32) {
        self.non_atomic_stores.insert(location, NonAtomicStore { action, tid, clock, synthesized: false });
    }

    /// `true` iff `location` has a recorded non-atomic store that has not
    /// yet been synthesized into the atomic trace as a write candidate.
    pub fn has_non_atomic_store(&self, location: Location) -> bool {
        self.non_atomic_stores.get(&location).map(|s| !s.synthesized).unwrap_or(false)
    }

    /// The `(thread, clock)` of the recorded non-atomic store, if any —
    /// `original_source/datarace.h`'s `get_store_thread_and_clock`.
    pub fn get_store_thread_and_clock(&self, location: Location) -> Option<(ThreadId, u32)> {
        self.non_atomic_stores.get(&location).map(|s| (s.tid, s.clock))
    }

    /// The `ActionId` to synthesize as a write candidate, if the store
    /// hasn't been synthesized yet.
    pub fn non_atomic_store_action(&self, location: Location) -> Option<ActionId> {
        self.non_atomic_stores.get(&location).filter(|s| !s.synthesized).map(|s| s.action)
    }

    /// Latch `location`'s recorded non-atomic store as synthesized, so it
    /// is never offered as a fresh candidate again —
    /// `original_source/datarace.h`'s `set_atomic_store_flag`.
    pub fn set_atomic_store_flag(&mut self, location: Location) {
        if let Some(store) = self.non_atomic_stores.get_mut(&location) {
            store.synthesized = true;
        }
    }

    /// Check an access against the current shadow state and then record
    /// it, the combined lookup-then-update C11Tester splits across
    /// `fullRaceCheckWrite`/`raceCheckWrite` and their read counterparts.
    ///
    /// `happens_before` is supplied by the caller (`execution`, which owns
    /// the clock vectors) as a closure so this module stays ignorant of
    /// `ClockVector`/`Action` plumbing beyond thread ids and raw clocks.
    pub fn check_and_record(
        &mut self,
        location: Location,
        action: ActionId,
        tid: ThreadId,
        clock: u32,
        is_write: bool,
        is_atomic: bool,
        happens_before: impl Fn(ThreadId, u32) -> bool,
    ) -> Option<RaceReport> {
        let cell = self.cells.entry(location).or_default();
        let new_record = CompactRecord::encode(tid, clock, is_atomic, action);

        let race_with = Self::find_race(cell, tid, is_write, is_atomic, &happens_before);

        match cell {
            ShadowCell::Compact { last_write, last_read } => {
                if is_write {
                    *last_write = Some(new_record);
                    if !is_atomic {
                        // A non-atomic write invalidates stale reader history
                        // (mirrors C11Tester clearing the read record on a
                        // fresh non-atomic write).
                        *last_read = None;
                    }
                } else {
                    match last_read {
                        Some(existing) if existing.thread() != tid => {
                            *cell = ShadowCell::Expanded {
                                last_write: *last_write,
                                reads: ExpandedRecord { readers: vec![*existing, new_record] },
                            };
                        }
                        _ => *last_read = Some(new_record),
                    }
                }
            }
            ShadowCell::Expanded { last_write, reads } => {
                if is_write {
                    *last_write = Some(new_record);
                    reads.readers.clear();
                } else if !reads.readers.iter().any(|r| r.thread() == tid) {
                    reads.readers.push(new_record);
                } else if let Some(slot) = reads.readers.iter_mut().find(|r| r.thread() == tid) {
                    *slot = new_record;
                }
            }
        }

        race_with.map(|offender| RaceReport { location, first: offender, second: action })
    }

    fn find_race(
        cell: &ShadowCell,
        tid: ThreadId,
        is_write: bool,
        is_atomic: bool,
        happens_before: &impl Fn(ThreadId, u32) -> bool,
    ) -> Option<ActionId> {
        let conflicts = |rec: &CompactRecord| -> bool {
            rec.thread() != tid && !(rec.is_atomic() && is_atomic) && !happens_before(rec.thread(), rec.clock())
        };

        match cell {
            ShadowCell::Compact { last_write, last_read } => {
                if let Some(w) = last_write {
                    if conflicts(w) {
                        return Some(w.action);
                    }
                }
                if is_write {
                    if let Some(r) = last_read {
                        if conflicts(r) {
                            return Some(r.action);
                        }
                    }
                }
                None
            }
            ShadowCell::Expanded { last_write, reads } => {
                if let Some(w) = last_write {
                    if conflicts(w) {
                        return Some(w.action);
                    }
                }
                if is_write {
                    for r in &reads.readers {
                        if conflicts(r) {
                            return Some(r.action);
                        }
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_unsynchronized(_tid: ThreadId, _clock: u32) -> bool {
        false
    }

    #[test]
    fn compact_record_roundtrips_fields() {
        let rec = CompactRecord::encode(ThreadId::new(5), 12345, true, ActionId::new(0));
        assert_eq!(rec.thread(), ThreadId::new(5));
        assert_eq!(rec.clock(), 12345);
        assert!(rec.is_atomic());
    }

    #[test]
    fn two_racing_writes_on_different_threads_are_flagged() {
        let mut table = ShadowTable::new();
        let loc = Location::new(1);
        let first = table.check_and_record(loc, ActionId::new(0), ThreadId::new(0), 1, true, false, always_unsynchronized);
        assert!(first.is_none());
        let second = table.check_and_record(loc, ActionId::new(1), ThreadId::new(1), 1, true, false, always_unsynchronized);
        assert!(second.is_some());
    }

    #[test]
    fn synchronized_write_is_not_a_race() {
        let mut table = ShadowTable::new();
        let loc = Location::new(1);
        table.check_and_record(loc, ActionId::new(0), ThreadId::new(0), 1, true, false, always_unsynchronized);
        let second = table.check_and_record(loc, ActionId::new(1), ThreadId::new(1), 1, true, false, |_, _| true);
        assert!(second.is_none());
    }

    #[test]
    fn same_thread_accesses_never_race() {
        let mut table = ShadowTable::new();
        let loc = Location::new(1);
        table.check_and_record(loc, ActionId::new(0), ThreadId::new(0), 1, true, false, always_unsynchronized);
        let second = table.check_and_record(loc, ActionId::new(1), ThreadId::new(0), 2, true, false, always_unsynchronized);
        assert!(second.is_none());
    }

    #[test]
    fn atomic_accesses_to_each_other_never_race() {
        let mut table = ShadowTable::new();
        let loc = Location::new(1);
        table.check_and_record(loc, ActionId::new(0), ThreadId::new(0), 1, true, true, always_unsynchronized);
        let second = table.check_and_record(loc, ActionId::new(1), ThreadId::new(1), 1, true, true, always_unsynchronized);
        assert!(second.is_none());
    }

    #[test]
    fn third_reader_forces_expansion_and_still_detects_races() {
        let mut table = ShadowTable::new();
        let loc = Location::new(1);
        table.check_and_record(loc, ActionId::new(0), ThreadId::new(0), 1, false, false, always_unsynchronized);
        table.check_and_record(loc, ActionId::new(1), ThreadId::new(1), 1, false, false, always_unsynchronized);
        table.check_and_record(loc, ActionId::new(2), ThreadId::new(2), 1, false, false, always_unsynchronized);
        let race = table.check_and_record(loc, ActionId::new(3), ThreadId::new(3), 1, true, false, always_unsynchronized);
        assert!(race.is_some());
    }

    #[test]
    fn non_atomic_store_is_offered_once_then_latched() {
        let mut table = ShadowTable::new();
        let loc = Location::new(1);
        table.record_non_atomic_store(loc, ActionId::new(0), ThreadId::new(0), 3);

        assert!(table.has_non_atomic_store(loc));
        assert_eq!(table.get_store_thread_and_clock(loc), Some((ThreadId::new(0), 3)));
        assert_eq!(table.non_atomic_store_action(loc), Some(ActionId::new(0)));

        table.set_atomic_store_flag(loc);
        assert!(!table.has_non_atomic_store(loc));
        assert_eq!(table.non_atomic_store_action(loc), None);
    }
}
