//! The atomic events the engine reasons about: [`Action`] and the small
//! value types (`ThreadId`, `SeqNum`, `Location`, `MemoryOrder`,
//! `ActionType`) that describe them.

use crate::clock::ClockVector;
use std::fmt;

/// Identifies a modeled thread. Thread `0` is reserved for the implicit
/// "main" thread that exists before any `ThreadCreate` action runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u32);

impl ThreadId {
    pub const MAIN: ThreadId = ThreadId(0);

    pub fn new(id: u32) -> Self {
        ThreadId(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// A position in the global commit order. Sequence numbers start at `1`;
/// `0` means "unsequenced" (an action not yet committed to the trace).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(u32);

impl SeqNum {
    pub const UNSEQUENCED: SeqNum = SeqNum(0);

    pub fn new(n: u32) -> Self {
        SeqNum(n)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_sequenced(self) -> bool {
        self.0 != 0
    }

    pub fn next(self) -> Self {
        SeqNum(self.0 + 1)
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena index into `Execution`'s flat action table. Distinct from `SeqNum`:
/// a pruned duplicate read (see the same-thread-read optimization) is still
/// committed and gets an `ActionId`, but two reads pruned against each other
/// share one logical position in per-thread program order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActionId(u32);

impl ActionId {
    pub fn new(idx: usize) -> Self {
        ActionId(idx as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An opaque memory location. The checker never dereferences these; they
/// are just keys threads agree to use consistently for the same variable.
/// Instrumenting a real user program's address space into `Location`
/// values is the external shim's job, not this engine's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location(u64);

impl Location {
    /// Sentinel location used by fences and thread-lifecycle actions, which
    /// touch no variable but still need a race-detector-compatible key.
    pub const FENCE: Location = Location(u64::MAX);

    pub fn new(key: u64) -> Self {
        Location(key)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// C/C++11 memory order tags, plus the two modeler-only pseudo-orders C11Tester
/// uses for non-atomic ("volatile") memory: [`MemoryOrder::VolatileLoad`]
/// and [`MemoryOrder::VolatileStore`] never establish synchronization and
/// are only ever racy with each other or with an atomic access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryOrder {
    Relaxed,
    Consume,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
    VolatileLoad,
    VolatileStore,
}

impl MemoryOrder {
    pub fn is_acquire(self) -> bool {
        matches!(
            self,
            MemoryOrder::Acquire | MemoryOrder::AcqRel | MemoryOrder::SeqCst | MemoryOrder::Consume
        )
    }

    pub fn is_release(self) -> bool {
        matches!(self, MemoryOrder::Release | MemoryOrder::AcqRel | MemoryOrder::SeqCst)
    }

    pub fn is_seqcst(self) -> bool {
        matches!(self, MemoryOrder::SeqCst)
    }

    pub fn is_volatile(self) -> bool {
        matches!(self, MemoryOrder::VolatileLoad | MemoryOrder::VolatileStore)
    }
}

impl fmt::Display for MemoryOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryOrder::Relaxed => "relaxed",
            MemoryOrder::Consume => "consume",
            MemoryOrder::Acquire => "acquire",
            MemoryOrder::Release => "release",
            MemoryOrder::AcqRel => "acq_rel",
            MemoryOrder::SeqCst => "seq_cst",
            MemoryOrder::VolatileLoad => "volatile_load",
            MemoryOrder::VolatileStore => "volatile_store",
        };
        f.write_str(s)
    }
}

/// The kind of event an [`Action`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionType {
    AtomicRead,
    AtomicWrite,
    AtomicRmw,
    AtomicInit,
    /// A plain (non-atomic) store. Never gets a modification-order node of
    /// its own; see `datarace::ShadowTable`'s non-atomic-store bookkeeping
    /// and `execution::Execution::maybe_synthesize_non_atomic_write`.
    NonAtomicWrite,
    Fence,
    Lock,
    TryLock,
    Unlock,
    Wait,
    Notify { all: bool },
    ThreadCreate,
    ThreadStart,
    ThreadFinish,
    ThreadJoin,
    /// Deallocation marker; carries no value, touches the race detector the
    /// same way a fence does (via `Location::FENCE`).
    Free,
    /// An opaque user annotation, passed through with no engine processing.
    Annotation,
}

impl ActionType {
    pub fn is_read(self) -> bool {
        matches!(self, ActionType::AtomicRead | ActionType::AtomicRmw | ActionType::AtomicInit)
    }

    pub fn is_write(self) -> bool {
        matches!(self, ActionType::AtomicWrite | ActionType::AtomicRmw | ActionType::AtomicInit | ActionType::NonAtomicWrite)
    }

    pub fn is_rmw(self) -> bool {
        matches!(self, ActionType::AtomicRmw)
    }

    pub fn is_fence(self) -> bool {
        matches!(self, ActionType::Fence)
    }

    pub fn is_lock(self) -> bool {
        matches!(self, ActionType::Lock | ActionType::TryLock | ActionType::Unlock)
    }

    pub fn is_thread_lifecycle(self) -> bool {
        matches!(
            self,
            ActionType::ThreadCreate | ActionType::ThreadStart | ActionType::ThreadFinish | ActionType::ThreadJoin
        )
    }
}

/// One committed event in the trace: a thread performing a single atomic
/// action at a single program point. Mutable fields (`cv`, `reads_from`,
/// ...) are filled in as the engine processes the action; the rest are
/// fixed at construction.
#[derive(Clone, Debug)]
pub struct Action {
    pub tid: ThreadId,
    pub ty: ActionType,
    pub order: MemoryOrder,
    pub seq: SeqNum,
    pub location: Location,
    pub value: u64,
    /// For a successful RMW's compare-exchange, the value the read half
    /// compared against (distinct from `value`, the value actually stored).
    pub expected: Option<u64>,
    pub width: u8,
    /// This action's own clock vector, assigned once processing commits it.
    pub cv: Option<ClockVector>,
    /// For a read: the action it read its value from.
    pub reads_from: Option<ActionId>,
    /// For a release-sequence walk: the last release in the chain this
    /// write/RMW extends, if any.
    pub last_fence_release: Option<ActionId>,
    /// The release-acquire clock vector synchronized in via `reads_from`,
    /// kept separate from `cv` so a later fence-acquire can reuse it.
    pub rfcv: Option<ClockVector>,
    /// For `ThreadCreate`/`ThreadJoin`: the thread the action names.
    pub thread_operand: Option<ThreadId>,
}

impl Action {
    pub fn new(tid: ThreadId, ty: ActionType, order: MemoryOrder, location: Location, value: u64, width: u8) -> Self {
        Action {
            tid,
            ty,
            order,
            seq: SeqNum::UNSEQUENCED,
            location,
            value,
            expected: None,
            width,
            cv: None,
            reads_from: None,
            last_fence_release: None,
            rfcv: None,
            thread_operand: None,
        }
    }

    pub fn with_expected(mut self, expected: u64) -> Self {
        self.expected = Some(expected);
        self
    }

    pub fn with_thread_operand(mut self, tid: ThreadId) -> Self {
        self.thread_operand = Some(tid);
        self
    }

    pub fn is_read(&self) -> bool {
        self.ty.is_read()
    }

    pub fn is_write(&self) -> bool {
        self.ty.is_write()
    }

    pub fn is_rmw(&self) -> bool {
        self.ty.is_rmw()
    }

    pub fn is_fence(&self) -> bool {
        self.ty.is_fence()
    }

    pub fn is_lock(&self) -> bool {
        self.ty.is_lock()
    }

    pub fn is_acquire(&self) -> bool {
        self.order.is_acquire() || matches!(self.ty, ActionType::Lock | ActionType::ThreadJoin)
    }

    pub fn is_release(&self) -> bool {
        self.order.is_release() || matches!(self.ty, ActionType::Unlock | ActionType::ThreadCreate)
    }

    pub fn is_seqcst(&self) -> bool {
        self.order.is_seqcst()
    }

    /// Same variable, for race-detection and mo purposes. Fences and
    /// thread-lifecycle actions never alias a real location.
    pub fn same_var(&self, other: &Action) -> bool {
        self.location == other.location && self.location != Location::FENCE
    }

    /// `true` iff this action's clock vector already dominates `(tid, seq)`
    /// — i.e. `other` happens-before `self`.
    pub fn happens_before(&self, other_tid: ThreadId, other_seq: SeqNum) -> bool {
        match &self.cv {
            Some(cv) => cv.synchronized_since(other_tid, other_seq),
            None => false,
        }
    }

    /// Build this action's own clock vector from its thread-program-order
    /// parent (the previous action on the same thread, if any) and any
    /// synchronization it establishes (an acquiring read's `rfcv`).
    pub fn create_cv(&mut self, program_order_parent: Option<&ClockVector>) {
        let mut cv = ClockVector::from_parent(program_order_parent, self.tid, self.seq);
        if let Some(rfcv) = &self.rfcv {
            cv.merge(rfcv);
        }
        self.cv = Some(cv);
    }

    /// Merge `sync` (typically a release write's or unlock's clock vector)
    /// into this acquiring action's synchronized-in clock vector.
    pub fn synchronize_with(&mut self, sync: &ClockVector) {
        match &mut self.rfcv {
            Some(rfcv) => {
                rfcv.merge(sync);
            }
            None => self.rfcv = Some(sync.clone()),
        }
    }
}
