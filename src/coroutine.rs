use core::fmt;

use crate::scheduler::Handle;
use crate::snapshot::Snapshot;
use crate::stack::StackPointer;

/// Identifier of a coroutine within its scheduler.
///
/// This is the index of the coroutine's slot. Once a coroutine has finished,
/// its id may be handed out again to a newly spawned coroutine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoroutineId(usize);

impl CoroutineId {
    /// Creates an id from a raw slot index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the slot index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for CoroutineId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a coroutine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Spawned but never resumed.
    Ready,

    /// Currently executing on the shared stack.
    Running,

    /// Stopped at a `yield_now` call, with its stack saved in a snapshot.
    Suspended,

    /// Finished, or an id that has no coroutine in it.
    Dead,
}

impl Status {
    /// Returns whether a coroutine in this state can still make progress.
    #[inline]
    pub fn is_alive(self) -> bool {
        self != Status::Dead
    }
}

pub(crate) type EntryFn = Box<dyn FnOnce(&Handle)>;

/// Per-coroutine record stored in a scheduler slot.
pub(crate) struct Coroutine {
    // Taken by the trampoline on the first resume.
    pub(crate) entry: Option<EntryFn>,

    pub(crate) status: Status,

    pub(crate) snapshot: Snapshot,

    // Stack pointer the coroutine was suspended at. This is None until the
    // first yield.
    pub(crate) stack_ptr: Option<StackPointer>,
}

impl Coroutine {
    pub(crate) fn new(entry: EntryFn) -> Self {
        Self {
            entry: Some(entry),
            status: Status::Ready,
            snapshot: Snapshot::new(),
            stack_ptr: None,
        }
    }
}
