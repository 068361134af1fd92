//! Per-type flush state machine.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

/// Where a type stands relative to its last durable snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceState {
    /// The blob matches memory.
    Clean,
    /// Changes are waiting for a flush.
    Dirty,
    /// A flush is writing a snapshot taken before any newer change.
    Flushing,
    /// A flush is in flight and a change arrived after its snapshot.
    FlushingAndDirty,
}

impl PersistenceState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Dirty => 1,
            Self::Flushing => 2,
            Self::FlushingAndDirty => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Dirty,
            2 => Self::Flushing,
            3 => Self::FlushingAndDirty,
            _ => Self::Clean,
        }
    }
}

/// What the caller of [`TypeFlushState::mark_dirty`] must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DirtyOutcome {
    /// The type just became dirty; a flush must be scheduled.
    Schedule,
    /// A flush is already pending or in flight and will pick the change up.
    Pending,
}

/// Flush bookkeeping for one record type.
#[derive(Debug)]
pub(crate) struct TypeFlushState {
    state: AtomicU8,
    /// Set after a failed flush left the type dirty with no timer armed.
    stalled: AtomicBool,
    /// Serializes blob writes for this type.
    pub(crate) write_lock: Mutex<()>,
    last_flush: Mutex<Option<Instant>>,
}

impl Default for TypeFlushState {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(PersistenceState::Clean.to_u8()),
            stalled: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            last_flush: Mutex::new(None),
        }
    }
}

impl TypeFlushState {
    pub(crate) fn get(&self) -> PersistenceState {
        PersistenceState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: PersistenceState, to: PersistenceState) -> bool {
        self.state
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Records a committed change.
    pub(crate) fn mark_dirty(&self) -> DirtyOutcome {
        loop {
            match self.get() {
                PersistenceState::Clean => {
                    if self.transition(PersistenceState::Clean, PersistenceState::Dirty) {
                        return DirtyOutcome::Schedule;
                    }
                }
                PersistenceState::Flushing => {
                    if self.transition(
                        PersistenceState::Flushing,
                        PersistenceState::FlushingAndDirty,
                    ) {
                        return DirtyOutcome::Pending;
                    }
                }
                PersistenceState::Dirty => {
                    if self.stalled.swap(false, Ordering::AcqRel) {
                        return DirtyOutcome::Schedule;
                    }
                    return DirtyOutcome::Pending;
                }
                PersistenceState::FlushingAndDirty => return DirtyOutcome::Pending,
            }
        }
    }

    /// Enters `Flushing`. Must be called with `write_lock` held, right
    /// before the snapshot is taken.
    pub(crate) fn begin_flush(&self) {
        self.stalled.store(false, Ordering::Release);
        self.state
            .store(PersistenceState::Flushing.to_u8(), Ordering::Release);
    }

    /// Leaves `Flushing` after a successful write.
    ///
    /// Returns true if a change arrived during the flush, in which case the
    /// type is `Dirty` again and another flush must be scheduled.
    pub(crate) fn finish_flush(&self, at: Instant) -> bool {
        *self.last_flush.lock() = Some(at);
        if self.transition(PersistenceState::Flushing, PersistenceState::Clean) {
            return false;
        }
        self.state
            .store(PersistenceState::Dirty.to_u8(), Ordering::Release);
        true
    }

    /// Leaves `Flushing` after a failed write. The type stays dirty.
    ///
    /// Returns true if a change arrived during the flush. Otherwise no
    /// retry is due and the next [`mark_dirty`](Self::mark_dirty) asks for
    /// a schedule again.
    pub(crate) fn fail_flush(&self, at: Instant) -> bool {
        *self.last_flush.lock() = Some(at);
        self.stalled.store(true, Ordering::Release);
        let previous = PersistenceState::from_u8(
            self.state
                .swap(PersistenceState::Dirty.to_u8(), Ordering::AcqRel),
        );
        if previous == PersistenceState::FlushingAndDirty {
            self.stalled.store(false, Ordering::Release);
            return true;
        }
        false
    }

    pub(crate) fn last_flush(&self) -> Option<Instant> {
        *self.last_flush.lock()
    }
}
