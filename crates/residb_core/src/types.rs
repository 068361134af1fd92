//! Core type definitions for ResiDB.

use std::collections::HashSet;
use std::fmt;

/// Identity of a record within its record type.
///
/// Identities are issued per type starting at 1, increase monotonically
/// and are never reused. `0` marks a record that has not been inserted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RecordId(pub u64);

impl RecordId {
    /// The identity of a record that was never inserted.
    pub const UNASSIGNED: Self = Self(0);

    /// Creates a record identity.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identity value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true once the record has been inserted.
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A set of record identities, as returned by index lookups.
pub type IdSet = HashSet<RecordId>;
