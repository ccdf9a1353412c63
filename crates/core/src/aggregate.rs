//! Aggregate contract shared by the item, usage request and batch order models.

use core::fmt::Debug;
use core::hash::Hash;

/// Identity and revision of an event-sourced model.
pub trait AggregateRoot {
    type Id: Clone + Eq + Hash + Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far. Zero means the stream is empty.
    fn version(&self) -> u64;
}

/// Revision a writer expects the stream to be at when appending.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == actual,
        }
    }
}

/// Pure decision model: `handle` turns a command into events against the
/// current state and `apply` folds one event into the state.
///
/// Neither side performs IO, so replaying a stream always rebuilds the same
/// state. Quantity changes are events like any other; nothing mutates an
/// aggregate except `apply`.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + Debug;
    type Event: Clone + Debug;
    type Error: Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_expectation_rejects_a_moved_stream() {
        assert!(ExpectedVersion::Exact(0).matches(0));
        assert!(!ExpectedVersion::Exact(3).matches(4));
        assert!(ExpectedVersion::Any.matches(42));
    }
}
