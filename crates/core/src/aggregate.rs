//! Versioned aggregate roots and optimistic concurrency expectations.

/// Aggregate root marker + minimal interface.
///
/// Purchase orders and discrepancies are mutated in place by their stores, so
/// each carries a version that is bumped on every accepted transition. Stores
/// compare that version against an [`ExpectedVersion`] inside their commit.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate or a stock bucket.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (appends that cannot violate an invariant, e.g. INCOME).
    Any,
    /// Require the stream to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_every_version() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn exact_matches_only_its_version() {
        assert!(ExpectedVersion::Exact(4).matches(4));
        assert!(!ExpectedVersion::Exact(3).matches(4));
    }
}
