//! Issue guard.
//!
//! A `StockBucket` is rehydrated from the history of one (item, location) pair.
//! Its version (the last committed sequence) is the optimistic concurrency
//! expectation used when the guarded movement is committed, so the balance
//! read, the sufficiency check and the insert behave as one serialised step.

use rust_decimal::Decimal;

use stockledger_core::{DomainError, DomainResult, ExpectedVersion};

use crate::movement::{AppendMovement, BucketKey, MovementKind, StockMovement};
use crate::resolver::accumulate;

/// How ISSUE movements without a location are treated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum IssuePolicy {
    /// ISSUE without a location is booked unchecked (aggregate-only tracking).
    #[default]
    AllowUnlocated,
    /// ISSUE must name a location so it can be balance-checked.
    RequireLocation,
}

impl IssuePolicy {
    pub fn from_require_location(require: bool) -> Self {
        if require {
            IssuePolicy::RequireLocation
        } else {
            IssuePolicy::AllowUnlocated
        }
    }

    /// Whether `movement` must pass a balance check before it is committed.
    pub fn requires_check(self, movement: &AppendMovement) -> DomainResult<bool> {
        match movement.kind {
            MovementKind::Income | MovementKind::Adjustment => Ok(false),
            MovementKind::Issue => match (movement.location_id, self) {
                (Some(_), _) => Ok(true),
                (None, IssuePolicy::AllowUnlocated) => Ok(false),
                (None, IssuePolicy::RequireLocation) => Err(DomainError::bad_request(
                    "ISSUE movements must specify a location_id",
                )),
            },
        }
    }
}

/// Balance and version of one (item, location) bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockBucket {
    key: BucketKey,
    quantity: Decimal,
    version: u64,
}

impl StockBucket {
    pub fn empty(key: BucketKey) -> Self {
        Self {
            key,
            quantity: Decimal::ZERO,
            version: 0,
        }
    }

    /// Rebuild the bucket from its committed history.
    pub fn rehydrate<'a>(
        key: BucketKey,
        history: impl IntoIterator<Item = &'a StockMovement>,
    ) -> Self {
        let mut bucket = Self::empty(key);
        for m in history {
            bucket.apply(m);
        }
        bucket
    }

    pub fn apply(&mut self, movement: &StockMovement) {
        if movement.bucket() != self.key {
            return;
        }
        self.quantity = accumulate(self.quantity, movement);
        self.version = self.version.max(movement.sequence);
    }

    pub fn key(&self) -> BucketKey {
        self.key
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version)
    }

    /// Reject an ISSUE of `requested` that would take the bucket below zero.
    pub fn ensure_can_issue(&self, requested: Decimal) -> DomainResult<()> {
        if self.quantity < requested {
            return Err(DomainError::insufficient(requested, self.quantity));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockledger_core::{ItemId, LocationId, MovementId};

    fn committed(key: BucketKey, kind: MovementKind, qty: i64, seq: u64) -> StockMovement {
        let mut cmd = AppendMovement::new(key.item_id, kind, Decimal::from(qty));
        cmd.location_id = key.location_id;
        cmd.stamp(MovementId::new(), Utc::now()).commit(seq)
    }

    #[test]
    fn issuing_exactly_the_balance_is_allowed() {
        let key = BucketKey::new(ItemId::new(), Some(LocationId::new()));
        let bucket = StockBucket::rehydrate(
            key,
            &[
                committed(key, MovementKind::Income, 7, 1),
                committed(key, MovementKind::Issue, 2, 2),
            ],
        );
        assert_eq!(bucket.quantity(), Decimal::from(5));
        assert_eq!(bucket.version(), 2);
        bucket.ensure_can_issue(Decimal::from(5)).unwrap();

        let err = bucket.ensure_can_issue(Decimal::from(6)).unwrap_err();
        assert_eq!(
            err,
            DomainError::insufficient(Decimal::from(6), Decimal::from(5))
        );
    }

    #[test]
    fn foreign_bucket_movements_are_ignored() {
        let key = BucketKey::new(ItemId::new(), Some(LocationId::new()));
        let other = BucketKey::new(key.item_id, Some(LocationId::new()));
        let bucket = StockBucket::rehydrate(key, &[committed(other, MovementKind::Income, 9, 1)]);
        assert_eq!(bucket.quantity(), Decimal::ZERO);
        assert_eq!(bucket.expected_version(), ExpectedVersion::Exact(0));
    }

    #[test]
    fn unlocated_issue_skips_the_check_by_default() {
        let cmd = AppendMovement::new(ItemId::new(), MovementKind::Issue, Decimal::ONE);
        assert!(!IssuePolicy::AllowUnlocated.requires_check(&cmd).unwrap());
        assert_eq!(
            IssuePolicy::RequireLocation
                .requires_check(&cmd)
                .unwrap_err()
                .code(),
            "BAD_REQUEST"
        );
        assert!(
            IssuePolicy::AllowUnlocated
                .requires_check(&cmd.clone().at(LocationId::new()))
                .unwrap()
        );
    }

    #[test]
    fn credits_are_never_checked() {
        for kind in [MovementKind::Income, MovementKind::Adjustment] {
            let cmd = AppendMovement::new(ItemId::new(), kind, Decimal::ONE).at(LocationId::new());
            assert!(!IssuePolicy::RequireLocation.requires_check(&cmd).unwrap());
        }
    }
}
