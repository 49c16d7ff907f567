use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    ActorId, AggregateRoot, DiscrepancyId, DomainError, DomainResult, ItemId, LocationId,
};

use crate::movement::Reference;
use crate::quantity::ensure_within_bounds;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyStatus {
    Open,
    Closed,
}

impl DiscrepancyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyStatus::Open => "OPEN",
            DiscrepancyStatus::Closed => "CLOSED",
        }
    }
}

impl core::str::FromStr for DiscrepancyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(DiscrepancyStatus::Open),
            "CLOSED" => Ok(DiscrepancyStatus::Closed),
            other => Err(DomainError::bad_request(format!(
                "unknown discrepancy status '{other}'"
            ))),
        }
    }
}

/// Command: record a variance between expected and counted/received stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDiscrepancy {
    pub location_id: Option<LocationId>,
    pub item_id: ItemId,
    pub expected_qty: Decimal,
    pub counted_qty: Decimal,
    pub session_id: Option<String>,
    pub reference: Option<Reference>,
    pub created_by: Option<ActorId>,
}

/// A historical finding: the delta is fixed when the discrepancy is opened and
/// is never recomputed from later movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDiscrepancy {
    pub id: DiscrepancyId,
    pub location_id: Option<LocationId>,
    pub item_id: ItemId,
    pub expected_qty: Decimal,
    pub counted_qty: Decimal,
    pub delta: Decimal,
    pub session_id: Option<String>,
    pub reference: Option<Reference>,
    pub status: DiscrepancyStatus,
    pub close_note: Option<String>,
    pub created_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    pub closed_by: Option<ActorId>,
    pub closed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl StockDiscrepancy {
    pub fn open(cmd: OpenDiscrepancy, id: DiscrepancyId, at: DateTime<Utc>) -> DomainResult<Self> {
        if cmd.counted_qty < Decimal::ZERO {
            return Err(DomainError::bad_quantity("counted quantity cannot be negative"));
        }
        ensure_within_bounds(cmd.counted_qty)?;
        ensure_within_bounds(cmd.expected_qty)?;
        if cmd.expected_qty == cmd.counted_qty {
            return Err(DomainError::validation(
                "expected and counted quantities are equal; there is no discrepancy",
            ));
        }

        Ok(Self {
            id,
            location_id: cmd.location_id,
            item_id: cmd.item_id,
            expected_qty: cmd.expected_qty,
            counted_qty: cmd.counted_qty,
            delta: cmd.counted_qty - cmd.expected_qty,
            session_id: cmd.session_id,
            reference: cmd.reference,
            status: DiscrepancyStatus::Open,
            close_note: None,
            created_by: cmd.created_by,
            created_at: at,
            closed_by: None,
            closed_at: None,
            version: 1,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == DiscrepancyStatus::Open
    }

    /// OPEN → CLOSED. Never touches the ledger; books are corrected by a
    /// separately authored ADJUSTMENT.
    pub fn close(
        &mut self,
        note: Option<String>,
        actor: Option<ActorId>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.is_open() {
            return Err(DomainError::AlreadyClosed);
        }

        self.status = DiscrepancyStatus::Closed;
        self.close_note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.closed_by = actor;
        self.closed_at = Some(at);
        self.version += 1;
        Ok(())
    }
}

impl AggregateRoot for StockDiscrepancy {
    type Id = DiscrepancyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_cmd(expected: i64, counted: i64) -> OpenDiscrepancy {
        OpenDiscrepancy {
            location_id: Some(LocationId::new()),
            item_id: ItemId::new(),
            expected_qty: Decimal::from(expected),
            counted_qty: Decimal::from(counted),
            session_id: Some("count-2024-01".to_string()),
            reference: None,
            created_by: None,
        }
    }

    #[test]
    fn delta_is_counted_minus_expected() {
        let d = StockDiscrepancy::open(open_cmd(10, 8), DiscrepancyId::new(), Utc::now()).unwrap();
        assert_eq!(d.delta, Decimal::from(-2));
        assert!(d.is_open());
    }

    #[test]
    fn out_of_range_quantities_are_bad_qty() {
        let mut cmd = open_cmd(10, 8);
        cmd.expected_qty = -Decimal::MAX;
        let err = StockDiscrepancy::open(cmd, DiscrepancyId::new(), Utc::now()).unwrap_err();
        assert_eq!(err.code(), "BAD_QTY");
    }

    #[test]
    fn equal_quantities_are_not_a_discrepancy() {
        let err = StockDiscrepancy::open(open_cmd(5, 5), DiscrepancyId::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn second_close_is_rejected_and_keeps_the_first_note() {
        let mut d =
            StockDiscrepancy::open(open_cmd(3, 4), DiscrepancyId::new(), Utc::now()).unwrap();
        d.close(Some("found behind shelf".to_string()), None, Utc::now())
            .unwrap();
        assert_eq!(d.status, DiscrepancyStatus::Closed);
        assert_eq!(d.version, 2);

        let err = d
            .close(Some("second".to_string()), None, Utc::now())
            .unwrap_err();
        assert_eq!(err, DomainError::AlreadyClosed);
        assert_eq!(d.close_note.as_deref(), Some("found behind shelf"));
        assert_eq!(d.version, 2);
    }
}
