use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorId, DomainError, DomainResult, ItemId, LocationId, MovementId};

use crate::quantity::ensure_within_bounds;

/// Movement kind.
///
/// Direction is carried by the kind, never by the sign of the stored quantity
/// (except for `Adjustment`, whose quantity is signed).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Income,
    Issue,
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Income => "INCOME",
            MovementKind::Issue => "ISSUE",
            MovementKind::Adjustment => "ADJUSTMENT",
        }
    }

    /// Signed effect of `quantity` on derived stock.
    pub fn signed_effect(self, quantity: Decimal) -> Decimal {
        match self {
            MovementKind::Income | MovementKind::Adjustment => quantity,
            MovementKind::Issue => -quantity,
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INCOME" => Ok(MovementKind::Income),
            "ISSUE" => Ok(MovementKind::Issue),
            "ADJUSTMENT" => Ok(MovementKind::Adjustment),
            other => Err(DomainError::bad_request(format!(
                "unknown movement type '{other}' (expected INCOME, ISSUE or ADJUSTMENT)"
            ))),
        }
    }
}

/// Caller-supplied idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub const MAX_LEN: usize = 200;

    pub fn new(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::bad_request("operation_id cannot be empty"));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(DomainError::bad_request(format!(
                "operation_id longer than {} characters",
                Self::MAX_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a per-line key from a batch key (`{self}:{suffix}`).
    pub fn child(&self, suffix: impl core::fmt::Display) -> Self {
        Self(format!("{}:{}", self.0, suffix))
    }
}

impl core::fmt::Display for OperationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a movement was booked against (purchase order, transfer, count, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl Reference {
    pub const PURCHASE_ORDER: &'static str = "PURCHASE_ORDER";
    pub const TRANSFER: &'static str = "TRANSFER";

    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn purchase_order(id: impl core::fmt::Display) -> Self {
        Self::new(Self::PURCHASE_ORDER, id.to_string())
    }

    pub fn transfer(id: impl core::fmt::Display) -> Self {
        Self::new(Self::TRANSFER, id.to_string())
    }
}

/// Stock bucket: the unit of balance checking and sequencing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub item_id: ItemId,
    pub location_id: Option<LocationId>,
}

impl BucketKey {
    pub fn new(item_id: ItemId, location_id: Option<LocationId>) -> Self {
        Self {
            item_id,
            location_id,
        }
    }
}

/// Command: append one movement to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendMovement {
    pub item_id: ItemId,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub location_id: Option<LocationId>,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub comment: Option<String>,
    pub reference: Option<Reference>,
    pub author_id: Option<ActorId>,
    pub operation_id: Option<OperationId>,
}

impl AppendMovement {
    pub fn new(item_id: ItemId, kind: MovementKind, quantity: Decimal) -> Self {
        Self {
            item_id,
            kind,
            quantity,
            location_id: None,
            from_location_id: None,
            to_location_id: None,
            comment: None,
            reference: None,
            author_id: None,
            operation_id: None,
        }
    }

    pub fn at(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_operation_id(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_author(mut self, author_id: Option<ActorId>) -> Self {
        self.author_id = author_id;
        self
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn bucket(&self) -> BucketKey {
        BucketKey::new(self.item_id, self.location_id)
    }

    /// Validate the quantity against the movement kind.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity.is_zero() {
            return Err(DomainError::bad_quantity("quantity must be non-zero"));
        }
        ensure_within_bounds(self.quantity)?;

        match self.kind {
            MovementKind::Income | MovementKind::Issue => {
                if self.quantity < Decimal::ZERO {
                    return Err(DomainError::bad_quantity(format!(
                        "{} quantity must be a positive magnitude",
                        self.kind
                    )));
                }
            }
            MovementKind::Adjustment => {}
        }

        Ok(())
    }

    /// Assign identity and timestamp; the store assigns the bucket sequence.
    pub fn stamp(self, id: MovementId, created_at: DateTime<Utc>) -> UncommittedMovement {
        UncommittedMovement {
            id,
            created_at,
            movement: self,
        }
    }
}

/// A validated movement ready to be committed (no bucket sequence yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedMovement {
    pub id: MovementId,
    pub created_at: DateTime<Utc>,
    pub movement: AppendMovement,
}

impl UncommittedMovement {
    pub fn bucket(&self) -> BucketKey {
        self.movement.bucket()
    }

    pub fn commit(self, sequence: u64) -> StockMovement {
        let m = self.movement;
        StockMovement {
            id: self.id,
            operation_id: m.operation_id,
            kind: m.kind,
            item_id: m.item_id,
            quantity: m.quantity,
            location_id: m.location_id,
            from_location_id: m.from_location_id,
            to_location_id: m.to_location_id,
            comment: m.comment,
            reference: m.reference,
            author_id: m.author_id,
            created_at: self.created_at,
            sequence,
        }
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub operation_id: Option<OperationId>,
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub location_id: Option<LocationId>,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub comment: Option<String>,
    pub reference: Option<Reference>,
    pub author_id: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    /// Position in the (item, location) bucket, starting at 1.
    pub sequence: u64,
}

impl StockMovement {
    pub fn bucket(&self) -> BucketKey {
        BucketKey::new(self.item_id, self.location_id)
    }
}
