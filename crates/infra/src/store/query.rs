//! Movement history queries.
//!
//! Read-only, paginated inspection of the ledger. Results are ordered newest
//! first (`created_at DESC`, then id for a stable order within one instant).

use serde::{Deserialize, Serialize};

use stockledger_core::{ItemId, LocationId};
use stockledger_inventory::{MovementKind, StockMovement};

/// Pagination parameters for movement queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of movements to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Filter criteria for movement queries. `None` fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub item_id: Option<ItemId>,
    pub location_id: Option<LocationId>,
    pub kind: Option<MovementKind>,
}

impl MovementFilter {
    pub fn matches(&self, movement: &StockMovement) -> bool {
        self.item_id.is_none_or(|id| movement.item_id == id)
            && self
                .location_id
                .is_none_or(|id| movement.location_id == Some(id))
            && self.kind.is_none_or(|k| movement.kind == k)
    }
}

/// One page of movement history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementPage {
    pub movements: Vec<StockMovement>,
    /// Total number of movements matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl MovementPage {
    pub fn new(movements: Vec<StockMovement>, total: u64, pagination: Pagination) -> Self {
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);
        Self {
            movements,
            total,
            pagination,
            has_more,
        }
    }
}
