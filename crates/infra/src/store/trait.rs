use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{
    DiscrepancyId, ExpectedVersion, ItemId, LocationId, MovementId, PurchaseOrderId,
};
use stockledger_inventory::{
    BucketKey, DiscrepancyStatus, OperationId, StockDiscrepancy, StockMovement,
    UncommittedMovement,
};
use stockledger_purchasing::PurchaseOrder;

use super::query::{MovementFilter, MovementPage, Pagination};

/// Storage operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    /// An expected version did not match (a bucket, order or discrepancy moved on).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// Another commit already recorded this idempotency key.
    #[error("operation '{0}' already recorded")]
    DuplicateOperation(OperationId),

    /// A record with the same identity already exists.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A stored row could not be mapped back into a domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Idempotency record of a whole goods receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub operation_id: OperationId,
    pub order_id: PurchaseOrderId,
    pub movement_ids: Vec<MovementId>,
    pub discrepancy_ids: Vec<DiscrepancyId>,
    pub recorded_at: DateTime<Utc>,
}

/// Everything one business operation writes, committed all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct LedgerWrite {
    pub movements: Vec<UncommittedMovement>,
    /// Version expectations for balance-checked buckets. Buckets not listed
    /// here are appended to unconditionally.
    pub expected: BTreeMap<BucketKey, ExpectedVersion>,
    /// Newly opened discrepancies.
    pub discrepancies: Vec<StockDiscrepancy>,
    /// Order update with the version it was decided against.
    pub order: Option<(PurchaseOrder, ExpectedVersion)>,
    pub receipt: Option<ReceiptRecord>,
}

impl LedgerWrite {
    pub fn movement(movement: UncommittedMovement) -> Self {
        Self {
            movements: vec![movement],
            ..Self::default()
        }
    }

    pub fn expect(mut self, bucket: BucketKey, expected: ExpectedVersion) -> Self {
        self.expected.insert(bucket, expected);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
            && self.discrepancies.is_empty()
            && self.order.is_none()
            && self.receipt.is_none()
    }
}

/// Append-only movement ledger plus the records committed alongside it.
///
/// ## Commit semantics
///
/// `commit()` must, atomically:
/// - reject the write with `DuplicateOperation` if any movement's (or the
///   receipt's) idempotency key is already recorded
/// - check every `expected` bucket version against the last committed sequence
///   and every order expectation against the stored order version
/// - assign each movement the next sequence number of its bucket
/// - persist movements, discrepancies, the order and the receipt record
///
/// Nothing is visible to readers unless everything is.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn commit(&self, write: LedgerWrite) -> Result<Vec<StockMovement>, StoreError>;

    /// Movements of one bucket, ascending by sequence.
    async fn load_bucket(&self, key: BucketKey) -> Result<Vec<StockMovement>, StoreError>;

    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<StockMovement>, StoreError>;

    async fn load_movements(&self, ids: &[MovementId]) -> Result<Vec<StockMovement>, StoreError>;

    /// All movements of an item; restricted to one location when given.
    async fn item_movements(
        &self,
        item_id: ItemId,
        location_id: Option<LocationId>,
    ) -> Result<Vec<StockMovement>, StoreError>;

    async fn location_movements(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<StockMovement>, StoreError>;

    async fn query_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;

    async fn find_receipt(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<ReceiptRecord>, StoreError>;

    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), StoreError>;

    async fn save_order(
        &self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    async fn load_order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError>;

    async fn save_discrepancy(
        &self,
        discrepancy: &StockDiscrepancy,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    async fn load_discrepancy(
        &self,
        id: DiscrepancyId,
    ) -> Result<Option<StockDiscrepancy>, StoreError>;

    async fn load_discrepancies(
        &self,
        ids: &[DiscrepancyId],
    ) -> Result<Vec<StockDiscrepancy>, StoreError>;

    /// Discrepancies, newest first.
    async fn list_discrepancies(
        &self,
        status: Option<DiscrepancyStatus>,
    ) -> Result<Vec<StockDiscrepancy>, StoreError>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn commit(&self, write: LedgerWrite) -> Result<Vec<StockMovement>, StoreError> {
        (**self).commit(write).await
    }

    async fn load_bucket(&self, key: BucketKey) -> Result<Vec<StockMovement>, StoreError> {
        (**self).load_bucket(key).await
    }

    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<StockMovement>, StoreError> {
        (**self).find_by_operation(operation_id).await
    }

    async fn load_movements(&self, ids: &[MovementId]) -> Result<Vec<StockMovement>, StoreError> {
        (**self).load_movements(ids).await
    }

    async fn item_movements(
        &self,
        item_id: ItemId,
        location_id: Option<LocationId>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        (**self).item_movements(item_id, location_id).await
    }

    async fn location_movements(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<StockMovement>, StoreError> {
        (**self).location_movements(location_id).await
    }

    async fn query_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).query_movements(filter, pagination).await
    }

    async fn find_receipt(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<ReceiptRecord>, StoreError> {
        (**self).find_receipt(operation_id).await
    }

    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        (**self).insert_order(order).await
    }

    async fn save_order(
        &self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).save_order(order, expected).await
    }

    async fn load_order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        (**self).load_order(id).await
    }

    async fn save_discrepancy(
        &self,
        discrepancy: &StockDiscrepancy,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).save_discrepancy(discrepancy, expected).await
    }

    async fn load_discrepancy(
        &self,
        id: DiscrepancyId,
    ) -> Result<Option<StockDiscrepancy>, StoreError> {
        (**self).load_discrepancy(id).await
    }

    async fn load_discrepancies(
        &self,
        ids: &[DiscrepancyId],
    ) -> Result<Vec<StockDiscrepancy>, StoreError> {
        (**self).load_discrepancies(ids).await
    }

    async fn list_discrepancies(
        &self,
        status: Option<DiscrepancyStatus>,
    ) -> Result<Vec<StockDiscrepancy>, StoreError> {
        (**self).list_discrepancies(status).await
    }
}
