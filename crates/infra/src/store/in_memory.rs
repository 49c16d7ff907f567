use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use stockledger_core::{
    AggregateRoot, DiscrepancyId, ExpectedVersion, ItemId, LocationId, MovementId, PurchaseOrderId,
};
use stockledger_inventory::{
    BucketKey, DiscrepancyStatus, OperationId, StockDiscrepancy, StockMovement,
};
use stockledger_purchasing::PurchaseOrder;

use super::query::{MovementFilter, MovementPage, Pagination};
use super::r#trait::{LedgerStore, LedgerWrite, ReceiptRecord, StoreError};

#[derive(Debug, Default)]
struct LedgerState {
    /// Commit order.
    movements: Vec<StockMovement>,
    /// Last committed sequence per bucket.
    buckets: HashMap<BucketKey, u64>,
    /// Idempotency index into `movements`.
    operations: HashMap<OperationId, usize>,
    receipts: HashMap<OperationId, ReceiptRecord>,
    orders: HashMap<PurchaseOrderId, PurchaseOrder>,
    discrepancies: HashMap<DiscrepancyId, StockDiscrepancy>,
}

impl LedgerState {
    fn bucket_version(&self, key: &BucketKey) -> u64 {
        self.buckets.get(key).copied().unwrap_or(0)
    }

    fn ensure_committable(&self, write: &LedgerWrite) -> Result<(), StoreError> {
        if let Some(receipt) = &write.receipt {
            if self.receipts.contains_key(&receipt.operation_id) {
                return Err(StoreError::DuplicateOperation(receipt.operation_id.clone()));
            }
        }

        let mut batch_ops = HashSet::new();
        for m in &write.movements {
            if let Some(op) = &m.movement.operation_id {
                if self.operations.contains_key(op) || !batch_ops.insert(op) {
                    return Err(StoreError::DuplicateOperation(op.clone()));
                }
            }
        }

        for (key, expected) in &write.expected {
            let current = self.bucket_version(key);
            if !expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "bucket {}/{:?}: expected {expected:?}, found {current}",
                    key.item_id, key.location_id
                )));
            }
        }

        if let Some((order, expected)) = &write.order {
            check_version(self.orders.get(&order.id), order, *expected, "purchase order")?;
        }

        for d in &write.discrepancies {
            if self.discrepancies.contains_key(&d.id) {
                return Err(StoreError::Duplicate(format!("discrepancy {}", d.id)));
            }
        }

        Ok(())
    }
}

/// Compare the stored aggregate's version (0 when absent) with the writer's
/// expectation.
fn check_version<A>(
    stored: Option<&A>,
    incoming: &A,
    expected: ExpectedVersion,
    label: &str,
) -> Result<(), StoreError>
where
    A: AggregateRoot,
    A::Id: core::fmt::Display,
{
    let current = stored.map(A::version).unwrap_or(0);
    if !expected.matches(current) {
        return Err(StoreError::Concurrency(format!(
            "{label} {}: expected {expected:?}, found {current}",
            incoming.id()
        )));
    }
    Ok(())
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Every commit runs inside one write-lock section, so
/// version checks, idempotency checks and inserts are a single atomic step.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn collect_movements(
        &self,
        pred: impl Fn(&StockMovement) -> bool,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let state = self.read()?;
        Ok(state.movements.iter().filter(|m| pred(m)).cloned().collect())
    }
}

fn newest_first(a: &StockMovement, b: &StockMovement) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn commit(&self, write: LedgerWrite) -> Result<Vec<StockMovement>, StoreError> {
        if write.is_empty() {
            return Ok(vec![]);
        }

        let mut state = self.write()?;
        state.ensure_committable(&write)?;

        let LedgerWrite {
            movements,
            discrepancies,
            order,
            receipt,
            ..
        } = write;

        let mut committed = Vec::with_capacity(movements.len());
        for m in movements {
            let key = m.bucket();
            let sequence = state.bucket_version(&key) + 1;
            state.buckets.insert(key, sequence);

            let stored = m.commit(sequence);
            if let Some(op) = &stored.operation_id {
                let index = state.movements.len();
                state.operations.insert(op.clone(), index);
            }
            state.movements.push(stored.clone());
            committed.push(stored);
        }

        for d in discrepancies {
            state.discrepancies.insert(d.id, d);
        }
        if let Some((order, _)) = order {
            state.orders.insert(order.id, order);
        }
        if let Some(receipt) = receipt {
            state.receipts.insert(receipt.operation_id.clone(), receipt);
        }

        Ok(committed)
    }

    async fn load_bucket(&self, key: BucketKey) -> Result<Vec<StockMovement>, StoreError> {
        let mut bucket = self.collect_movements(|m| m.bucket() == key)?;
        bucket.sort_by_key(|m| m.sequence);
        Ok(bucket)
    }

    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<StockMovement>, StoreError> {
        let state = self.read()?;
        Ok(state
            .operations
            .get(operation_id)
            .and_then(|idx| state.movements.get(*idx))
            .cloned())
    }

    async fn load_movements(&self, ids: &[MovementId]) -> Result<Vec<StockMovement>, StoreError> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.movements.iter().find(|m| m.id == *id))
            .cloned()
            .collect())
    }

    async fn item_movements(
        &self,
        item_id: ItemId,
        location_id: Option<LocationId>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        self.collect_movements(|m| {
            m.item_id == item_id && location_id.is_none_or(|loc| m.location_id == Some(loc))
        })
    }

    async fn location_movements(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<StockMovement>, StoreError> {
        self.collect_movements(|m| m.location_id == Some(location_id))
    }

    async fn query_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let mut matching = self.collect_movements(|m| filter.matches(m))?;
        matching.sort_by(newest_first);

        let total = matching.len() as u64;
        let movements = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();

        Ok(MovementPage::new(movements, total, pagination))
    }

    async fn find_receipt(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<ReceiptRecord>, StoreError> {
        Ok(self.read()?.receipts.get(operation_id).cloned())
    }

    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(format!("purchase order {}", order.id)));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn save_order(
        &self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        check_version(state.orders.get(&order.id), order, expected, "purchase order")?;
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn load_order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        Ok(self.read()?.orders.get(&id).cloned())
    }

    async fn save_discrepancy(
        &self,
        discrepancy: &StockDiscrepancy,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        check_version(
            state.discrepancies.get(&discrepancy.id),
            discrepancy,
            expected,
            "discrepancy",
        )?;
        state
            .discrepancies
            .insert(discrepancy.id, discrepancy.clone());
        Ok(())
    }

    async fn load_discrepancy(
        &self,
        id: DiscrepancyId,
    ) -> Result<Option<StockDiscrepancy>, StoreError> {
        Ok(self.read()?.discrepancies.get(&id).cloned())
    }

    async fn load_discrepancies(
        &self,
        ids: &[DiscrepancyId],
    ) -> Result<Vec<StockDiscrepancy>, StoreError> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.discrepancies.get(id))
            .cloned()
            .collect())
    }

    async fn list_discrepancies(
        &self,
        status: Option<DiscrepancyStatus>,
    ) -> Result<Vec<StockDiscrepancy>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<_> = state
            .discrepancies
            .values()
            .filter(|d| status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use stockledger_inventory::{AppendMovement, MovementKind};

    fn income(key: BucketKey, qty: i64) -> LedgerWrite {
        let mut cmd = AppendMovement::new(key.item_id, MovementKind::Income, Decimal::from(qty));
        cmd.location_id = key.location_id;
        LedgerWrite::movement(cmd.stamp(MovementId::new(), Utc::now()))
    }

    #[tokio::test]
    async fn sequences_are_assigned_per_bucket() {
        let store = InMemoryLedgerStore::new();
        let a = BucketKey::new(ItemId::new(), Some(LocationId::new()));
        let b = BucketKey::new(a.item_id, None);

        store.commit(income(a, 1)).await.unwrap();
        store.commit(income(b, 1)).await.unwrap();
        let second = store.commit(income(a, 1)).await.unwrap();

        assert_eq!(second[0].sequence, 2);
        assert_eq!(store.load_bucket(b).await.unwrap()[0].sequence, 1);
    }

    #[tokio::test]
    async fn stale_bucket_version_is_rejected_without_side_effects() {
        let store = InMemoryLedgerStore::new();
        let key = BucketKey::new(ItemId::new(), Some(LocationId::new()));
        store.commit(income(key, 5)).await.unwrap();

        let err = store
            .commit(income(key, 1).expect(key, ExpectedVersion::Exact(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(store.load_bucket(key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recorded_operation_ids_are_rejected() {
        let store = InMemoryLedgerStore::new();
        let key = BucketKey::new(ItemId::new(), None);
        let op = OperationId::new("op-1").unwrap();

        let mut write = income(key, 1);
        write.movements[0].movement.operation_id = Some(op.clone());
        store.commit(write.clone()).await.unwrap();

        write.movements[0].id = MovementId::new();
        let err = store.commit(write).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOperation(ref o) if *o == op));
        assert!(store.find_by_operation(&op).await.unwrap().is_some());
    }
}
