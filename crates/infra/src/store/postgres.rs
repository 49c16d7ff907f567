//! Postgres-backed ledger store.
//!
//! Every `commit()` runs in one transaction. Bucket versions are re-read inside
//! the transaction and compared with the caller's expectations; the unique
//! constraint on `(item_id, location_key, bucket_seq)` catches writers that
//! raced past the read, and the unique index on `operation_id` catches
//! concurrent replays of the same idempotency key.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation on `operation_id` / receipt key) | `23505` | `DuplicateOperation` | Concurrent replay of the same operation |
//! | Database (unique violation, other) | `23505` | `Concurrency` | Concurrent append to the same bucket |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Concurrency` | Competing multi-bucket commits |
//! | Database (other) | Any other | `Backend` | Constraint or referential errors |
//! | PoolClosed / network / other | N/A | `Backend` | Infrastructure failures |

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockledger_core::{
    ActorId, DiscrepancyId, ExpectedVersion, ItemId, LocationId, MovementId, OrderItemId,
    PurchaseOrderId,
};
use stockledger_inventory::{
    BucketKey, DiscrepancyStatus, OperationId, Reference, StockDiscrepancy, StockMovement,
};
use stockledger_purchasing::{PurchaseOrder, PurchaseOrderItem};

use super::query::{MovementFilter, MovementPage, Pagination};
use super::r#trait::{LedgerStore, LedgerWrite, ReceiptRecord, StoreError};

const MIGRATION: &str = include_str!("../../migrations/0001_stock_ledger.sql");

const OPERATION_ID_CONSTRAINT: &str = "stock_movements_operation_id_key";
const RECEIPT_CONSTRAINT: &str = "goods_receipts_pkey";

const SELECT_MOVEMENTS: &str = r#"
    SELECT
        id, operation_id, movement_type, item_id, quantity, location_id,
        from_location_id, to_location_id, comment, reference_type, reference_id,
        author_id, created_at, bucket_seq
    FROM stock_movements
"#;

const SELECT_DISCREPANCIES: &str = r#"
    SELECT
        id, location_id, item_id, expected_qty, counted_qty, delta, session_id,
        reference_type, reference_id, status, close_note, created_by, created_at,
        closed_by, closed_at, version
    FROM stock_discrepancies
"#;

/// Postgres-backed ledger store.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Apply the bundled schema (idempotent).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn fetch_movements(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        decode_movements(rows)
    }

    async fn fetch_discrepancies(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<StockDiscrepancy>, StoreError> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(|row| -> Result<StockDiscrepancy, StoreError> {
                DiscrepancyRow::from_row(row)
                    .map_err(|e| StoreError::Corrupt(format!("discrepancy row: {e}")))?
                    .try_into()
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(
        skip(self, write),
        fields(
            movements = write.movements.len(),
            guarded_buckets = write.expected.len(),
            discrepancies = write.discrepancies.len(),
            has_order = write.order.is_some()
        ),
        err
    )]
    async fn commit(&self, write: LedgerWrite) -> Result<Vec<StockMovement>, StoreError> {
        if write.is_empty() {
            return Ok(vec![]);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if let Some(receipt) = &write.receipt {
            insert_receipt(&mut tx, receipt).await?;
        }

        // Current sequence of every bucket touched or guarded by this write.
        let mut next: BTreeMap<BucketKey, u64> = BTreeMap::new();
        let touched: Vec<BucketKey> = write
            .movements
            .iter()
            .map(|m| m.bucket())
            .chain(write.expected.keys().copied())
            .collect();
        for key in touched {
            if next.contains_key(&key) {
                continue;
            }
            let current = bucket_version(&mut tx, key).await?;
            if let Some(expected) = write.expected.get(&key) {
                if !expected.matches(current) {
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;
                    return Err(StoreError::Concurrency(format!(
                        "bucket {}/{:?}: expected {expected:?}, found {current}",
                        key.item_id, key.location_id
                    )));
                }
            }
            next.insert(key, current);
        }

        if let Some((order, expected)) = &write.order {
            update_order(&mut tx, order, *expected).await?;
        }

        let mut committed = Vec::with_capacity(write.movements.len());
        for m in write.movements {
            let seq = next.entry(m.bucket()).or_insert(0);
            *seq += 1;
            let stored = m.commit(*seq);
            insert_movement(&mut tx, &stored).await?;
            committed.push(stored);
        }

        for d in &write.discrepancies {
            insert_discrepancy(&mut tx, d).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }

    #[instrument(skip(self), fields(item_id = %key.item_id), err)]
    async fn load_bucket(&self, key: BucketKey) -> Result<Vec<StockMovement>, StoreError> {
        let sql = format!(
            "{SELECT_MOVEMENTS} WHERE item_id = $1 AND location_key = COALESCE($2, '00000000-0000-0000-0000-000000000000'::uuid) ORDER BY bucket_seq ASC"
        );
        let query = sqlx::query(&sql)
            .bind(key.item_id.as_uuid())
            .bind(key.location_id.map(|l| *l.as_uuid()));
        self.fetch_movements("load_bucket", query).await
    }

    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<StockMovement>, StoreError> {
        let sql = format!("{SELECT_MOVEMENTS} WHERE operation_id = $1");
        let query = sqlx::query(&sql).bind(operation_id.as_str());
        Ok(self
            .fetch_movements("find_by_operation", query)
            .await?
            .into_iter()
            .next())
    }

    async fn load_movements(&self, ids: &[MovementId]) -> Result<Vec<StockMovement>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let sql = format!("{SELECT_MOVEMENTS} WHERE id = ANY($1) ORDER BY created_at ASC, id ASC");
        let query = sqlx::query(&sql).bind(ids);
        self.fetch_movements("load_movements", query).await
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn item_movements(
        &self,
        item_id: ItemId,
        location_id: Option<LocationId>,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let sql = format!(
            "{SELECT_MOVEMENTS} WHERE item_id = $1 AND ($2::uuid IS NULL OR location_id = $2) ORDER BY created_at ASC, id ASC"
        );
        let query = sqlx::query(&sql)
            .bind(item_id.as_uuid())
            .bind(location_id.map(|l| *l.as_uuid()));
        self.fetch_movements("item_movements", query).await
    }

    #[instrument(skip(self), fields(location_id = %location_id), err)]
    async fn location_movements(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let sql = format!("{SELECT_MOVEMENTS} WHERE location_id = $1 ORDER BY created_at ASC, id ASC");
        let query = sqlx::query(&sql).bind(location_id.as_uuid());
        self.fetch_movements("location_movements", query).await
    }

    async fn query_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let item_param = filter.item_id.map(|id| *id.as_uuid());
        let location_param = filter.location_id.map(|id| *id.as_uuid());
        let kind_param = filter.kind.map(|k| k.as_str());

        let count_row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM stock_movements
            WHERE ($1::uuid IS NULL OR item_id = $1)
                AND ($2::uuid IS NULL OR location_id = $2)
                AND ($3::text IS NULL OR movement_type = $3)
            "#,
        )
        .bind(item_param)
        .bind(location_param)
        .bind(kind_param)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_movements", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::Corrupt(format!("failed to read count: {e}")))?;

        let sql = format!(
            r#"{SELECT_MOVEMENTS}
            WHERE ($1::uuid IS NULL OR item_id = $1)
                AND ($2::uuid IS NULL OR location_id = $2)
                AND ($3::text IS NULL OR movement_type = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5"#
        );
        let query = sqlx::query(&sql)
            .bind(item_param)
            .bind(location_param)
            .bind(kind_param)
            .bind(i64::from(pagination.limit))
            .bind(i64::from(pagination.offset));
        let movements = self.fetch_movements("query_movements", query).await?;

        Ok(MovementPage::new(movements, total.max(0) as u64, pagination))
    }

    async fn find_receipt(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<ReceiptRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT operation_id, order_id, movement_ids, discrepancy_ids, recorded_at
            FROM goods_receipts
            WHERE operation_id = $1
            "#,
        )
        .bind(operation_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_receipt", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let movement_ids: Vec<Uuid> = row.try_get("movement_ids").map_err(corrupt("receipt"))?;
        let discrepancy_ids: Vec<Uuid> =
            row.try_get("discrepancy_ids").map_err(corrupt("receipt"))?;
        Ok(Some(ReceiptRecord {
            operation_id: operation_id.clone(),
            order_id: PurchaseOrderId::from_uuid(
                row.try_get("order_id").map_err(corrupt("receipt"))?,
            ),
            movement_ids: movement_ids.into_iter().map(MovementId::from_uuid).collect(),
            discrepancy_ids: discrepancy_ids
                .into_iter()
                .map(DiscrepancyId::from_uuid)
                .collect(),
            recorded_at: row.try_get("recorded_at").map_err(corrupt("receipt"))?,
        }))
    }

    #[instrument(skip(self, order), fields(order_id = %order.id), err)]
    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (id, number, supplier, status, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.number)
        .bind(&order.supplier)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(format!("purchase order {}", order.id))
            } else {
                map_sqlx_error("insert_order", e)
            }
        })?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO purchase_order_items
                    (id, order_id, position, item_id, ordered_quantity, received_quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(line.item_id.as_uuid())
            .bind(line.ordered_quantity)
            .bind(line.received_quantity)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, expected = ?expected), err)]
    async fn save_order(
        &self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        update_order(&mut tx, order, expected).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn load_order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        let header = sqlx::query(
            r#"
            SELECT id, number, supplier, status, created_at, updated_at, version
            FROM purchase_orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order", e))?;

        let Some(header) = header else {
            return Ok(None);
        };

        let lines = sqlx::query(
            r#"
            SELECT id, item_id, ordered_quantity, received_quantity
            FROM purchase_order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order_items", e))?;

        let lines = lines
            .iter()
            .map(|row| -> Result<PurchaseOrderItem, StoreError> {
                Ok(PurchaseOrderItem {
                    id: OrderItemId::from_uuid(row.try_get("id").map_err(corrupt("order item"))?),
                    item_id: ItemId::from_uuid(
                        row.try_get("item_id").map_err(corrupt("order item"))?,
                    ),
                    ordered_quantity: row
                        .try_get("ordered_quantity")
                        .map_err(corrupt("order item"))?,
                    received_quantity: row
                        .try_get("received_quantity")
                        .map_err(corrupt("order item"))?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let status: String = header.try_get("status").map_err(corrupt("order"))?;
        let version: i64 = header.try_get("version").map_err(corrupt("order"))?;
        Ok(Some(PurchaseOrder {
            id,
            number: header.try_get("number").map_err(corrupt("order"))?,
            supplier: header.try_get("supplier").map_err(corrupt("order"))?,
            status: status
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("order status: {e}")))?,
            lines,
            created_at: header.try_get("created_at").map_err(corrupt("order"))?,
            updated_at: header.try_get("updated_at").map_err(corrupt("order"))?,
            version: version as u64,
        }))
    }

    #[instrument(skip(self, discrepancy), fields(discrepancy_id = %discrepancy.id), err)]
    async fn save_discrepancy(
        &self,
        discrepancy: &StockDiscrepancy,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE stock_discrepancies
            SET status = $2, close_note = $3, closed_by = $4, closed_at = $5, version = $6
            WHERE id = $1 AND ($7::bigint IS NULL OR version = $7)
            "#,
        )
        .bind(discrepancy.id.as_uuid())
        .bind(discrepancy.status.as_str())
        .bind(&discrepancy.close_note)
        .bind(discrepancy.closed_by.map(|a| *a.as_uuid()))
        .bind(discrepancy.closed_at)
        .bind(discrepancy.version as i64)
        .bind(expected_param(expected))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_discrepancy", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Concurrency(format!(
                "discrepancy {}: expected {expected:?}",
                discrepancy.id
            )));
        }
        Ok(())
    }

    async fn load_discrepancy(
        &self,
        id: DiscrepancyId,
    ) -> Result<Option<StockDiscrepancy>, StoreError> {
        let sql = format!("{SELECT_DISCREPANCIES} WHERE id = $1");
        let query = sqlx::query(&sql).bind(id.as_uuid());
        Ok(self
            .fetch_discrepancies("load_discrepancy", query)
            .await?
            .into_iter()
            .next())
    }

    async fn load_discrepancies(
        &self,
        ids: &[DiscrepancyId],
    ) -> Result<Vec<StockDiscrepancy>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let sql = format!("{SELECT_DISCREPANCIES} WHERE id = ANY($1) ORDER BY created_at ASC, id ASC");
        let query = sqlx::query(&sql).bind(ids);
        self.fetch_discrepancies("load_discrepancies", query).await
    }

    async fn list_discrepancies(
        &self,
        status: Option<DiscrepancyStatus>,
    ) -> Result<Vec<StockDiscrepancy>, StoreError> {
        let sql = format!(
            "{SELECT_DISCREPANCIES} WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC, id DESC"
        );
        let query = sqlx::query(&sql).bind(status.map(|s| s.as_str()));
        self.fetch_discrepancies("list_discrepancies", query).await
    }
}

async fn bucket_version(
    tx: &mut Transaction<'_, Postgres>,
    key: BucketKey,
) -> Result<u64, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(bucket_seq), 0) AS current_version
        FROM stock_movements
        WHERE item_id = $1
            AND location_key = COALESCE($2, '00000000-0000-0000-0000-000000000000'::uuid)
        "#,
    )
    .bind(key.item_id.as_uuid())
    .bind(key.location_id.map(|l| *l.as_uuid()))
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("bucket_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| StoreError::Corrupt(format!("failed to read current_version: {e}")))?;
    Ok(current.max(0) as u64)
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    m: &StockMovement,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, operation_id, movement_type, item_id, quantity, location_id,
            from_location_id, to_location_id, comment, reference_type, reference_id,
            author_id, created_at, bucket_seq
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(m.id.as_uuid())
    .bind(m.operation_id.as_ref().map(|o| o.as_str()))
    .bind(m.kind.as_str())
    .bind(m.item_id.as_uuid())
    .bind(m.quantity)
    .bind(m.location_id.map(|l| *l.as_uuid()))
    .bind(m.from_location_id.map(|l| *l.as_uuid()))
    .bind(m.to_location_id.map(|l| *l.as_uuid()))
    .bind(&m.comment)
    .bind(m.reference.as_ref().map(|r| r.kind.as_str()))
    .bind(m.reference.as_ref().map(|r| r.id.as_str()))
    .bind(m.author_id.map(|a| *a.as_uuid()))
    .bind(m.created_at)
    .bind(m.sequence as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_keyed_insert_error("insert_movement", e, m.operation_id.as_ref()))?;
    Ok(())
}

async fn insert_discrepancy(
    tx: &mut Transaction<'_, Postgres>,
    d: &StockDiscrepancy,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO stock_discrepancies (
            id, location_id, item_id, expected_qty, counted_qty, delta, session_id,
            reference_type, reference_id, status, close_note, created_by, created_at,
            closed_by, closed_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(d.id.as_uuid())
    .bind(d.location_id.map(|l| *l.as_uuid()))
    .bind(d.item_id.as_uuid())
    .bind(d.expected_qty)
    .bind(d.counted_qty)
    .bind(d.delta)
    .bind(&d.session_id)
    .bind(d.reference.as_ref().map(|r| r.kind.as_str()))
    .bind(d.reference.as_ref().map(|r| r.id.as_str()))
    .bind(d.status.as_str())
    .bind(&d.close_note)
    .bind(d.created_by.map(|a| *a.as_uuid()))
    .bind(d.created_at)
    .bind(d.closed_by.map(|a| *a.as_uuid()))
    .bind(d.closed_at)
    .bind(d.version as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Duplicate(format!("discrepancy {}", d.id))
        } else {
            map_sqlx_error("insert_discrepancy", e)
        }
    })?;
    Ok(())
}

async fn insert_receipt(
    tx: &mut Transaction<'_, Postgres>,
    receipt: &ReceiptRecord,
) -> Result<(), StoreError> {
    let movement_ids: Vec<Uuid> = receipt.movement_ids.iter().map(|id| *id.as_uuid()).collect();
    let discrepancy_ids: Vec<Uuid> = receipt
        .discrepancy_ids
        .iter()
        .map(|id| *id.as_uuid())
        .collect();

    sqlx::query(
        r#"
        INSERT INTO goods_receipts (operation_id, order_id, movement_ids, discrepancy_ids, recorded_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(receipt.operation_id.as_str())
    .bind(receipt.order_id.as_uuid())
    .bind(movement_ids)
    .bind(discrepancy_ids)
    .bind(receipt.recorded_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_keyed_insert_error("insert_receipt", e, Some(&receipt.operation_id)))?;
    Ok(())
}

async fn update_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &PurchaseOrder,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE purchase_orders
        SET status = $2, supplier = $3, updated_at = $4, version = $5
        WHERE id = $1 AND ($6::bigint IS NULL OR version = $6)
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.status.as_str())
    .bind(&order.supplier)
    .bind(order.updated_at)
    .bind(order.version as i64)
    .bind(expected_param(expected))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_order", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Concurrency(format!(
            "purchase order {}: expected {expected:?}",
            order.id
        )));
    }

    for line in &order.lines {
        sqlx::query("UPDATE purchase_order_items SET received_quantity = $2 WHERE id = $1")
            .bind(line.id.as_uuid())
            .bind(line.received_quantity)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_order_item", e))?;
    }
    Ok(())
}

fn expected_param(expected: ExpectedVersion) -> Option<i64> {
    match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    }
}

fn corrupt(what: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::Corrupt(format!("failed to read {what} row: {e}"))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation: a concurrent writer took the bucket sequence.
                Some("23505") => StoreError::Concurrency(msg),
                Some("40001") | Some("40P01") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Backend(format!("unexpected row not found in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Like `map_sqlx_error`, but a unique violation on an idempotency key becomes
/// `DuplicateOperation` so the caller can re-read the winner.
fn map_keyed_insert_error(
    operation: &str,
    err: sqlx::Error,
    operation_id: Option<&OperationId>,
) -> StoreError {
    if let (sqlx::Error::Database(db_err), Some(op)) = (&err, operation_id) {
        let is_key = matches!(
            db_err.constraint(),
            Some(OPERATION_ID_CONSTRAINT) | Some(RECEIPT_CONSTRAINT)
        );
        if is_key && db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateOperation(op.clone());
        }
    }
    map_sqlx_error(operation, err)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

fn decode_movements(rows: Vec<PgRow>) -> Result<Vec<StockMovement>, StoreError> {
    rows.iter()
        .map(|row| -> Result<StockMovement, StoreError> {
            MovementRow::from_row(row)
                .map_err(|e| StoreError::Corrupt(format!("movement row: {e}")))?
                .try_into()
        })
        .collect()
}

fn reference_from(kind: Option<String>, id: Option<String>) -> Option<Reference> {
    match (kind, id) {
        (Some(kind), Some(id)) => Some(Reference::new(kind, id)),
        _ => None,
    }
}

// SQLx row types

#[derive(Debug)]
struct MovementRow {
    id: Uuid,
    operation_id: Option<String>,
    movement_type: String,
    item_id: Uuid,
    quantity: Decimal,
    location_id: Option<Uuid>,
    from_location_id: Option<Uuid>,
    to_location_id: Option<Uuid>,
    comment: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<String>,
    author_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    bucket_seq: i64,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            operation_id: row.try_get("operation_id")?,
            movement_type: row.try_get("movement_type")?,
            item_id: row.try_get("item_id")?,
            quantity: row.try_get("quantity")?,
            location_id: row.try_get("location_id")?,
            from_location_id: row.try_get("from_location_id")?,
            to_location_id: row.try_get("to_location_id")?,
            comment: row.try_get("comment")?,
            reference_type: row.try_get("reference_type")?,
            reference_id: row.try_get("reference_id")?,
            author_id: row.try_get("author_id")?,
            created_at: row.try_get("created_at")?,
            bucket_seq: row.try_get("bucket_seq")?,
        })
    }
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let kind = row
            .movement_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("movement {}: {e}", row.id)))?;
        let operation_id = row
            .operation_id
            .map(OperationId::new)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("movement {}: {e}", row.id)))?;

        Ok(StockMovement {
            id: MovementId::from_uuid(row.id),
            operation_id,
            kind,
            item_id: ItemId::from_uuid(row.item_id),
            quantity: row.quantity,
            location_id: row.location_id.map(LocationId::from_uuid),
            from_location_id: row.from_location_id.map(LocationId::from_uuid),
            to_location_id: row.to_location_id.map(LocationId::from_uuid),
            comment: row.comment,
            reference: reference_from(row.reference_type, row.reference_id),
            author_id: row.author_id.map(ActorId::from_uuid),
            created_at: row.created_at,
            sequence: row.bucket_seq.max(0) as u64,
        })
    }
}

#[derive(Debug)]
struct DiscrepancyRow {
    id: Uuid,
    location_id: Option<Uuid>,
    item_id: Uuid,
    expected_qty: Decimal,
    counted_qty: Decimal,
    delta: Decimal,
    session_id: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<String>,
    status: String,
    close_note: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    closed_by: Option<Uuid>,
    closed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for DiscrepancyRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(DiscrepancyRow {
            id: row.try_get("id")?,
            location_id: row.try_get("location_id")?,
            item_id: row.try_get("item_id")?,
            expected_qty: row.try_get("expected_qty")?,
            counted_qty: row.try_get("counted_qty")?,
            delta: row.try_get("delta")?,
            session_id: row.try_get("session_id")?,
            reference_type: row.try_get("reference_type")?,
            reference_id: row.try_get("reference_id")?,
            status: row.try_get("status")?,
            close_note: row.try_get("close_note")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            closed_by: row.try_get("closed_by")?,
            closed_at: row.try_get("closed_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<DiscrepancyRow> for StockDiscrepancy {
    type Error = StoreError;

    fn try_from(row: DiscrepancyRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("discrepancy {}: {e}", row.id)))?;

        Ok(StockDiscrepancy {
            id: DiscrepancyId::from_uuid(row.id),
            location_id: row.location_id.map(LocationId::from_uuid),
            item_id: ItemId::from_uuid(row.item_id),
            expected_qty: row.expected_qty,
            counted_qty: row.counted_qty,
            delta: row.delta,
            session_id: row.session_id,
            reference: reference_from(row.reference_type, row.reference_id),
            status,
            close_note: row.close_note,
            created_by: row.created_by.map(ActorId::from_uuid),
            created_at: row.created_at,
            closed_by: row.closed_by.map(ActorId::from_uuid),
            closed_at: row.closed_at,
            version: row.version.max(0) as u64,
        })
    }
}
