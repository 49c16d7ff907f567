//! Goods receiving: one commit for movements, discrepancies and the order.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use stockledger_core::{DiscrepancyId, DomainError, ExpectedVersion, MovementId, PurchaseOrderId};
use stockledger_inventory::{StockDiscrepancy, StockMovement};
use stockledger_purchasing::{PurchaseOrder, ReceiveGoods};

use crate::catalog::Catalog;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerWrite, ReceiptRecord, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptOutcome {
    pub order: PurchaseOrder,
    pub movements: Vec<StockMovement>,
    pub discrepancies: Vec<StockDiscrepancy>,
    pub replayed: bool,
}

pub struct ReceivingCoordinator<S, C> {
    store: S,
    catalog: C,
    max_attempts: u32,
}

impl<S, C> ReceivingCoordinator<S, C>
where
    S: LedgerStore,
    C: Catalog,
{
    pub fn new(store: S, catalog: C, max_attempts: u32) -> Self {
        Self {
            store,
            catalog,
            max_attempts,
        }
    }

    #[instrument(skip(self, cmd), fields(order_id = %order_id, lines = cmd.lines.len()), err)]
    pub async fn receive(
        &self,
        order_id: PurchaseOrderId,
        cmd: ReceiveGoods,
    ) -> LedgerResult<ReceiptOutcome> {
        if let Some(op) = &cmd.operation_id {
            if let Some(record) = self.store.find_receipt(op).await? {
                return self.replay(record).await;
            }
        }

        if let Some(location) = cmd.location_id {
            if self.catalog.location(location).await?.is_none() {
                return Err(DomainError::validation(format!("unknown location {location}")).into());
            }
        }

        let mut last_conflict = String::new();
        for attempt in 1..=self.max_attempts {
            let order = self
                .store
                .load_order(order_id)
                .await?
                .ok_or(DomainError::OrderNotFound)?;

            let now = Utc::now();
            let plan = order.plan_receipt(&cmd, now)?;

            let movements: Vec<_> = plan
                .movements
                .into_iter()
                .map(|m| m.stamp(MovementId::new(), now))
                .collect();
            let discrepancies = plan
                .discrepancies
                .into_iter()
                .map(|d| StockDiscrepancy::open(d, DiscrepancyId::new(), now))
                .collect::<Result<Vec<_>, _>>()?;

            let receipt = cmd.operation_id.clone().map(|operation_id| ReceiptRecord {
                operation_id,
                order_id,
                movement_ids: movements.iter().map(|m| m.id).collect(),
                discrepancy_ids: discrepancies.iter().map(|d| d.id).collect(),
                recorded_at: now,
            });

            let write = LedgerWrite {
                movements,
                discrepancies: discrepancies.clone(),
                order: Some((plan.order.clone(), ExpectedVersion::Exact(order.version))),
                receipt,
                ..LedgerWrite::default()
            };

            match self.store.commit(write).await {
                Ok(movements) => {
                    info!(
                        status = plan.status.as_str(),
                        movements = movements.len(),
                        discrepancies = discrepancies.len(),
                        attempt,
                        "goods received"
                    );
                    return Ok(ReceiptOutcome {
                        order: plan.order,
                        movements,
                        discrepancies,
                        replayed: false,
                    });
                }
                Err(StoreError::Concurrency(msg)) => {
                    warn!(attempt, reason = %msg, "purchase order moved on, retrying receipt");
                    last_conflict = msg;
                }
                Err(StoreError::DuplicateOperation(op)) => {
                    if let Some(record) = self.store.find_receipt(&op).await? {
                        return self.replay(record).await;
                    }
                    return Err(StoreError::DuplicateOperation(op).into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Contention {
            attempts: self.max_attempts,
            last: last_conflict,
        })
    }

    async fn replay(&self, record: ReceiptRecord) -> LedgerResult<ReceiptOutcome> {
        info!(operation_id = %record.operation_id, "replayed receipt, nothing posted");
        let order = self
            .store
            .load_order(record.order_id)
            .await?
            .ok_or(DomainError::OrderNotFound)?;
        Ok(ReceiptOutcome {
            order,
            movements: self.store.load_movements(&record.movement_ids).await?,
            discrepancies: self.store.load_discrepancies(&record.discrepancy_ids).await?,
            replayed: true,
        })
    }
}
