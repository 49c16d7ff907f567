//! Purchase order lifecycle service (create, send, close, get).

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use stockledger_core::{DomainError, DomainResult, ExpectedVersion, PurchaseOrderId};
use stockledger_purchasing::{CreatePurchaseOrder, PurchaseOrder};

use crate::catalog::Catalog;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, StoreError};

pub struct PurchaseOrders<S, C> {
    store: S,
    catalog: C,
    max_attempts: u32,
}

impl<S, C> PurchaseOrders<S, C>
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

    #[instrument(skip(self, cmd), fields(number = %cmd.number, lines = cmd.lines.len()), err)]
    pub async fn create(&self, cmd: CreatePurchaseOrder) -> LedgerResult<PurchaseOrder> {
        for line in &cmd.lines {
            if self.catalog.item(line.item_id).await?.is_none() {
                return Err(DomainError::validation(format!("unknown item {}", line.item_id)).into());
            }
        }

        let order = PurchaseOrder::create(cmd, PurchaseOrderId::new(), Utc::now())?;
        self.store.insert_order(&order).await?;
        info!(order_id = %order.id, "purchase order created");
        Ok(order)
    }

    pub async fn get(&self, id: PurchaseOrderId) -> LedgerResult<PurchaseOrder> {
        self.store
            .load_order(id)
            .await?
            .ok_or_else(|| DomainError::OrderNotFound.into())
    }

    #[instrument(skip(self), err)]
    pub async fn send(&self, id: PurchaseOrderId) -> LedgerResult<PurchaseOrder> {
        self.transition(id, "sent", PurchaseOrder::send).await
    }

    #[instrument(skip(self), err)]
    pub async fn close(&self, id: PurchaseOrderId) -> LedgerResult<PurchaseOrder> {
        self.transition(id, "closed", PurchaseOrder::close).await
    }

    async fn transition(
        &self,
        id: PurchaseOrderId,
        label: &'static str,
        apply: fn(&mut PurchaseOrder, DateTime<Utc>) -> DomainResult<()>,
    ) -> LedgerResult<PurchaseOrder> {
        let mut last_conflict = String::new();
        for attempt in 1..=self.max_attempts {
            let mut order = self.get(id).await?;
            let expected = ExpectedVersion::Exact(order.version);
            apply(&mut order, Utc::now())?;

            match self.store.save_order(&order, expected).await {
                Ok(()) => {
                    info!(order_id = %id, status = order.status.as_str(), "purchase order {label}");
                    return Ok(order);
                }
                Err(StoreError::Concurrency(msg)) => {
                    warn!(attempt, reason = %msg, "purchase order changed, retrying");
                    last_conflict = msg;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Contention {
            attempts: self.max_attempts,
            last: last_conflict,
        })
    }
}
