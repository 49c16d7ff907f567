//! Read path: quantities are folded from movement history on every request.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{instrument, warn};

use stockledger_core::{DomainError, ItemId, LocationId};
use stockledger_inventory::{fold_quantity, stock_by_item, ItemSummary, StockAlert};

use crate::catalog::Catalog;
use crate::error::LedgerResult;
use crate::store::LedgerStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationStockLine {
    pub item: ItemSummary,
    pub qty: Decimal,
}

pub struct QuantityResolver<S, C> {
    store: S,
    catalog: C,
}

impl<S, C> QuantityResolver<S, C>
where
    S: LedgerStore,
    C: Catalog,
{
    pub fn new(store: S, catalog: C) -> Self {
        Self { store, catalog }
    }

    /// Current quantity of an item, at one location or across all of them
    /// (movements without a location included).
    #[instrument(skip(self), err)]
    pub async fn quantity(
        &self,
        item_id: ItemId,
        location_id: Option<LocationId>,
    ) -> LedgerResult<Decimal> {
        if self.catalog.item(item_id).await?.is_none() {
            return Err(DomainError::not_found(format!("item {item_id}")).into());
        }
        if let Some(location) = location_id {
            if self.catalog.location(location).await?.is_none() {
                return Err(DomainError::not_found(format!("location {location}")).into());
            }
        }

        let movements = self.store.item_movements(item_id, location_id).await?;
        Ok(fold_quantity(&movements))
    }

    /// Per-item stock at a location, sorted by item name.
    #[instrument(skip(self), err)]
    pub async fn location_stock(
        &self,
        location_id: LocationId,
    ) -> LedgerResult<Vec<LocationStockLine>> {
        if self.catalog.location(location_id).await?.is_none() {
            return Err(DomainError::not_found(format!("location {location_id}")).into());
        }

        let movements = self.store.location_movements(location_id).await?;
        let mut lines = Vec::new();
        for (item_id, qty) in stock_by_item(&movements, location_id) {
            match self.catalog.item(item_id).await? {
                Some(item) => lines.push(LocationStockLine {
                    item: ItemSummary::from(&item),
                    qty,
                }),
                None => warn!(%item_id, "stocked item missing from catalog, omitted"),
            }
        }

        lines.sort_by(|a, b| {
            a.item
                .name
                .cmp(&b.item.name)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        Ok(lines)
    }

    /// Items whose total quantity is below their minimum or above their maximum.
    #[instrument(skip(self), err)]
    pub async fn alerts(&self) -> LedgerResult<Vec<StockAlert>> {
        let mut alerts = Vec::new();
        for item in self.catalog.items().await? {
            if item.min_stock.is_none() && item.max_stock.is_none() {
                continue;
            }
            let movements = self.store.item_movements(item.id, None).await?;
            if let Some(alert) = StockAlert::evaluate(&item, fold_quantity(&movements)) {
                alerts.push(alert);
            }
        }
        Ok(alerts)
    }
}
