//! Stock discrepancy tracker.
//!
//! Discrepancies are findings, not corrections: opening or closing one never
//! writes a movement.

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use stockledger_core::{ActorId, DiscrepancyId, DomainError, ExpectedVersion, ItemId, LocationId};
use stockledger_inventory::{
    ensure_within_bounds, fold_quantity, DiscrepancyStatus, OpenDiscrepancy, StockDiscrepancy,
};

use crate::catalog::Catalog;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerWrite, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLine {
    pub item_id: ItemId,
    pub counted_qty: Decimal,
}

/// Command: record a physical count at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCount {
    pub location_id: LocationId,
    pub session_id: Option<String>,
    pub lines: Vec<CountLine>,
    pub counted_by: Option<ActorId>,
}

pub struct DiscrepancyTracker<S, C> {
    store: S,
    catalog: C,
    max_attempts: u32,
}

impl<S, C> DiscrepancyTracker<S, C>
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

    #[instrument(skip(self, cmd), fields(item_id = %cmd.item_id), err)]
    pub async fn open(&self, cmd: OpenDiscrepancy) -> LedgerResult<StockDiscrepancy> {
        if self.catalog.item(cmd.item_id).await?.is_none() {
            return Err(DomainError::validation(format!("unknown item {}", cmd.item_id)).into());
        }
        if let Some(location) = cmd.location_id {
            if self.catalog.location(location).await?.is_none() {
                return Err(DomainError::validation(format!("unknown location {location}")).into());
            }
        }

        let discrepancy = StockDiscrepancy::open(cmd, DiscrepancyId::new(), Utc::now())?;
        self.store
            .commit(LedgerWrite {
                discrepancies: vec![discrepancy.clone()],
                ..LedgerWrite::default()
            })
            .await?;

        info!(discrepancy_id = %discrepancy.id, delta = %discrepancy.delta, "discrepancy opened");
        Ok(discrepancy)
    }

    /// OPEN → CLOSED. A concurrent close that wins makes this one fail with
    /// `ALREADY_CLOSED` on the re-read.
    #[instrument(skip(self, note), err)]
    pub async fn close(
        &self,
        id: DiscrepancyId,
        note: Option<String>,
        actor: Option<ActorId>,
    ) -> LedgerResult<StockDiscrepancy> {
        let mut last_conflict = String::new();
        for attempt in 1..=self.max_attempts {
            let mut discrepancy = self.get(id).await?;
            let expected = ExpectedVersion::Exact(discrepancy.version);
            discrepancy.close(note.clone(), actor, Utc::now())?;

            match self.store.save_discrepancy(&discrepancy, expected).await {
                Ok(()) => {
                    info!(discrepancy_id = %id, "discrepancy closed");
                    return Ok(discrepancy);
                }
                Err(StoreError::Concurrency(msg)) => {
                    warn!(attempt, reason = %msg, "discrepancy changed, retrying close");
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

    pub async fn get(&self, id: DiscrepancyId) -> LedgerResult<StockDiscrepancy> {
        self.store
            .load_discrepancy(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("discrepancy {id}")).into())
    }

    pub async fn list(
        &self,
        status: Option<DiscrepancyStatus>,
    ) -> LedgerResult<Vec<StockDiscrepancy>> {
        Ok(self.store.list_discrepancies(status).await?)
    }

    /// Compare counted quantities with the ledger and open a discrepancy for
    /// every line that differs. All discrepancies are committed together.
    #[instrument(skip(self, cmd), fields(location_id = %cmd.location_id, lines = cmd.lines.len()), err)]
    pub async fn record_count(&self, cmd: RecordCount) -> LedgerResult<Vec<StockDiscrepancy>> {
        if cmd.lines.is_empty() {
            return Err(DomainError::bad_request("count has no lines").into());
        }
        if self.catalog.location(cmd.location_id).await?.is_none() {
            return Err(
                DomainError::validation(format!("unknown location {}", cmd.location_id)).into(),
            );
        }

        let mut seen = HashSet::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            if !seen.insert(line.item_id) {
                return Err(DomainError::bad_request(format!(
                    "item {} counted more than once",
                    line.item_id
                ))
                .into());
            }
            if line.counted_qty < Decimal::ZERO {
                return Err(DomainError::bad_quantity("counted quantity cannot be negative").into());
            }
            ensure_within_bounds(line.counted_qty)?;
            if self.catalog.item(line.item_id).await?.is_none() {
                return Err(DomainError::validation(format!("unknown item {}", line.item_id)).into());
            }
        }

        let now = Utc::now();
        let mut opened = Vec::new();
        for line in cmd.lines {
            let movements = self
                .store
                .item_movements(line.item_id, Some(cmd.location_id))
                .await?;
            let expected = fold_quantity(&movements);
            if expected == line.counted_qty {
                continue;
            }

            opened.push(StockDiscrepancy::open(
                OpenDiscrepancy {
                    location_id: Some(cmd.location_id),
                    item_id: line.item_id,
                    expected_qty: expected,
                    counted_qty: line.counted_qty,
                    session_id: cmd.session_id.clone(),
                    reference: None,
                    created_by: cmd.counted_by,
                },
                DiscrepancyId::new(),
                now,
            )?);
        }

        if !opened.is_empty() {
            self.store
                .commit(LedgerWrite {
                    discrepancies: opened.clone(),
                    ..LedgerWrite::default()
                })
                .await?;
        }

        info!(opened = opened.len(), "count recorded");
        Ok(opened)
    }
}
