//! Movement append pipeline.
//!
//! `StockLedger` runs the same steps for every append, in the manner of a
//! command dispatcher:
//!
//! 1. validate the request (kind, quantity, catalog references)
//! 2. short-circuit replays of a recorded operation id
//! 3. for guarded ISSUEs, rehydrate the bucket and check sufficiency
//! 4. commit with the bucket version the decision was made against
//!
//! A lost race (`StoreError::Concurrency`) re-runs steps 3-4 with fresh state,
//! up to `max_append_attempts`. A lost idempotency race re-reads and returns
//! the winning movement.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use stockledger_core::{ActorId, DomainError, ItemId, LocationId, MovementId};
use stockledger_inventory::{
    ensure_within_bounds, AppendMovement, BucketKey, IssuePolicy, MovementKind, OperationId,
    Reference, StockBucket, StockMovement,
};

use crate::catalog::Catalog;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStore, LedgerWrite, StoreError};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LedgerOptions {
    pub issue_policy: IssuePolicy,
    pub max_append_attempts: u32,
}

impl LedgerOptions {
    pub const DEFAULT_MAX_APPEND_ATTEMPTS: u32 = 100;
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            issue_policy: IssuePolicy::default(),
            max_append_attempts: Self::DEFAULT_MAX_APPEND_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub movement: StockMovement,
    /// `true` when the operation id was already recorded and nothing was written.
    pub replayed: bool,
}

/// Command: move stock between two locations (ISSUE + INCOME in one commit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub item_id: ItemId,
    pub from_location_id: LocationId,
    pub to_location_id: LocationId,
    pub quantity: Decimal,
    pub comment: Option<String>,
    pub author_id: Option<ActorId>,
    pub operation_id: Option<OperationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub issue: StockMovement,
    pub income: StockMovement,
    pub replayed: bool,
}

pub struct StockLedger<S, C> {
    store: S,
    catalog: C,
    options: LedgerOptions,
}

impl<S, C> StockLedger<S, C>
where
    S: LedgerStore,
    C: Catalog,
{
    pub fn new(store: S, catalog: C, options: LedgerOptions) -> Self {
        Self {
            store,
            catalog,
            options,
        }
    }

    #[instrument(
        skip(self, cmd),
        fields(item_id = %cmd.item_id, kind = %cmd.kind, location_id = ?cmd.location_id),
        err
    )]
    pub async fn append(&self, cmd: AppendMovement) -> LedgerResult<AppendOutcome> {
        cmd.validate()?;

        if let Some(movement) = self.replay(cmd.operation_id.as_ref()).await? {
            return Ok(AppendOutcome {
                movement,
                replayed: true,
            });
        }

        self.ensure_item(cmd.item_id).await?;
        for location in [cmd.location_id, cmd.from_location_id, cmd.to_location_id]
            .into_iter()
            .flatten()
        {
            self.ensure_location(location).await?;
        }

        let guarded = self.options.issue_policy.requires_check(&cmd)?;

        let mut last_conflict = String::new();
        for attempt in 1..=self.options.max_append_attempts {
            let mut write =
                LedgerWrite::movement(cmd.clone().stamp(MovementId::new(), Utc::now()));
            if guarded {
                let bucket = self.bucket(cmd.bucket()).await?;
                bucket.ensure_can_issue(cmd.quantity)?;
                write = write.expect(bucket.key(), bucket.expected_version());
            }

            match self.store.commit(write).await {
                Ok(committed) => {
                    let movement = committed.into_iter().next().ok_or_else(|| {
                        StoreError::Backend("commit returned no movement".to_string())
                    })?;
                    info!(
                        movement_id = %movement.id,
                        sequence = movement.sequence,
                        attempt,
                        "movement appended"
                    );
                    return Ok(AppendOutcome {
                        movement,
                        replayed: false,
                    });
                }
                Err(StoreError::Concurrency(msg)) => {
                    warn!(attempt, reason = %msg, "bucket moved on, retrying append");
                    last_conflict = msg;
                }
                Err(StoreError::DuplicateOperation(op)) => {
                    return self.winner_of(op).await.map(|movement| AppendOutcome {
                        movement,
                        replayed: true,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Contention {
            attempts: self.options.max_append_attempts,
            last: last_conflict,
        })
    }

    /// ISSUE at the source and INCOME at the destination, committed together.
    #[instrument(
        skip(self, cmd),
        fields(item_id = %cmd.item_id, from = %cmd.from_location_id, to = %cmd.to_location_id),
        err
    )]
    pub async fn transfer(&self, cmd: TransferStock) -> LedgerResult<TransferOutcome> {
        if cmd.from_location_id == cmd.to_location_id {
            return Err(DomainError::bad_request(
                "transfer source and destination must differ",
            )
            .into());
        }
        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::bad_quantity("transfer quantity must be positive").into());
        }
        ensure_within_bounds(cmd.quantity)?;

        let issue_op = cmd.operation_id.as_ref().map(|op| op.child("issue"));
        let income_op = cmd.operation_id.as_ref().map(|op| op.child("income"));
        if let (Some(issue), Some(income)) = (
            self.replay(issue_op.as_ref()).await?,
            self.replay(income_op.as_ref()).await?,
        ) {
            return Ok(TransferOutcome {
                issue,
                income,
                replayed: true,
            });
        }

        self.ensure_item(cmd.item_id).await?;
        self.ensure_location(cmd.from_location_id).await?;
        self.ensure_location(cmd.to_location_id).await?;

        let reference = Reference::transfer(Uuid::now_v7());
        let leg = |kind: MovementKind, at: LocationId, op: Option<OperationId>| {
            let mut m = AppendMovement::new(cmd.item_id, kind, cmd.quantity)
                .at(at)
                .with_reference(reference.clone())
                .with_author(cmd.author_id)
                .with_comment(cmd.comment.clone());
            m.from_location_id = Some(cmd.from_location_id);
            m.to_location_id = Some(cmd.to_location_id);
            m.operation_id = op;
            m
        };
        let issue = leg(MovementKind::Issue, cmd.from_location_id, issue_op);
        let income = leg(MovementKind::Income, cmd.to_location_id, income_op);

        let mut last_conflict = String::new();
        for attempt in 1..=self.options.max_append_attempts {
            let source = self.bucket(issue.bucket()).await?;
            source.ensure_can_issue(cmd.quantity)?;

            let now = Utc::now();
            let write = LedgerWrite {
                movements: vec![
                    issue.clone().stamp(MovementId::new(), now),
                    income.clone().stamp(MovementId::new(), now),
                ],
                ..LedgerWrite::default()
            }
            .expect(source.key(), source.expected_version());

            match self.store.commit(write).await {
                Ok(committed) => {
                    let mut legs = committed.into_iter();
                    let (Some(issue), Some(income)) = (legs.next(), legs.next()) else {
                        return Err(StoreError::Backend(
                            "transfer commit returned fewer than two movements".to_string(),
                        )
                        .into());
                    };
                    info!(issue_id = %issue.id, income_id = %income.id, attempt, "stock transferred");
                    return Ok(TransferOutcome {
                        issue,
                        income,
                        replayed: false,
                    });
                }
                Err(StoreError::Concurrency(msg)) => {
                    warn!(attempt, reason = %msg, "source bucket moved on, retrying transfer");
                    last_conflict = msg;
                }
                Err(StoreError::DuplicateOperation(_)) => {
                    if let (Some(issue), Some(income)) = (
                        self.replay(issue.operation_id.as_ref()).await?,
                        self.replay(income.operation_id.as_ref()).await?,
                    ) {
                        return Ok(TransferOutcome {
                            issue,
                            income,
                            replayed: true,
                        });
                    }
                    return Err(DomainError::conflict(
                        "transfer operation id is already used by another movement",
                    )
                    .into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Contention {
            attempts: self.options.max_append_attempts,
            last: last_conflict,
        })
    }

    async fn replay(
        &self,
        operation_id: Option<&OperationId>,
    ) -> LedgerResult<Option<StockMovement>> {
        let Some(op) = operation_id else {
            return Ok(None);
        };
        let existing = self.store.find_by_operation(op).await?;
        if existing.is_some() {
            info!(operation_id = %op, "replayed operation, nothing appended");
        }
        Ok(existing)
    }

    async fn winner_of(&self, op: OperationId) -> LedgerResult<StockMovement> {
        match self.store.find_by_operation(&op).await? {
            Some(movement) => {
                info!(operation_id = %op, "lost idempotency race, returning winner");
                Ok(movement)
            }
            None => Err(StoreError::DuplicateOperation(op).into()),
        }
    }

    /// Rehydrate a bucket, refusing histories a correct store cannot produce.
    async fn bucket(&self, key: BucketKey) -> LedgerResult<StockBucket> {
        let history = self.store.load_bucket(key).await?;

        let mut last = 0u64;
        for (idx, m) in history.iter().enumerate() {
            if m.bucket() != key {
                return Err(StoreError::Corrupt(format!(
                    "bucket history contains a foreign movement at index {idx}"
                ))
                .into());
            }
            if m.sequence <= last {
                return Err(StoreError::Corrupt(format!(
                    "bucket sequence not increasing at index {idx} ({} after {last})",
                    m.sequence
                ))
                .into());
            }
            last = m.sequence;
        }

        Ok(StockBucket::rehydrate(key, &history))
    }

    async fn ensure_item(&self, id: ItemId) -> LedgerResult<()> {
        match self.catalog.item(id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::validation(format!("unknown item {id}")).into()),
        }
    }

    async fn ensure_location(&self, id: LocationId) -> LedgerResult<()> {
        match self.catalog.location(id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::validation(format!("unknown location {id}")).into()),
        }
    }
}
