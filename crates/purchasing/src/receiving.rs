//! Goods receiving against a purchase order.
//!
//! `PurchaseOrder::plan_receipt` validates a whole receipt batch before anything
//! is produced, then describes every side effect (INCOME movements,
//! discrepancies, the updated order) as a single `ReceiptPlan`. Nothing here is
//! committed; the caller persists the plan in one transaction.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorId, DomainError, DomainResult, LocationId, OrderItemId};
use stockledger_inventory::{
    ensure_within_bounds, AppendMovement, MovementKind, OpenDiscrepancy, OperationId, Reference,
    MAX_QUANTITY,
};

use crate::order::{PurchaseOrder, PurchaseOrderStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveLine {
    pub order_item_id: OrderItemId,
    pub received_quantity: Decimal,
}

/// Command: ReceiveGoods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub lines: Vec<ReceiveLine>,
    pub location_id: Option<LocationId>,
    /// Batch idempotency key; line movements use `{operation_id}:{order_item_id}`.
    pub operation_id: Option<OperationId>,
    pub received_by: Option<ActorId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptPlan {
    pub movements: Vec<AppendMovement>,
    pub discrepancies: Vec<OpenDiscrepancy>,
    pub status: PurchaseOrderStatus,
    /// The order as it reads after the receipt (status, received quantities, version).
    pub order: PurchaseOrder,
}

impl PurchaseOrder {
    pub fn plan_receipt(&self, cmd: &ReceiveGoods, at: DateTime<Utc>) -> DomainResult<ReceiptPlan> {
        self.ensure_receivable()?;
        self.ensure_receipt_lines(&cmd.lines)?;

        let reference = Reference::purchase_order(self.id);
        let mut order = self.clone();
        let mut movements = Vec::new();
        let mut discrepancies = Vec::new();

        for line in &cmd.lines {
            let Some(order_line) = order.lines.iter_mut().find(|l| l.id == line.order_item_id)
            else {
                continue;
            };

            let expected = order_line.outstanding();
            let received = line.received_quantity;

            if received > Decimal::ZERO {
                let mut movement =
                    AppendMovement::new(order_line.item_id, MovementKind::Income, received)
                        .with_reference(reference.clone())
                        .with_author(cmd.received_by)
                        .with_comment(Some(format!("received against purchase order {}", self.number)));
                movement.location_id = cmd.location_id;
                if let Some(op) = &cmd.operation_id {
                    movement = movement.with_operation_id(op.child(line.order_item_id));
                }
                movements.push(movement);
            }

            if received != expected {
                discrepancies.push(OpenDiscrepancy {
                    location_id: cmd.location_id,
                    item_id: order_line.item_id,
                    expected_qty: expected,
                    counted_qty: received,
                    session_id: None,
                    reference: Some(reference.clone()),
                    created_by: cmd.received_by,
                });
            }

            order_line.received_quantity = order_line
                .received_quantity
                .checked_add(received)
                .ok_or_else(|| {
                    DomainError::invalid_line(format!(
                        "cumulative received quantity for order item {} is out of range",
                        line.order_item_id
                    ))
                })?;
        }

        let status = order.receiving_status();
        order.transition(status, at);

        Ok(ReceiptPlan {
            movements,
            discrepancies,
            status,
            order,
        })
    }

    fn ensure_receipt_lines(&self, lines: &[ReceiveLine]) -> DomainResult<()> {
        if lines.is_empty() {
            return Err(DomainError::invalid_line("receipt has no lines"));
        }

        let mut seen = HashSet::with_capacity(lines.len());
        for line in lines {
            if !seen.insert(line.order_item_id) {
                return Err(DomainError::invalid_line(format!(
                    "order item {} appears more than once in the receipt",
                    line.order_item_id
                )));
            }
            if self.line(line.order_item_id).is_none() {
                return Err(DomainError::invalid_line(format!(
                    "order item {} does not belong to purchase order {}",
                    line.order_item_id, self.id
                )));
            }
            if line.received_quantity < Decimal::ZERO {
                return Err(DomainError::invalid_line(format!(
                    "received quantity for order item {} cannot be negative",
                    line.order_item_id
                )));
            }
            if ensure_within_bounds(line.received_quantity).is_err() {
                return Err(DomainError::invalid_line(format!(
                    "received quantity for order item {} exceeds {MAX_QUANTITY}",
                    line.order_item_id
                )));
            }
        }
        Ok(())
    }
}
