use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    AggregateRoot, DomainError, DomainResult, ItemId, OrderItemId, PurchaseOrderId,
};
use stockledger_inventory::ensure_within_bounds;

/// Purchase order status lifecycle.
///
/// `Draft → Sent → Partial/Received → Closed`. Goods are received only once the
/// order has been sent and until it is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    Draft,
    Sent,
    Partial,
    Received,
    Closed,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "DRAFT",
            PurchaseOrderStatus::Sent => "SENT",
            PurchaseOrderStatus::Partial => "PARTIAL",
            PurchaseOrderStatus::Received => "RECEIVED",
            PurchaseOrderStatus::Closed => "CLOSED",
        }
    }
}

impl core::str::FromStr for PurchaseOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(PurchaseOrderStatus::Draft),
            "SENT" => Ok(PurchaseOrderStatus::Sent),
            "PARTIAL" => Ok(PurchaseOrderStatus::Partial),
            "RECEIVED" => Ok(PurchaseOrderStatus::Received),
            "CLOSED" => Ok(PurchaseOrderStatus::Closed),
            other => Err(DomainError::bad_request(format!(
                "unknown purchase order status '{other}'"
            ))),
        }
    }
}

/// Purchase order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: OrderItemId,
    pub item_id: ItemId,
    pub ordered_quantity: Decimal,
    /// Cumulative quantity received over all receipts.
    pub received_quantity: Decimal,
}

impl PurchaseOrderItem {
    /// Quantity still expected from the supplier (never negative).
    pub fn outstanding(&self) -> Decimal {
        (self.ordered_quantity - self.received_quantity).max(Decimal::ZERO)
    }

    /// Exactly the ordered quantity has arrived. Over-receipts do not count.
    pub fn is_fully_received(&self) -> bool {
        self.received_quantity == self.ordered_quantity
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub number: String,
    pub supplier: Option<String>,
    pub status: PurchaseOrderStatus,
    pub lines: Vec<PurchaseOrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Line of a `CreatePurchaseOrder` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub item_id: ItemId,
    pub quantity: Decimal,
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub number: String,
    pub supplier: Option<String>,
    pub lines: Vec<NewOrderLine>,
}

impl PurchaseOrder {
    pub fn create(
        cmd: CreatePurchaseOrder,
        id: PurchaseOrderId,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let number = cmd.number.trim().to_string();
        if number.is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot create purchase order without lines",
            ));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for line in cmd.lines {
            if line.quantity <= Decimal::ZERO {
                return Err(DomainError::bad_quantity("ordered quantity must be positive"));
            }
            ensure_within_bounds(line.quantity)?;
            lines.push(PurchaseOrderItem {
                id: OrderItemId::new(),
                item_id: line.item_id,
                ordered_quantity: line.quantity,
                received_quantity: Decimal::ZERO,
            });
        }

        Ok(Self {
            id,
            number,
            supplier: cmd.supplier,
            status: PurchaseOrderStatus::Draft,
            lines,
            created_at: at,
            updated_at: at,
            version: 1,
        })
    }

    pub fn line(&self, id: OrderItemId) -> Option<&PurchaseOrderItem> {
        self.lines.iter().find(|l| l.id == id)
    }

    pub fn is_closed(&self) -> bool {
        self.status == PurchaseOrderStatus::Closed
    }

    /// DRAFT → SENT.
    pub fn send(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::conflict(format!(
                "only draft purchase orders can be sent (status is {})",
                self.status.as_str()
            )));
        }
        self.transition(PurchaseOrderStatus::Sent, at);
        Ok(())
    }

    /// Any open state → CLOSED.
    pub fn close(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_open()?;
        self.transition(PurchaseOrderStatus::Closed, at);
        Ok(())
    }

    pub fn ensure_open(&self) -> DomainResult<()> {
        if self.is_closed() {
            return Err(DomainError::OrderAlreadyClosed);
        }
        Ok(())
    }

    /// SENT or PARTIAL/RECEIVED. A draft has not reached the supplier yet.
    pub fn ensure_receivable(&self) -> DomainResult<()> {
        self.ensure_open()?;
        if self.status == PurchaseOrderStatus::Draft {
            return Err(DomainError::conflict(
                "purchase order must be sent before goods are received",
            ));
        }
        Ok(())
    }

    /// RECEIVED when every line has received exactly its ordered quantity.
    pub fn receiving_status(&self) -> PurchaseOrderStatus {
        if self.lines.iter().all(PurchaseOrderItem::is_fully_received) {
            PurchaseOrderStatus::Received
        } else {
            PurchaseOrderStatus::Partial
        }
    }

    pub(crate) fn transition(&mut self, status: PurchaseOrderStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        self.version += 1;
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn create_cmd(quantities: &[i64]) -> CreatePurchaseOrder {
        CreatePurchaseOrder {
            number: "PO-1001".to_string(),
            supplier: Some("Acme Fasteners".to_string()),
            lines: quantities
                .iter()
                .map(|q| NewOrderLine {
                    item_id: ItemId::new(),
                    quantity: Decimal::from(*q),
                })
                .collect(),
        }
    }

    #[test]
    fn create_starts_in_draft_with_nothing_received() {
        let order =
            PurchaseOrder::create(create_cmd(&[10, 5]), PurchaseOrderId::new(), test_time())
                .unwrap();
        assert_eq!(order.status, PurchaseOrderStatus::Draft);
        assert_eq!(order.lines.len(), 2);
        assert!(order.lines.iter().all(|l| l.received_quantity.is_zero()));
        assert_eq!(order.version, 1);
    }

    #[test]
    fn create_requires_lines_with_positive_quantities() {
        let err = PurchaseOrder::create(create_cmd(&[]), PurchaseOrderId::new(), test_time())
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        let err = PurchaseOrder::create(create_cmd(&[3, 0]), PurchaseOrderId::new(), test_time())
            .unwrap_err();
        assert_eq!(err.code(), "BAD_QTY");

        let mut cmd = create_cmd(&[1]);
        cmd.lines[0].quantity = stockledger_inventory::MAX_QUANTITY + Decimal::ONE;
        let err = PurchaseOrder::create(cmd, PurchaseOrderId::new(), test_time()).unwrap_err();
        assert_eq!(err.code(), "BAD_QTY");
    }

    #[test]
    fn send_only_from_draft() {
        let mut order =
            PurchaseOrder::create(create_cmd(&[1]), PurchaseOrderId::new(), test_time()).unwrap();
        order.send(test_time()).unwrap();
        assert_eq!(order.status, PurchaseOrderStatus::Sent);
        assert_eq!(order.send(test_time()).unwrap_err().code(), "CONFLICT");
    }

    #[test]
    fn closing_twice_is_rejected() {
        let mut order =
            PurchaseOrder::create(create_cmd(&[1]), PurchaseOrderId::new(), test_time()).unwrap();
        order.close(test_time()).unwrap();
        assert_eq!(order.close(test_time()).unwrap_err(), DomainError::OrderAlreadyClosed);
    }
}
