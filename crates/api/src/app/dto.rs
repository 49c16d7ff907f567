use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use stockledger_core::{ActorId, DomainError, DomainResult, OrderItemId};
use stockledger_infra::{LocationStockLine, MovementFilter, MovementPage, TransferStock};
use stockledger_inventory::{
    parse_quantity, round_for_display, AppendMovement, MovementKind, OpenDiscrepancy, OperationId,
    Reference, StockAlert, StockDiscrepancy, StockMovement,
};
use stockledger_purchasing::{
    CreatePurchaseOrder, NewOrderLine, PurchaseOrder, ReceiveGoods, ReceiveLine,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMovementRequest {
    pub item_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub quantity: Value,
    pub location_id: Option<String>,
    pub from_location_id: Option<String>,
    pub to_location_id: Option<String>,
    pub comment: Option<String>,
    pub reference: Option<Reference>,
    pub operation_id: Option<String>,
}

impl AppendMovementRequest {
    pub fn into_command(self, author: ActorId) -> DomainResult<AppendMovement> {
        let mut cmd = AppendMovement::new(
            self.item_id.parse()?,
            self.kind.parse::<MovementKind>()?,
            quantity(&self.quantity)?,
        );
        cmd.location_id = parse_opt(self.location_id.as_deref())?;
        cmd.from_location_id = parse_opt(self.from_location_id.as_deref())?;
        cmd.to_location_id = parse_opt(self.to_location_id.as_deref())?;
        cmd.comment = self.comment;
        cmd.reference = self.reference;
        cmd.author_id = Some(author);
        cmd.operation_id = operation_id(self.operation_id)?;
        Ok(cmd)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub item_id: String,
    pub from_location_id: String,
    pub to_location_id: String,
    #[serde(default)]
    pub quantity: Value,
    pub comment: Option<String>,
    pub operation_id: Option<String>,
}

impl TransferRequest {
    pub fn into_command(self, author: ActorId) -> DomainResult<TransferStock> {
        Ok(TransferStock {
            item_id: self.item_id.parse()?,
            from_location_id: self.from_location_id.parse()?,
            to_location_id: self.to_location_id.parse()?,
            quantity: quantity(&self.quantity)?,
            comment: self.comment,
            author_id: Some(author),
            operation_id: operation_id(self.operation_id)?,
        })
    }
}

/// `GET /movements` query string.
#[derive(Debug, Default, Deserialize)]
pub struct MovementQuery {
    pub item_id: Option<String>,
    pub location_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl MovementQuery {
    pub fn filter(&self) -> DomainResult<MovementFilter> {
        Ok(MovementFilter {
            item_id: parse_opt(self.item_id.as_deref())?,
            location_id: parse_opt(self.location_id.as_deref())?,
            kind: parse_opt(self.kind.as_deref())?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub location_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountLineRequest {
    pub item_id: String,
    #[serde(default)]
    pub counted_qty: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCountRequest {
    pub session_id: Option<String>,
    pub lines: Vec<CountLineRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub item_id: String,
    #[serde(default)]
    pub quantity: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseOrderRequest {
    pub number: String,
    pub supplier: Option<String>,
    pub lines: Vec<OrderLineRequest>,
}

impl CreatePurchaseOrderRequest {
    pub fn into_command(self) -> DomainResult<CreatePurchaseOrder> {
        let lines = self
            .lines
            .iter()
            .map(|l| {
                Ok(NewOrderLine {
                    item_id: l.item_id.parse()?,
                    quantity: quantity(&l.quantity)?,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(CreatePurchaseOrder {
            number: self.number,
            supplier: self.supplier,
            lines,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveLineRequest {
    pub order_item_id: String,
    #[serde(default)]
    pub received_quantity: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveGoodsRequest {
    pub location_id: Option<String>,
    pub operation_id: Option<String>,
    pub lines: Vec<ReceiveLineRequest>,
}

impl ReceiveGoodsRequest {
    pub fn into_command(self, received_by: ActorId) -> DomainResult<ReceiveGoods> {
        let lines = self
            .lines
            .iter()
            .map(|l| {
                let order_item_id = l
                    .order_item_id
                    .parse::<OrderItemId>()
                    .map_err(|e| DomainError::invalid_line(e.to_string()))?;
                let received_quantity = quantity(&l.received_quantity)
                    .map_err(|e| DomainError::invalid_line(e.to_string()))?;
                Ok(ReceiveLine {
                    order_item_id,
                    received_quantity,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(ReceiveGoods {
            lines,
            location_id: parse_opt(self.location_id.as_deref())?,
            operation_id: operation_id(self.operation_id)?,
            received_by: Some(received_by),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDiscrepancyRequest {
    pub item_id: String,
    pub location_id: Option<String>,
    #[serde(default)]
    pub expected_qty: Value,
    #[serde(default)]
    pub counted_qty: Value,
    pub session_id: Option<String>,
    pub reference: Option<Reference>,
}

impl OpenDiscrepancyRequest {
    pub fn into_command(self, created_by: ActorId) -> DomainResult<OpenDiscrepancy> {
        Ok(OpenDiscrepancy {
            location_id: parse_opt(self.location_id.as_deref())?,
            item_id: self.item_id.parse()?,
            expected_qty: quantity(&self.expected_qty)?,
            counted_qty: quantity(&self.counted_qty)?,
            session_id: self.session_id,
            reference: self.reference,
            created_by: Some(created_by),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseDiscrepancyRequest {
    pub close_note: Option<String>,
}

// -------------------------
// Parsing helpers
// -------------------------

/// A quantity may arrive as a JSON number or a numeric string.
pub fn quantity(value: &Value) -> DomainResult<Decimal> {
    match value {
        Value::Number(n) => parse_quantity(&n.to_string()),
        Value::String(s) => parse_quantity(s),
        Value::Null => Err(DomainError::bad_quantity("quantity is required")),
        other => Err(DomainError::bad_quantity(format!("'{other}' is not a number"))),
    }
}

fn parse_opt<T>(raw: Option<&str>) -> DomainResult<Option<T>>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .transpose()
}

fn operation_id(raw: Option<String>) -> DomainResult<Option<OperationId>> {
    raw.map(OperationId::new).transpose()
}

// -------------------------
// JSON mapping helpers
// -------------------------

fn qty(value: Decimal, scale: u32) -> Value {
    Value::String(round_for_display(value, scale).to_string())
}

pub fn movement_to_json(m: &StockMovement, scale: u32) -> Value {
    serde_json::json!({
        "id": m.id.to_string(),
        "operation_id": m.operation_id.as_ref().map(|op| op.as_str()),
        "type": m.kind.as_str(),
        "item_id": m.item_id.to_string(),
        "quantity": qty(m.quantity, scale),
        "location_id": m.location_id.map(|l| l.to_string()),
        "from_location_id": m.from_location_id.map(|l| l.to_string()),
        "to_location_id": m.to_location_id.map(|l| l.to_string()),
        "comment": m.comment,
        "reference": m.reference,
        "author_id": m.author_id.map(|a| a.to_string()),
        "created_at": m.created_at.to_rfc3339(),
    })
}

pub fn movement_page_to_json(page: &MovementPage, scale: u32) -> Value {
    serde_json::json!({
        "movements": page.movements.iter().map(|m| movement_to_json(m, scale)).collect::<Vec<_>>(),
        "total": page.total,
        "limit": page.pagination.limit,
        "offset": page.pagination.offset,
        "has_more": page.has_more,
    })
}

pub fn location_stock_to_json(lines: &[LocationStockLine], scale: u32) -> Value {
    Value::Array(
        lines
            .iter()
            .map(|l| {
                serde_json::json!({
                    "item": {
                        "id": l.item.id.to_string(),
                        "name": l.item.name,
                        "sku": l.item.sku,
                        "barcode": l.item.barcode,
                        "unit": l.item.unit,
                    },
                    "qty": qty(l.qty, scale),
                })
            })
            .collect(),
    )
}

pub fn alert_to_json(a: &StockAlert, scale: u32) -> Value {
    serde_json::json!({
        "item_id": a.item_id.to_string(),
        "kind": a.kind,
        "quantity": qty(a.quantity, scale),
        "threshold": qty(a.threshold, scale),
    })
}

pub fn discrepancy_to_json(d: &StockDiscrepancy, scale: u32) -> Value {
    serde_json::json!({
        "id": d.id.to_string(),
        "item_id": d.item_id.to_string(),
        "location_id": d.location_id.map(|l| l.to_string()),
        "expected_qty": qty(d.expected_qty, scale),
        "counted_qty": qty(d.counted_qty, scale),
        "delta": qty(d.delta, scale),
        "session_id": d.session_id,
        "reference": d.reference,
        "status": d.status.as_str(),
        "close_note": d.close_note,
        "created_by": d.created_by.map(|a| a.to_string()),
        "created_at": d.created_at.to_rfc3339(),
        "closed_by": d.closed_by.map(|a| a.to_string()),
        "closed_at": d.closed_at.map(|t| t.to_rfc3339()),
    })
}

pub fn purchase_order_to_json(o: &PurchaseOrder, scale: u32) -> Value {
    serde_json::json!({
        "id": o.id.to_string(),
        "number": o.number,
        "supplier": o.supplier,
        "status": o.status.as_str(),
        "lines": o.lines.iter().map(|l| serde_json::json!({
            "id": l.id.to_string(),
            "item_id": l.item_id.to_string(),
            "ordered_quantity": qty(l.ordered_quantity, scale),
            "received_quantity": qty(l.received_quantity, scale),
        })).collect::<Vec<_>>(),
        "created_at": o.created_at.to_rfc3339(),
        "updated_at": o.updated_at.to_rfc3339(),
        "version": o.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantity_accepts_numbers_and_numeric_strings() {
        assert_eq!(quantity(&json!(12)).unwrap(), Decimal::from(12));
        assert_eq!(quantity(&json!(2.5)).unwrap(), Decimal::new(25, 1));
        assert_eq!(quantity(&json!("0.125")).unwrap(), Decimal::new(125, 3));
    }

    #[test]
    fn quantity_rejects_everything_else_as_bad_qty() {
        for value in [json!(null), json!("abc"), json!("NaN"), json!(true), json!([1])] {
            assert_eq!(quantity(&value).unwrap_err().code(), "BAD_QTY", "{value}");
        }
    }

    #[test]
    fn append_request_maps_to_command() {
        let item = stockledger_core::ItemId::new();
        let location = stockledger_core::LocationId::new();
        let actor = ActorId::new();
        let req: AppendMovementRequest = serde_json::from_value(json!({
            "itemId": item.to_string(),
            "type": "issue",
            "quantity": "3",
            "locationId": location.to_string(),
            "operationId": "pick-17",
        }))
        .unwrap();

        let cmd = req.into_command(actor).unwrap();
        assert_eq!(cmd.kind, MovementKind::Issue);
        assert_eq!(cmd.location_id, Some(location));
        assert_eq!(cmd.author_id, Some(actor));
        assert_eq!(cmd.operation_id.unwrap().as_str(), "pick-17");
    }

    #[test]
    fn unknown_movement_type_is_bad_request() {
        let req: AppendMovementRequest = serde_json::from_value(json!({
            "itemId": stockledger_core::ItemId::new().to_string(),
            "type": "TRANSFER",
            "quantity": 1,
        }))
        .unwrap();
        assert_eq!(req.into_command(ActorId::new()).unwrap_err().code(), "BAD_REQUEST");
    }

    #[test]
    fn display_rounding_keeps_storage_precision_out_of_responses() {
        assert_eq!(qty(Decimal::new(12_3456, 4), 3), json!("12.346"));
        assert_eq!(qty(Decimal::from(5), 3), json!("5"));
    }
}
