//! Min/max threshold alerts over resolved stock.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::ItemId;

use crate::catalog::Item;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    BelowMin,
    AboveMax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub item_id: ItemId,
    pub kind: AlertKind,
    pub quantity: Decimal,
    pub threshold: Decimal,
}

impl StockAlert {
    /// Compare an item's total quantity with its catalog thresholds.
    pub fn evaluate(item: &Item, quantity: Decimal) -> Option<Self> {
        if let Some(min) = item.min_stock {
            if quantity < min {
                return Some(Self {
                    item_id: item.id,
                    kind: AlertKind::BelowMin,
                    quantity,
                    threshold: min,
                });
            }
        }
        if let Some(max) = item.max_stock {
            if quantity > max {
                return Some(Self {
                    item_id: item.id,
                    kind: AlertKind::AboveMax,
                    quantity,
                    threshold: max,
                });
            }
        }
        None
    }
}
