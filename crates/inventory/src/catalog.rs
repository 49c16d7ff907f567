//! Catalog reference data (read-only to the ledger).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ItemId, LocationId};

/// Catalog item as published by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    /// Unit of measure (e.g. "pcs", "kg").
    pub unit: String,
    pub min_stock: Option<Decimal>,
    pub max_stock: Option<Decimal>,
    pub default_price: Option<Decimal>,
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sku: None,
            barcode: None,
            unit: unit.into(),
            min_stock: None,
            max_stock: None,
            default_price: None,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    pub fn with_thresholds(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_stock = min;
        self.max_stock = max;
        self
    }
}

/// The subset of item data shown next to stock figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub unit: String,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            sku: item.sku.clone(),
            barcode: item.barcode.clone(),
            unit: item.unit.clone(),
        }
    }
}

/// Warehouse bin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
}

impl Location {
    pub fn new(id: LocationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
