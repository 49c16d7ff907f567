//! Purchasing domain module (purchase orders and goods receiving).
//!
//! This crate contains business rules for purchase orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Receiving produces a
//! `ReceiptPlan` that the infrastructure layer commits atomically together with
//! the ledger movements and discrepancies it describes.

pub mod order;
pub mod receiving;

pub use order::{
    CreatePurchaseOrder, NewOrderLine, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus,
};
pub use receiving::{ReceiptPlan, ReceiveGoods, ReceiveLine};
