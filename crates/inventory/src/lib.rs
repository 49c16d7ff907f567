//! Inventory stock ledger domain module.
//!
//! This crate contains business rules for stock movements, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage):
//!
//! - `movement`: the closed set of movement kinds and append validation
//! - `resolver`: folding movement history into quantities
//! - `guard`: the issue guard and per-bucket concurrency version
//! - `discrepancy`: count/receiving variance lifecycle
//! - `alert`: min/max threshold evaluation against resolved stock

pub mod alert;
pub mod catalog;
pub mod discrepancy;
pub mod guard;
pub mod movement;
pub mod quantity;
pub mod resolver;

pub use alert::{AlertKind, StockAlert};
pub use catalog::{Item, ItemSummary, Location};
pub use discrepancy::{DiscrepancyStatus, OpenDiscrepancy, StockDiscrepancy};
pub use guard::{IssuePolicy, StockBucket};
pub use movement::{
    AppendMovement, BucketKey, MovementKind, OperationId, Reference, StockMovement,
    UncommittedMovement,
};
pub use quantity::{ensure_within_bounds, parse_quantity, round_for_display, MAX_QUANTITY};
pub use resolver::{fold_quantity, resolve, stock_by_item};
