//! Infrastructure layer: storage boundary, catalog access and the services
//! that compose the pure domain crates behind them.
//!
//! Services are generic over `LedgerStore` and `Catalog`, so the same code runs
//! against the in-memory implementations (tests/dev) and Postgres.

pub mod catalog;
pub mod discrepancies;
pub mod error;
pub mod ledger;
pub mod orders;
pub mod receiving;
pub mod resolver;
pub mod store;

pub use catalog::{Catalog, InMemoryCatalog, PostgresCatalog};
pub use discrepancies::{CountLine, DiscrepancyTracker, RecordCount};
pub use error::{ErrorClass, LedgerError, LedgerResult};
pub use ledger::{AppendOutcome, LedgerOptions, StockLedger, TransferOutcome, TransferStock};
pub use orders::PurchaseOrders;
pub use receiving::{ReceiptOutcome, ReceivingCoordinator};
pub use resolver::{LocationStockLine, QuantityResolver};
pub use store::{
    InMemoryLedgerStore, LedgerStore, LedgerWrite, MovementFilter, MovementPage, Pagination,
    PostgresLedgerStore, ReceiptRecord, StoreError,
};

#[cfg(test)]
mod integration_tests;
