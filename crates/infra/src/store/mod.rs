//! Ledger storage boundary.
//!
//! `LedgerStore` is the only place movements are written. Implementations make
//! each `commit()` atomic and enforce bucket versions and idempotency keys
//! inside it; services above never hold locks of their own.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::{MovementFilter, MovementPage, Pagination};
pub use r#trait::{LedgerStore, LedgerWrite, ReceiptRecord, StoreError};
