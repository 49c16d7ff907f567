//! `stockledger-core` — shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error taxonomy and optimistic
//! concurrency expectations.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{
    ActorId, DiscrepancyId, ItemId, LocationId, MovementId, OrderItemId, PurchaseOrderId,
};
