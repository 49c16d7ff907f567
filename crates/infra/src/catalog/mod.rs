//! Catalog boundary.
//!
//! Items and locations are owned by catalog management; the ledger only reads
//! them to validate references and to label stock figures.

use std::sync::Arc;

use stockledger_core::{ItemId, LocationId};
use stockledger_inventory::{Item, Location};

use crate::store::StoreError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryCatalog;
pub use postgres::PostgresCatalog;

#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError>;

    /// All catalog items, by name.
    async fn items(&self) -> Result<Vec<Item>, StoreError>;
}

#[async_trait::async_trait]
impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).item(id).await
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        (**self).location(id).await
    }

    async fn items(&self) -> Result<Vec<Item>, StoreError> {
        (**self).items().await
    }
}
