use std::collections::HashMap;
use std::sync::RwLock;

use stockledger_core::{ItemId, LocationId};
use stockledger_inventory::{Item, Location};

use super::Catalog;
use crate::store::StoreError;

#[derive(Debug, Default)]
struct CatalogState {
    items: HashMap<ItemId, Item>,
    locations: HashMap<LocationId, Location>,
}

/// In-memory catalog, seeded by tests and the dev server.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&self, item: Item) -> Result<(), StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?
            .items
            .insert(item.id, item);
        Ok(())
    }

    pub fn insert_location(&self, location: Location) -> Result<(), StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?
            .locations
            .insert(location.id, location);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Catalog for InMemoryCatalog {
    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(state.items.get(&id).cloned())
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(state.locations.get(&id).cloned())
    }

    async fn items(&self) -> Result<Vec<Item>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let mut items: Vec<Item> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }
}
