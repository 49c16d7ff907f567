use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use stockledger_core::{ItemId, LocationId};
use stockledger_inventory::{Item, Location};

use super::Catalog;
use crate::store::StoreError;

/// Postgres catalog over the `items` and `locations` tables.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    pub async fn upsert_item(&self, item: &Item) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO items (id, name, sku, barcode, unit, min_stock, max_stock, default_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                sku = EXCLUDED.sku,
                barcode = EXCLUDED.barcode,
                unit = EXCLUDED.unit,
                min_stock = EXCLUDED.min_stock,
                max_stock = EXCLUDED.max_stock,
                default_price = EXCLUDED.default_price
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.sku)
        .bind(&item.barcode)
        .bind(&item.unit)
        .bind(item.min_stock)
        .bind(item.max_stock)
        .bind(item.default_price)
        .execute(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("upsert_item: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self, location), fields(location_id = %location.id), err)]
    pub async fn upsert_location(&self, location: &Location) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO locations (id, name) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(location.id.as_uuid())
        .bind(&location.name)
        .execute(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("upsert_location: {e}")))?;
        Ok(())
    }
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    let read = |e: sqlx::Error| StoreError::Corrupt(format!("failed to read item row: {e}"));
    Ok(Item {
        id: ItemId::from_uuid(row.try_get("id").map_err(read)?),
        name: row.try_get("name").map_err(read)?,
        sku: row.try_get("sku").map_err(read)?,
        barcode: row.try_get("barcode").map_err(read)?,
        unit: row.try_get("unit").map_err(read)?,
        min_stock: row.try_get("min_stock").map_err(read)?,
        max_stock: row.try_get("max_stock").map_err(read)?,
        default_price: row.try_get("default_price").map_err(read)?,
    })
}

#[async_trait::async_trait]
impl Catalog for PostgresCatalog {
    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, sku, barcode, unit, min_stock, max_stock, default_price
            FROM items
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("load_item: {e}")))?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM locations WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("load_location: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let name: String = row
            .try_get("name")
            .map_err(|e| StoreError::Corrupt(format!("failed to read location row: {e}")))?;
        Ok(Some(Location::new(id, name)))
    }

    async fn items(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, sku, barcode, unit, min_stock, max_stock, default_price
            FROM items
            ORDER BY name ASC, id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("list_items: {e}")))?;

        rows.iter().map(item_from_row).collect()
    }
}
