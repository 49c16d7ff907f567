//! Service wiring: picks the store/catalog implementations and builds the
//! ledger services on top of them.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use stockledger_infra::{
    Catalog, DiscrepancyTracker, InMemoryCatalog, InMemoryLedgerStore, LedgerOptions, LedgerStore,
    PostgresCatalog, PostgresLedgerStore, PurchaseOrders, QuantityResolver, ReceivingCoordinator,
    StockLedger, StoreError,
};
use stockledger_inventory::{IssuePolicy, Item, Location};

use crate::config::AppConfig;

pub type SharedStore = Arc<dyn LedgerStore>;
pub type SharedCatalog = Arc<dyn Catalog>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("catalog seed {path}: {reason}")]
    Seed { path: String, reason: String },
}

/// Everything the HTTP handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub store: SharedStore,
    pub ledger: StockLedger<SharedStore, SharedCatalog>,
    pub resolver: QuantityResolver<SharedStore, SharedCatalog>,
    pub receiving: ReceivingCoordinator<SharedStore, SharedCatalog>,
    pub discrepancies: DiscrepancyTracker<SharedStore, SharedCatalog>,
    pub orders: PurchaseOrders<SharedStore, SharedCatalog>,
    /// Decimal places used when rendering quantities.
    pub display_scale: u32,
}

impl AppServices {
    pub fn new(
        store: SharedStore,
        catalog: SharedCatalog,
        options: LedgerOptions,
        display_scale: u32,
    ) -> Self {
        let attempts = options.max_append_attempts;
        Self {
            ledger: StockLedger::new(store.clone(), catalog.clone(), options),
            resolver: QuantityResolver::new(store.clone(), catalog.clone()),
            receiving: ReceivingCoordinator::new(store.clone(), catalog.clone(), attempts),
            discrepancies: DiscrepancyTracker::new(store.clone(), catalog.clone(), attempts),
            orders: PurchaseOrders::new(store.clone(), catalog, attempts),
            store,
            display_scale,
        }
    }
}

fn ledger_options(config: &AppConfig) -> LedgerOptions {
    LedgerOptions {
        issue_policy: IssuePolicy::from_require_location(config.require_issue_location),
        max_append_attempts: config.max_append_attempts,
    }
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    match &config.database_url {
        Some(url) => build_persistent_services(config, url).await,
        None => build_in_memory_services(config),
    }
}

fn build_in_memory_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    let catalog = Arc::new(InMemoryCatalog::new());
    match &config.catalog_seed {
        Some(path) => {
            let seed = CatalogSeed::load(path)?;
            tracing::info!(
                items = seed.items.len(),
                locations = seed.locations.len(),
                "seeding in-memory catalog"
            );
            for item in seed.items {
                catalog.insert_item(item)?;
            }
            for location in seed.locations {
                catalog.insert_location(location)?;
            }
        }
        None => tracing::warn!("in-memory catalog is empty; set CATALOG_SEED to load items"),
    }

    tracing::info!("using in-memory ledger store");
    Ok(AppServices::new(
        Arc::new(InMemoryLedgerStore::new()),
        catalog,
        ledger_options(config),
        config.qty_display_scale,
    ))
}

async fn build_persistent_services(
    config: &AppConfig,
    database_url: &str,
) -> Result<AppServices, StartupError> {
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;

    let store = PostgresLedgerStore::new(pool.clone());
    store.migrate().await?;

    let catalog = PostgresCatalog::new(pool);
    if let Some(path) = &config.catalog_seed {
        let seed = CatalogSeed::load(path)?;
        tracing::info!(items = seed.items.len(), "upserting catalog seed");
        for item in &seed.items {
            catalog.upsert_item(item).await?;
        }
        for location in &seed.locations {
            catalog.upsert_location(location).await?;
        }
    }

    tracing::info!("using postgres ledger store");
    Ok(AppServices::new(
        Arc::new(store),
        Arc::new(catalog),
        ledger_options(config),
        config.qty_display_scale,
    ))
}

/// Reference data for dev/test runs without a catalog service.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl CatalogSeed {
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let seed_error = |reason: String| StartupError::Seed {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| seed_error(e.to_string()))
    }
}
