//! # Commerce Context
//!
//! Explicitly constructed bundle of everything the services share.
//!
//! ```text
//! CommerceConfig ──► CommerceContext::connect
//!                         │
//!        ┌────────────────┼──────────────────┬──────────────┐
//!        ▼                ▼                  ▼              ▼
//!    Database       CacheManager   TransactionManager    EventBus
//!        └────────────────┴──────────────────┴──────────────┘
//!                         │  (cheap clones)
//!        ┌────────────────┼──────────────────┐
//!        ▼                ▼                  ▼
//!  ProductCatalog   InventoryLedger     OrderWorkflow
//! ```

use std::sync::Arc;
use tracing::info;

use tailoc_cache::CacheManager;
use tailoc_db::{Database, TransactionManager};

use crate::catalog::ProductCatalog;
use crate::config::CommerceConfig;
use crate::error::CommerceResult;
use crate::events::EventBus;
use crate::inventory::InventoryLedger;
use crate::orders::OrderWorkflow;

/// Shared handles for one running store. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct CommerceContext {
    config: Arc<CommerceConfig>,
    db: Database,
    cache: CacheManager,
    transactions: TransactionManager,
    events: EventBus,
}

impl CommerceContext {
    /// Validates `config`, opens the database (running migrations) and
    /// builds the cache, transaction manager and event bus.
    pub async fn connect(config: CommerceConfig) -> CommerceResult<Self> {
        config.validate()?;
        let db = Database::new(config.database.db_config()).await?;
        let context = Self::with_database(config, db);

        info!(
            database = %context.config.database.path.display(),
            cache_prefix = %context.config.cache.key_prefix,
            "Commerce context ready"
        );
        Ok(context)
    }

    /// Builds a context around an already open database.
    pub fn with_database(config: CommerceConfig, db: Database) -> Self {
        let cache = CacheManager::new(config.cache.cache_config());
        let transactions = db.transactions(config.transactions.options());
        let events = EventBus::new(config.events.channel_capacity);

        CommerceContext {
            config: Arc::new(config),
            db,
            cache,
            transactions,
            events,
        }
    }

    pub fn config(&self) -> &CommerceConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn catalog(&self) -> ProductCatalog {
        ProductCatalog::new(self.clone())
    }

    pub fn inventory(&self) -> InventoryLedger {
        InventoryLedger::new(self.clone())
    }

    pub fn orders(&self) -> OrderWorkflow {
        OrderWorkflow::new(self.clone())
    }

    /// Closes the pool. Clones of this context become unusable.
    pub async fn close(&self) {
        self.db.close().await;
    }
}
