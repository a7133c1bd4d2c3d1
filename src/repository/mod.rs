//! Repository layer: the stores the lending core reads and writes

pub mod catalog;
pub mod history;
pub mod memory;
pub mod queue;
pub mod requests;
pub mod transaction;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::error::AppResult;

pub use catalog::CatalogStore;
pub use history::HistoryLedger;
pub use memory::MemoryStore;
pub use queue::QueueStore;
pub use requests::RequestStore;
pub use transaction::{PgStore, TransactionSource, UnitOfWork};

/// Main repository struct: hands out units of work on the configured backend
#[derive(Clone)]
pub struct Repository {
    source: Arc<dyn TransactionSource>,
}

impl Repository {
    /// Create a repository backed by PostgreSQL
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self::from_source(Arc::new(PgStore::new(pool)))
    }

    /// Create a repository backed by the given in-memory store
    pub fn in_memory(store: MemoryStore) -> Self {
        Self::from_source(Arc::new(store))
    }

    pub fn from_source(source: Arc<dyn TransactionSource>) -> Self {
        Self { source }
    }

    /// Open a unit of work
    pub async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        self.source.begin().await
    }
}
