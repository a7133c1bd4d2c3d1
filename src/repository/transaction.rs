//! Units of work: every write of one lending operation commits, or none does

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{AppError, AppResult};

use super::{
    catalog::CatalogStore, history::HistoryLedger, queue::QueueStore, requests::RequestStore,
};

/// The four stores seen through one transaction
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn catalog(&self) -> &dyn CatalogStore;

    fn history(&self) -> &dyn HistoryLedger;

    fn queue(&self) -> &dyn QueueStore;

    fn requests(&self) -> &dyn RequestStore;

    /// Make the writes durable. A unit dropped without commit discards them.
    async fn commit(&self) -> AppResult<()>;
}

/// Opens units of work on a backend
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionSource for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork {
            tx: Mutex::new(Some(tx)),
        }))
    }
}

/// One PostgreSQL transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgUnitOfWork {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgUnitOfWork {
    pub(crate) async fn conn(&self) -> AppResult<TxGuard<'_>> {
        let guard = self.tx.lock().await;
        if guard.is_none() {
            return Err(finished());
        }
        Ok(TxGuard(guard))
    }
}

/// Lock on a live transaction. Wraps `MutexGuard` rather than using
/// `MappedMutexGuard`, whose `Send` bound trips rustc's higher-ranked
/// lifetime check when held across an await in `async_trait` methods.
pub(crate) struct TxGuard<'a>(MutexGuard<'a, Option<Transaction<'static, Postgres>>>);

impl Deref for TxGuard<'_> {
    type Target = Transaction<'static, Postgres>;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref().expect("checked in PgUnitOfWork::conn")
    }
}

impl DerefMut for TxGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut().expect("checked in PgUnitOfWork::conn")
    }
}

fn finished() -> AppError {
    AppError::Consistency("transaction already committed".to_string())
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn catalog(&self) -> &dyn CatalogStore {
        self
    }

    fn history(&self) -> &dyn HistoryLedger {
        self
    }

    fn queue(&self) -> &dyn QueueStore {
        self
    }

    fn requests(&self) -> &dyn RequestStore {
        self
    }

    async fn commit(&self) -> AppResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(finished)?;
        tx.commit().await?;
        Ok(())
    }
}
