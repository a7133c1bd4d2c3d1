//! A store write failing midway through an operation leaves no partial state

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use library_lending::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        CheckOutOutcome, CopyStatus, Document, DocumentCopy, Group, HistoryEntry, NewHistoryEntry,
        OutstandingRequest, ReturnOutcome, User,
    },
    repository::{
        CatalogStore, HistoryLedger, MemoryStore, QueueStore, Repository, RequestStore,
        TransactionSource, UnitOfWork,
    },
    services::{lending::LendingService, notifier::MemoryNotifier, Services},
};

use crate::common::*;

/// The one write that fails
#[derive(Clone, Copy)]
enum Fault {
    AddFine,
    OpenLoan,
    PlaceRequest,
}

fn pool_timeout() -> AppError {
    AppError::Database(sqlx::Error::PoolTimedOut)
}

/// Memory store whose units of work fail on one kind of write
struct FaultyStore {
    inner: MemoryStore,
    fault: Fault,
}

#[async_trait]
impl TransactionSource for FaultyStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(FaultyUnitOfWork {
            inner: self.inner.begin().await?,
            fault: self.fault,
        }))
    }
}

struct FaultyUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    fault: Fault,
}

#[async_trait]
impl CatalogStore for FaultyUnitOfWork {
    async fn lookup_group(&self, name: &str) -> AppResult<Option<Group>> {
        self.inner.catalog().lookup_group(name).await
    }

    async fn get_document(&self, id: i32) -> AppResult<Document> {
        self.inner.catalog().get_document(id).await
    }

    async fn get_copy(&self, id: i32) -> AppResult<DocumentCopy> {
        self.inner.catalog().get_copy(id).await
    }

    async fn get_user(&self, id: i32) -> AppResult<User> {
        self.inner.catalog().get_user(id).await
    }

    async fn document_active_copies(&self, document_id: i32) -> AppResult<Vec<DocumentCopy>> {
        self.inner.catalog().document_active_copies(document_id).await
    }

    async fn mark_checked_out(&self, copy_id: i32) -> AppResult<bool> {
        self.inner.catalog().mark_checked_out(copy_id).await
    }

    async fn mark_available(&self, copy_id: i32) -> AppResult<()> {
        self.inner.catalog().mark_available(copy_id).await
    }

    async fn set_document_requested(&self, document_id: i32, requested: bool) -> AppResult<()> {
        self.inner
            .catalog()
            .set_document_requested(document_id, requested)
            .await
    }

    async fn add_fine(&self, user_id: i32, amount: i64) -> AppResult<User> {
        if let Fault::AddFine = self.fault {
            return Err(pool_timeout());
        }
        self.inner.catalog().add_fine(user_id, amount).await
    }
}

#[async_trait]
impl HistoryLedger for FaultyUnitOfWork {
    async fn open(&self, entry: NewHistoryEntry) -> AppResult<HistoryEntry> {
        if let Fault::OpenLoan = self.fault {
            return Err(pool_timeout());
        }
        self.inner.history().open(entry).await
    }

    async fn get(&self, id: i32) -> AppResult<HistoryEntry> {
        self.inner.history().get(id).await
    }

    async fn open_for_copy(&self, copy_id: i32) -> AppResult<Vec<HistoryEntry>> {
        self.inner.history().open_for_copy(copy_id).await
    }

    async fn has_open_loan(&self, user_id: i32, document_id: i32) -> AppResult<bool> {
        self.inner.history().has_open_loan(user_id, document_id).await
    }

    async fn close(
        &self,
        id: i32,
        librarian: &str,
        date: NaiveDate,
    ) -> AppResult<Option<HistoryEntry>> {
        self.inner.history().close(id, librarian, date).await
    }

    async fn for_user(&self, user_id: i32) -> AppResult<Vec<HistoryEntry>> {
        self.inner.history().for_user(user_id).await
    }
}

#[async_trait]
impl RequestStore for FaultyUnitOfWork {
    async fn active_for(&self, document_id: i32) -> AppResult<Option<OutstandingRequest>> {
        self.inner.requests().active_for(document_id).await
    }

    async fn place(
        &self,
        document_id: i32,
        user_id: i32,
        librarian: &str,
    ) -> AppResult<OutstandingRequest> {
        if let Fault::PlaceRequest = self.fault {
            return Err(pool_timeout());
        }
        self.inner.requests().place(document_id, user_id, librarian).await
    }

    async fn close(&self, user_id: i32, document_id: i32, librarian: &str) -> AppResult<()> {
        self.inner.requests().close(user_id, document_id, librarian).await
    }

    async fn deactivate_all(&self, document_id: i32) -> AppResult<u64> {
        self.inner.requests().deactivate_all(document_id).await
    }
}

#[async_trait]
impl UnitOfWork for FaultyUnitOfWork {
    fn catalog(&self) -> &dyn CatalogStore {
        self
    }

    fn history(&self) -> &dyn HistoryLedger {
        self
    }

    fn queue(&self) -> &dyn QueueStore {
        self.inner.queue()
    }

    fn requests(&self) -> &dyn RequestStore {
        self
    }

    async fn commit(&self) -> AppResult<()> {
        self.inner.commit().await
    }
}

fn faulty_service(store: &MemoryStore, notifier: &MemoryNotifier, fault: Fault) -> LendingService {
    let source = FaultyStore {
        inner: store.clone(),
        fault,
    };
    Services::new(
        Repository::from_source(Arc::new(source)),
        Arc::new(notifier.clone()),
        &LendingConfig::default(),
    )
    .lending
    .with_clock(Arc::new(today))
}

#[tokio::test]
async fn test_failed_fine_keeps_loan_open() {
    let f = fixture();
    let loan = backdated_loan(&f.store, 1, ALICE, NOVEL_COPY, 30);
    let queued = f.lending.check_out(NOVEL, BOB, LIBRARIAN).await.unwrap();
    assert!(matches!(queued, CheckOutOutcome::Queued { .. }));

    let faulty = faulty_service(&f.store, &f.notifier, Fault::AddFine);
    let err = faulty.return_by_entry(loan.id, LIBRARIAN).await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    assert!(f.store.history()[0].is_open());
    assert_eq!(f.store.copy(NOVEL_COPY).unwrap().checked_out, CopyStatus::CheckedOut);
    assert_eq!(f.store.user(ALICE).unwrap().fine, 0);
    let queue = f.store.queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].user_id, BOB);
    assert_eq!(queue[0].assigned_copy_id, None);
    assert!(f.notifier.sent().is_empty());

    // the same return succeeds once the store recovers
    let outcome = f.lending.return_by_entry(loan.id, LIBRARIAN).await.unwrap();
    assert!(matches!(outcome, ReturnOutcome::Returned { fine: 900, .. }));
    assert_eq!(f.store.user(ALICE).unwrap().fine, 900);
    assert_eq!(f.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_failed_renewal_leaves_original_loan_open() {
    let f = fixture();
    let loan = backdated_loan(&f.store, 1, ALICE, NOVEL_COPY, 5);

    let faulty = faulty_service(&f.store, &f.notifier, Fault::OpenLoan);
    let err = faulty.renew_by_copy(NOVEL_COPY, LIBRARIAN).await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    assert_eq!(f.store.history(), vec![loan]);
    assert_eq!(f.store.copy(NOVEL_COPY).unwrap().checked_out, CopyStatus::CheckedOut);
}

#[tokio::test]
async fn test_failed_request_placement_keeps_queue() {
    let f = fixture();
    backdated_loan(&f.store, 1, ALICE, NOVEL_COPY, 5);
    f.lending.check_out(NOVEL, BOB, LIBRARIAN).await.unwrap();

    let faulty = faulty_service(&f.store, &f.notifier, Fault::PlaceRequest);
    let err = faulty
        .outstanding_request(NOVEL, CAROL, LIBRARIAN)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    let queue = f.store.queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].user_id, BOB);
    assert!(f.store.requests().is_empty());
    assert!(!f.store.document(NOVEL).unwrap().requested);
}

#[tokio::test]
async fn test_failed_unit_does_not_block_the_next_one() {
    let f = fixture();
    let faulty = faulty_service(&f.store, &f.notifier, Fault::OpenLoan);
    faulty.check_out(MANUAL, ALICE, LIBRARIAN).await.unwrap_err();

    for copy_id in MANUAL_COPIES {
        assert!(f.store.copy(copy_id).unwrap().is_available());
    }
    let outcome = f.lending.check_out(MANUAL, ALICE, LIBRARIAN).await.unwrap();
    assert!(matches!(
        outcome,
        CheckOutOutcome::CheckedOut { ref entry, .. } if entry.copy_id == MANUAL_COPIES[0]
    ));
}
