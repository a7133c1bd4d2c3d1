//! Lending coordinator.
//!
//! Decides every check-out, return, renewal and outstanding request. Each public
//! operation takes the document's lock and runs its reads and writes in one unit
//! of work, committed only when the whole operation succeeded. The `*_locked`
//! helpers assume the caller holds the lock and pass the unit of work along.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        CheckOutOutcome, CopyDisposition, Document, DocumentCopy, HistoryEntry, NewHistoryEntry,
        OutstandingRequest, QueueEntry, Rejection, RenewOutcome, RequestOutcome, ReturnOutcome,
        User,
    },
    repository::{Repository, UnitOfWork},
};

use super::{
    fines::{check_overdue, FineSchedule},
    locks::DocumentLocks,
    notifier::{document_ready, Notifier},
};

/// Source of "today" for loan and return dates
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// "Document is ready" message, sent once the assignment is committed
struct ReadyNotice {
    user_id: i32,
    document_id: i32,
    address: String,
    subject: String,
    body: String,
}

#[derive(Clone)]
pub struct LendingService {
    repository: Repository,
    notifier: Arc<dyn Notifier>,
    schedule: FineSchedule,
    deleted_group: String,
    locks: DocumentLocks,
    clock: Clock,
}

impl LendingService {
    pub fn new(repository: Repository, notifier: Arc<dyn Notifier>, config: &LendingConfig) -> Self {
        Self {
            repository,
            notifier,
            schedule: FineSchedule::from(config),
            deleted_group: config.deleted_group.clone(),
            locks: DocumentLocks::new(),
            clock: Arc::new(|| Utc::now().date_naive()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn schedule(&self) -> &FineSchedule {
        &self.schedule
    }

    fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Check a copy of the document out to the user, or queue the user when
    /// no copy is free
    pub async fn check_out(
        &self,
        document_id: i32,
        user_id: i32,
        librarian: &str,
    ) -> AppResult<CheckOutOutcome> {
        let _guard = self.locks.acquire(document_id).await;
        let tx = self.repository.begin().await?;
        let outcome = self
            .check_out_locked(&*tx, document_id, user_id, librarian)
            .await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn check_out_locked(
        &self,
        tx: &dyn UnitOfWork,
        document_id: i32,
        user_id: i32,
        librarian: &str,
    ) -> AppResult<CheckOutOutcome> {
        let document = tx.catalog().get_document(document_id).await?;
        let user = tx.catalog().get_user(user_id).await?;

        if let Some(reason) = self.eligibility(tx, &document, &user).await? {
            tracing::info!(document_id, user_id, %reason, "Check-out rejected");
            return Ok(CheckOutOutcome::Rejected { reason });
        }

        // A reservation holds its copy since assignment, so it is taken as is
        if let Some(reservation) = tx
            .queue()
            .remove_reservation_for(document_id, user_id)
            .await?
        {
            let copy_id = reservation.assigned_copy_id.ok_or_else(|| {
                AppError::Consistency(format!(
                    "reservation {} has no assigned copy",
                    reservation.id
                ))
            })?;
            let entry = self.open_loan(tx, user_id, copy_id, librarian, false).await?;
            tracing::info!(
                document_id,
                user_id,
                copy_id,
                entry_id = entry.id,
                "Reserved copy checked out"
            );
            return Ok(CheckOutOutcome::CheckedOut {
                entry,
                via_reservation: true,
            });
        }

        let copies = tx.catalog().document_active_copies(document_id).await?;
        for copy in copies.iter().filter(|c| c.is_available()) {
            if !tx.catalog().mark_checked_out(copy.id).await? {
                tracing::debug!(document_id, copy_id = copy.id, "Copy taken concurrently, trying next");
                continue;
            }
            let entry = self.open_loan(tx, user_id, copy.id, librarian, false).await?;
            // the user no longer waits for this document
            tx.queue().cancel(document_id, user_id).await?;
            tracing::info!(
                document_id,
                user_id,
                copy_id = copy.id,
                entry_id = entry.id,
                "Copy checked out"
            );
            return Ok(CheckOutOutcome::CheckedOut {
                entry,
                via_reservation: false,
            });
        }

        match tx.queue().push(document_id, user_id).await? {
            Some(entry) => {
                tracing::info!(document_id, user_id, queue_entry_id = entry.id, "No free copy, user queued");
                Ok(CheckOutOutcome::Queued { entry })
            }
            None => Ok(CheckOutOutcome::Rejected {
                reason: Rejection::AlreadyQueued,
            }),
        }
    }

    /// Return the copy of a ledger entry
    pub async fn return_by_entry(&self, entry_id: i32, librarian: &str) -> AppResult<ReturnOutcome> {
        let document_id = self.document_of_entry(entry_id).await?;
        let _guard = self.locks.acquire(document_id).await;
        let tx = self.repository.begin().await?;
        let entry = tx.history().get(entry_id).await?;
        let outcome = self.return_locked(&*tx, entry, librarian).await?;
        self.commit_returned(tx, &outcome).await?;
        Ok(outcome)
    }

    /// Return a copy through its open ledger entry
    pub async fn return_by_copy(&self, copy_id: i32, librarian: &str) -> AppResult<ReturnOutcome> {
        let document_id = self.document_of_copy(copy_id).await?;
        let _guard = self.locks.acquire(document_id).await;
        let tx = self.repository.begin().await?;
        let outcome = match self.open_entry_for_copy(&*tx, copy_id).await? {
            Some(entry) => self.return_locked(&*tx, entry, librarian).await?,
            None => ReturnOutcome::Rejected {
                reason: Rejection::NotCheckedOut,
            },
        };
        self.commit_returned(tx, &outcome).await?;
        Ok(outcome)
    }

    async fn commit_returned(&self, tx: Box<dyn UnitOfWork>, outcome: &ReturnOutcome) -> AppResult<()> {
        let disposition = match outcome {
            ReturnOutcome::Returned { copy, .. } => Some(copy),
            ReturnOutcome::Rejected { .. } => None,
        };
        self.commit_and_notify(tx, disposition).await
    }

    async fn return_locked(
        &self,
        tx: &dyn UnitOfWork,
        entry: HistoryEntry,
        librarian: &str,
    ) -> AppResult<ReturnOutcome> {
        if !entry.is_open() {
            return Ok(ReturnOutcome::Rejected {
                reason: Rejection::AlreadyReturned,
            });
        }

        let today = self.today();
        let Some(closed) = tx.history().close(entry.id, librarian, today).await? else {
            return Ok(ReturnOutcome::Rejected {
                reason: Rejection::AlreadyReturned,
            });
        };

        tx.catalog().mark_available(closed.copy_id).await?;

        let fine = check_overdue(&closed, today, &self.schedule);
        if fine > 0 {
            let user = tx.catalog().add_fine(closed.user_id, fine).await?;
            tracing::info!(
                user_id = user.id,
                entry_id = closed.id,
                fine,
                total = user.fine,
                "Overdue fine added"
            );
        }

        tracing::info!(
            user_id = closed.user_id,
            copy_id = closed.copy_id,
            entry_id = closed.id,
            "Copy returned"
        );

        let copy = tx.catalog().get_copy(closed.copy_id).await?;
        let disposition = self.proceed_free_copy_locked(tx, &copy, librarian).await?;

        Ok(ReturnOutcome::Returned {
            entry: closed,
            fine,
            copy: disposition,
        })
    }

    /// Hand a free copy to whoever has the strongest claim on it
    pub async fn proceed_free_copy(&self, copy_id: i32, librarian: &str) -> AppResult<CopyDisposition> {
        let document_id = self.document_of_copy(copy_id).await?;
        let _guard = self.locks.acquire(document_id).await;
        let tx = self.repository.begin().await?;
        let copy = tx.catalog().get_copy(copy_id).await?;
        if !copy.is_available() {
            return Err(AppError::BadRequest(format!("Copy {} is not free", copy_id)));
        }
        let disposition = self.proceed_free_copy_locked(&*tx, &copy, librarian).await?;
        self.commit_and_notify(tx, Some(&disposition)).await?;
        Ok(disposition)
    }

    async fn proceed_free_copy_locked(
        &self,
        tx: &dyn UnitOfWork,
        copy: &DocumentCopy,
        librarian: &str,
    ) -> AppResult<CopyDisposition> {
        if !copy.active {
            return Ok(CopyDisposition::NoClaimants { copy_id: copy.id });
        }
        let document_id = copy.document_id;

        // 1. outstanding request
        if let Some(request) = tx.requests().active_for(document_id).await? {
            let outcome = self
                .check_out_locked(tx, document_id, request.user_id, librarian)
                .await?;
            self.close_request(tx, &request, librarian).await?;
            match outcome {
                CheckOutOutcome::CheckedOut { entry, .. } => {
                    tracing::info!(
                        document_id,
                        user_id = request.user_id,
                        request_id = request.id,
                        entry_id = entry.id,
                        "Outstanding request fulfilled"
                    );
                    return Ok(CopyDisposition::FulfilledRequest {
                        request_id: request.id,
                        entry,
                    });
                }
                other => {
                    tracing::warn!(
                        document_id,
                        user_id = request.user_id,
                        request_id = request.id,
                        outcome = ?other,
                        "Outstanding request could not be fulfilled and was closed"
                    );
                }
            }
        }

        // 2. queue
        if let Some(entry) = tx.queue().pop_next(document_id, copy.id).await? {
            if !tx.catalog().mark_checked_out(copy.id).await? {
                return Err(AppError::Consistency(format!(
                    "copy {} assigned to queue entry {} is not free",
                    copy.id, entry.id
                )));
            }
            tracing::info!(
                document_id,
                user_id = entry.user_id,
                copy_id = copy.id,
                queue_entry_id = entry.id,
                "Copy held for queued user"
            );
            return Ok(CopyDisposition::AssignedToQueue { entry });
        }

        // 3. nobody waits
        Ok(CopyDisposition::NoClaimants { copy_id: copy.id })
    }

    /// Commit, then tell the queued user about a copy now held for them
    async fn commit_and_notify(
        &self,
        tx: Box<dyn UnitOfWork>,
        disposition: Option<&CopyDisposition>,
    ) -> AppResult<()> {
        let notice = match disposition {
            Some(CopyDisposition::AssignedToQueue { entry }) => {
                self.ready_notice(&*tx, entry).await
            }
            _ => None,
        };
        tx.commit().await?;
        if let Some(notice) = notice {
            self.deliver(notice).await;
        }
        Ok(())
    }

    async fn ready_notice(&self, tx: &dyn UnitOfWork, entry: &QueueEntry) -> Option<ReadyNotice> {
        let lookup = async {
            let user = tx.catalog().get_user(entry.user_id).await?;
            let document = tx.catalog().get_document(entry.document_id).await?;
            Ok::<_, AppError>((user, document))
        };
        match lookup.await {
            Ok((user, document)) => {
                let (subject, body) = document_ready(&user.full_name(), &document.title);
                Some(ReadyNotice {
                    user_id: user.id,
                    document_id: document.id,
                    address: user.email,
                    subject,
                    body,
                })
            }
            Err(e) => {
                tracing::warn!(
                    user_id = entry.user_id,
                    document_id = entry.document_id,
                    "Cannot prepare notice for queued user: {}",
                    e
                );
                None
            }
        }
    }

    async fn deliver(&self, notice: ReadyNotice) {
        if let Err(e) = self
            .notifier
            .send(&notice.address, &notice.subject, &notice.body)
            .await
        {
            tracing::warn!(
                user_id = notice.user_id,
                document_id = notice.document_id,
                "Failed to notify queued user: {}",
                e
            );
        }
    }

    /// Renew the loan of a ledger entry
    pub async fn renew_by_entry(&self, entry_id: i32, librarian: &str) -> AppResult<RenewOutcome> {
        let document_id = self.document_of_entry(entry_id).await?;
        let _guard = self.locks.acquire(document_id).await;
        let tx = self.repository.begin().await?;
        let entry = tx.history().get(entry_id).await?;
        let outcome = self.renew_locked(&*tx, entry, document_id, librarian).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Renew the open loan of a copy
    pub async fn renew_by_copy(&self, copy_id: i32, librarian: &str) -> AppResult<RenewOutcome> {
        let document_id = self.document_of_copy(copy_id).await?;
        let _guard = self.locks.acquire(document_id).await;
        let tx = self.repository.begin().await?;
        let outcome = match self.open_entry_for_copy(&*tx, copy_id).await? {
            Some(entry) => self.renew_locked(&*tx, entry, document_id, librarian).await?,
            None => RenewOutcome::Rejected {
                reason: Rejection::NotCheckedOut,
            },
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn renew_locked(
        &self,
        tx: &dyn UnitOfWork,
        entry: HistoryEntry,
        document_id: i32,
        librarian: &str,
    ) -> AppResult<RenewOutcome> {
        let rejected = |reason| Ok(RenewOutcome::Rejected { reason });

        if !entry.is_open() {
            return rejected(Rejection::AlreadyReturned);
        }
        let user = tx.catalog().get_user(entry.user_id).await?;
        if self.is_deleted(tx, &user).await? {
            return rejected(Rejection::UserDeleted);
        }
        let today = self.today();
        if check_overdue(&entry, today, &self.schedule) != 0 {
            return rejected(Rejection::Overdue);
        }
        if tx.requests().active_for(document_id).await?.is_some() {
            return rejected(Rejection::Requested);
        }
        if entry.renewed {
            return rejected(Rejection::AlreadyRenewed);
        }

        let Some(closed) = tx.history().close(entry.id, librarian, today).await? else {
            return rejected(Rejection::AlreadyReturned);
        };
        let renewed = self
            .open_loan(tx, closed.user_id, closed.copy_id, librarian, true)
            .await?;

        tracing::info!(
            user_id = closed.user_id,
            copy_id = closed.copy_id,
            closed_entry_id = closed.id,
            entry_id = renewed.id,
            "Loan renewed"
        );

        Ok(RenewOutcome::Renewed {
            closed,
            entry: renewed,
        })
    }

    /// Place a librarian's standing claim for the user ahead of the queue
    pub async fn outstanding_request(
        &self,
        document_id: i32,
        user_id: i32,
        librarian: &str,
    ) -> AppResult<RequestOutcome> {
        let _guard = self.locks.acquire(document_id).await;
        let tx = self.repository.begin().await?;
        let outcome = self
            .outstanding_request_locked(&*tx, document_id, user_id, librarian)
            .await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn outstanding_request_locked(
        &self,
        tx: &dyn UnitOfWork,
        document_id: i32,
        user_id: i32,
        librarian: &str,
    ) -> AppResult<RequestOutcome> {
        let document = tx.catalog().get_document(document_id).await?;
        let user = tx.catalog().get_user(user_id).await?;
        if let Some(reason) = self.eligibility(tx, &document, &user).await? {
            tracing::info!(document_id, user_id, %reason, "Outstanding request rejected");
            return Ok(RequestOutcome::Rejected { reason });
        }

        self.supersede_requests(tx, document_id).await?;

        if let Some(copy) = self.first_available_copy(tx, document_id).await? {
            return Ok(RequestOutcome::CopyAlreadyFree { copy_id: copy.id });
        }

        let flushed = tx.queue().flush(document_id).await?;
        for copy_id in flushed.iter().filter_map(|e| e.assigned_copy_id) {
            tx.catalog().mark_available(copy_id).await?;
        }
        if !flushed.is_empty() {
            tracing::info!(document_id, flushed = flushed.len(), "Queue flushed for outstanding request");
        }

        if self.first_available_copy(tx, document_id).await?.is_some() {
            return match self
                .check_out_locked(tx, document_id, user_id, librarian)
                .await?
            {
                CheckOutOutcome::CheckedOut { entry, .. } => Ok(RequestOutcome::CheckedOutAfterFlush {
                    entry,
                    flushed: flushed.len(),
                }),
                CheckOutOutcome::Rejected { reason } => Ok(RequestOutcome::Rejected { reason }),
                CheckOutOutcome::Queued { entry } => Err(AppError::Consistency(format!(
                    "user {} queued on document {} although a copy was free",
                    entry.user_id, document_id
                ))),
            };
        }

        let request = tx.requests().place(document_id, user_id, librarian).await?;
        tx.catalog().set_document_requested(document_id, true).await?;
        tracing::info!(document_id, user_id, request_id = request.id, "Outstanding request placed");

        Ok(RequestOutcome::RequestPlaced {
            request,
            flushed: flushed.len(),
        })
    }

    async fn supersede_requests(&self, tx: &dyn UnitOfWork, document_id: i32) -> AppResult<()> {
        let superseded = tx.requests().deactivate_all(document_id).await?;
        if superseded == 0 {
            return Ok(());
        }
        tx.catalog().set_document_requested(document_id, false).await?;
        tracing::info!(document_id, superseded, "Previous outstanding request superseded");

        if superseded > 1 {
            tracing::warn!(
                document_id,
                superseded,
                consistency = true,
                "Document had more than one active request"
            );
        }
        match tx.requests().active_for(document_id).await {
            Ok(None) => {}
            Ok(Some(request)) => tracing::warn!(
                document_id,
                request_id = request.id,
                consistency = true,
                "Active request survived supersession"
            ),
            Err(AppError::Consistency(msg)) => {
                tracing::warn!(document_id, consistency = true, "{}", msg)
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn close_request(
        &self,
        tx: &dyn UnitOfWork,
        request: &OutstandingRequest,
        librarian: &str,
    ) -> AppResult<()> {
        tx.requests()
            .close(request.user_id, request.document_id, librarian)
            .await?;
        tx.catalog()
            .set_document_requested(request.document_id, false)
            .await
    }

    /// Every ledger entry of a user, oldest first
    pub async fn user_history(&self, user_id: i32) -> AppResult<Vec<HistoryEntry>> {
        let tx = self.repository.begin().await?;
        tx.catalog().get_user(user_id).await?;
        let history = tx.history().for_user(user_id).await?;
        tx.commit().await?;
        Ok(history)
    }

    /// Queue of a document in FIFO order
    pub async fn document_queue(&self, document_id: i32) -> AppResult<Vec<QueueEntry>> {
        let tx = self.repository.begin().await?;
        tx.catalog().get_document(document_id).await?;
        let queue = tx.queue().list(document_id).await?;
        tx.commit().await?;
        Ok(queue)
    }

    /// The document's active outstanding request, if any
    pub async fn active_request(&self, document_id: i32) -> AppResult<Option<OutstandingRequest>> {
        let tx = self.repository.begin().await?;
        tx.catalog().get_document(document_id).await?;
        let request = tx.requests().active_for(document_id).await?;
        tx.commit().await?;
        Ok(request)
    }

    /// Remove a user from a document's queue. A copy held for that user is
    /// released and goes to the next claimant.
    pub async fn cancel_queue_entry(
        &self,
        document_id: i32,
        user_id: i32,
        librarian: &str,
    ) -> AppResult<Option<QueueEntry>> {
        let _guard = self.locks.acquire(document_id).await;
        let tx = self.repository.begin().await?;

        let Some(entry) = tx.queue().cancel(document_id, user_id).await? else {
            return Ok(None);
        };
        tracing::info!(document_id, user_id, queue_entry_id = entry.id, "Queue entry cancelled");

        let mut disposition = None;
        if let Some(copy_id) = entry.assigned_copy_id {
            tx.catalog().mark_available(copy_id).await?;
            let copy = tx.catalog().get_copy(copy_id).await?;
            let released = self.proceed_free_copy_locked(&*tx, &copy, librarian).await?;
            tracing::info!(document_id, copy_id, disposition = ?released, "Held copy released");
            disposition = Some(released);
        }

        self.commit_and_notify(tx, disposition.as_ref()).await?;
        Ok(Some(entry))
    }

    async fn is_deleted(&self, tx: &dyn UnitOfWork, user: &User) -> AppResult<bool> {
        let group = tx.catalog().lookup_group(&self.deleted_group).await?;
        Ok(group.is_some_and(|g| user.is_in(&g)))
    }

    /// Rules shared by check-out and outstanding requests, in order
    async fn eligibility(
        &self,
        tx: &dyn UnitOfWork,
        document: &Document,
        user: &User,
    ) -> AppResult<Option<Rejection>> {
        if self.is_deleted(tx, user).await? {
            return Ok(Some(Rejection::UserDeleted));
        }
        if !document.active {
            return Ok(Some(Rejection::DocumentInactive));
        }
        if document.is_reference() {
            return Ok(Some(Rejection::NonCirculating));
        }
        if tx.history().has_open_loan(user.id, document.id).await? {
            return Ok(Some(Rejection::DuplicateLoan));
        }
        Ok(None)
    }

    async fn first_available_copy(
        &self,
        tx: &dyn UnitOfWork,
        document_id: i32,
    ) -> AppResult<Option<DocumentCopy>> {
        Ok(tx
            .catalog()
            .document_active_copies(document_id)
            .await?
            .into_iter()
            .find(|c| c.is_available()))
    }

    async fn open_entry_for_copy(
        &self,
        tx: &dyn UnitOfWork,
        copy_id: i32,
    ) -> AppResult<Option<HistoryEntry>> {
        let mut open = tx.history().open_for_copy(copy_id).await?;
        match open.len() {
            0 => Ok(None),
            1 => Ok(open.pop()),
            n => Err(AppError::Consistency(format!(
                "copy {} has {} open loans",
                copy_id, n
            ))),
        }
    }

    /// Document of an entry's copy, read before the document lock is taken
    async fn document_of_entry(&self, entry_id: i32) -> AppResult<i32> {
        let tx = self.repository.begin().await?;
        let entry = tx.history().get(entry_id).await?;
        let copy = tx.catalog().get_copy(entry.copy_id).await?;
        tx.commit().await?;
        Ok(copy.document_id)
    }

    async fn document_of_copy(&self, copy_id: i32) -> AppResult<i32> {
        let tx = self.repository.begin().await?;
        let copy = tx.catalog().get_copy(copy_id).await?;
        tx.commit().await?;
        Ok(copy.document_id)
    }

    async fn open_loan(
        &self,
        tx: &dyn UnitOfWork,
        user_id: i32,
        copy_id: i32,
        librarian: &str,
        renewed: bool,
    ) -> AppResult<HistoryEntry> {
        tx.history()
            .open(NewHistoryEntry {
                user_id,
                copy_id,
                librarian_co: librarian.to_string(),
                date_check_out: self.today(),
                renewed,
            })
            .await
    }
}
