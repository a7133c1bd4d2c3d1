//! In-memory store implementing every lending store trait.
//!
//! Backs the `memory` store backend and the test suites. All state lives behind
//! one mutex, so each trait call is atomic on its own. Units of work run one at
//! a time and restore a snapshot of the state unless committed.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    error::{AppError, AppResult},
    models::{
        CopyStatus, Document, DocumentCopy, Group, HistoryEntry, NewHistoryEntry,
        OutstandingRequest, QueueEntry, User,
    },
};

use super::{
    catalog::CatalogStore,
    history::HistoryLedger,
    queue::QueueStore,
    requests::single_active,
    requests::RequestStore,
    transaction::{TransactionSource, UnitOfWork},
};

#[derive(Clone, Default)]
struct MemoryState {
    groups: BTreeMap<i32, Group>,
    users: BTreeMap<i32, User>,
    documents: BTreeMap<i32, Document>,
    copies: BTreeMap<i32, DocumentCopy>,
    history: Vec<HistoryEntry>,
    queue: Vec<QueueEntry>,
    requests: Vec<OutstandingRequest>,
    next_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Catalog content accepted by [`MemoryStore::from_seed`]
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub copies: Vec<DocumentCopy>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    // held by the open unit of work
    gate: Arc<AsyncMutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-filled with catalog records
    pub fn from_seed(seed: CatalogSeed) -> Self {
        let store = Self::new();
        for group in seed.groups {
            store.insert_group(group);
        }
        for user in seed.users {
            store.insert_user(user);
        }
        for document in seed.documents {
            store.insert_document(document);
        }
        for copy in seed.copies {
            store.insert_copy(copy);
        }
        store
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Identifiers are shared across record kinds so that seeded ids never
    // collide with generated ones.
    fn bump(state: &mut MemoryState, id: i32) {
        state.next_id = state.next_id.max(id);
    }

    pub fn insert_group(&self, group: Group) {
        let mut state = self.state();
        Self::bump(&mut state, group.id);
        state.groups.insert(group.id, group);
    }

    pub fn insert_user(&self, user: User) {
        let mut state = self.state();
        Self::bump(&mut state, user.id);
        state.users.insert(user.id, user);
    }

    pub fn insert_document(&self, document: Document) {
        let mut state = self.state();
        Self::bump(&mut state, document.id);
        state.documents.insert(document.id, document);
    }

    pub fn insert_copy(&self, copy: DocumentCopy) {
        let mut state = self.state();
        Self::bump(&mut state, copy.id);
        state.copies.insert(copy.id, copy);
    }

    /// Insert a ledger entry as-is, bypassing every check. Used to back-date
    /// loans and to reproduce corrupted states.
    pub fn insert_history(&self, entry: HistoryEntry) {
        let mut state = self.state();
        Self::bump(&mut state, entry.id);
        state.history.push(entry);
    }

    /// Insert a request as-is, bypassing the single-active rule
    pub fn insert_request(&self, request: OutstandingRequest) {
        let mut state = self.state();
        Self::bump(&mut state, request.id);
        state.requests.push(request);
    }

    pub fn set_copy_status(&self, copy_id: i32, status: CopyStatus) {
        if let Some(copy) = self.state().copies.get_mut(&copy_id) {
            copy.checked_out = status;
        }
    }

    pub fn set_user_group(&self, user_id: i32, group_id: Option<i32>) {
        if let Some(user) = self.state().users.get_mut(&user_id) {
            user.group_id = group_id;
        }
    }

    pub fn copy(&self, copy_id: i32) -> Option<DocumentCopy> {
        self.state().copies.get(&copy_id).cloned()
    }

    pub fn user(&self, user_id: i32) -> Option<User> {
        self.state().users.get(&user_id).cloned()
    }

    pub fn document(&self, document_id: i32) -> Option<Document> {
        self.state().documents.get(&document_id).cloned()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state().history.clone()
    }

    pub fn queue(&self) -> Vec<QueueEntry> {
        self.state().queue.clone()
    }

    pub fn requests(&self) -> Vec<OutstandingRequest> {
        self.state().requests.clone()
    }
}

#[async_trait]
impl TransactionSource for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let gate = self.gate.clone().lock_owned().await;
        let snapshot = MemoryState::clone(&self.state());
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            snapshot: Mutex::new(Some(snapshot)),
            _gate: gate,
        }))
    }
}

/// Writes go straight to the store; the snapshot taken at `begin` is put
/// back when the unit is dropped uncommitted.
pub struct MemoryUnitOfWork {
    store: MemoryStore,
    snapshot: Mutex<Option<MemoryState>>,
    _gate: OwnedMutexGuard<()>,
}

impl MemoryUnitOfWork {
    fn take_snapshot(&self) -> Option<MemoryState> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn catalog(&self) -> &dyn CatalogStore {
        &self.store
    }

    fn history(&self) -> &dyn HistoryLedger {
        &self.store
    }

    fn queue(&self) -> &dyn QueueStore {
        &self.store
    }

    fn requests(&self) -> &dyn RequestStore {
        &self.store
    }

    async fn commit(&self) -> AppResult<()> {
        self.take_snapshot();
        Ok(())
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if let Some(snapshot) = self.take_snapshot() {
            *self.store.state() = snapshot;
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn lookup_group(&self, name: &str) -> AppResult<Option<Group>> {
        Ok(self.state().groups.values().find(|g| g.name == name).cloned())
    }

    async fn get_document(&self, id: i32) -> AppResult<Document> {
        self.document(id)
            .ok_or_else(|| AppError::NotFound(format!("Document with id {} not found", id)))
    }

    async fn get_copy(&self, id: i32) -> AppResult<DocumentCopy> {
        self.copy(id)
            .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", id)))
    }

    async fn get_user(&self, id: i32) -> AppResult<User> {
        self.user(id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn document_active_copies(&self, document_id: i32) -> AppResult<Vec<DocumentCopy>> {
        // BTreeMap iteration keeps ids ascending
        Ok(self
            .state()
            .copies
            .values()
            .filter(|c| c.document_id == document_id && c.active)
            .cloned()
            .collect())
    }

    async fn mark_checked_out(&self, copy_id: i32) -> AppResult<bool> {
        let mut state = self.state();
        let copy = state
            .copies
            .get_mut(&copy_id)
            .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", copy_id)))?;
        if !copy.is_available() {
            return Ok(false);
        }
        copy.checked_out = CopyStatus::CheckedOut;
        Ok(true)
    }

    async fn mark_available(&self, copy_id: i32) -> AppResult<()> {
        let mut state = self.state();
        let copy = state
            .copies
            .get_mut(&copy_id)
            .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", copy_id)))?;
        copy.checked_out = CopyStatus::Available;
        Ok(())
    }

    async fn set_document_requested(&self, document_id: i32, requested: bool) -> AppResult<()> {
        if let Some(document) = self.state().documents.get_mut(&document_id) {
            document.requested = requested;
        }
        Ok(())
    }

    async fn add_fine(&self, user_id: i32, amount: i64) -> AppResult<User> {
        let mut state = self.state();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;
        user.fine += amount;
        Ok(user.clone())
    }
}

#[async_trait]
impl HistoryLedger for MemoryStore {
    async fn open(&self, entry: NewHistoryEntry) -> AppResult<HistoryEntry> {
        let mut state = self.state();
        if state
            .history
            .iter()
            .any(|h| h.copy_id == entry.copy_id && h.is_open())
        {
            return Err(AppError::Consistency(format!(
                "copy {} already has an open loan",
                entry.copy_id
            )));
        }
        let created = HistoryEntry {
            id: state.next_id(),
            user_id: entry.user_id,
            copy_id: entry.copy_id,
            librarian_co: entry.librarian_co,
            date_check_out: entry.date_check_out,
            librarian_re: None,
            date_return: None,
            renewed: entry.renewed,
        };
        state.history.push(created.clone());
        Ok(created)
    }

    async fn get(&self, id: i32) -> AppResult<HistoryEntry> {
        self.state()
            .history
            .iter()
            .find(|h| h.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("History entry with id {} not found", id)))
    }

    async fn open_for_copy(&self, copy_id: i32) -> AppResult<Vec<HistoryEntry>> {
        Ok(self
            .state()
            .history
            .iter()
            .filter(|h| h.copy_id == copy_id && h.is_open())
            .cloned()
            .collect())
    }

    async fn has_open_loan(&self, user_id: i32, document_id: i32) -> AppResult<bool> {
        let state = self.state();
        Ok(state.history.iter().any(|h| {
            h.user_id == user_id
                && h.is_open()
                && state
                    .copies
                    .get(&h.copy_id)
                    .is_some_and(|c| c.document_id == document_id)
        }))
    }

    async fn close(
        &self,
        id: i32,
        librarian: &str,
        date: NaiveDate,
    ) -> AppResult<Option<HistoryEntry>> {
        let mut state = self.state();
        let entry = state
            .history
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| AppError::NotFound(format!("History entry with id {} not found", id)))?;
        if !entry.is_open() {
            return Ok(None);
        }
        entry.date_return = Some(date);
        entry.librarian_re = Some(librarian.to_string());
        Ok(Some(entry.clone()))
    }

    async fn for_user(&self, user_id: i32) -> AppResult<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self
            .state()
            .history
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|h| (h.date_check_out, h.id));
        Ok(entries)
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, document_id: i32, user_id: i32) -> AppResult<Option<QueueEntry>> {
        let mut state = self.state();
        if state
            .queue
            .iter()
            .any(|q| q.document_id == document_id && q.user_id == user_id)
        {
            return Ok(None);
        }
        let entry = QueueEntry {
            id: state.next_id(),
            document_id,
            user_id,
            assigned_copy_id: None,
            created_at: Utc::now(),
        };
        state.queue.push(entry.clone());
        Ok(Some(entry))
    }

    async fn pop_next(&self, document_id: i32, copy_id: i32) -> AppResult<Option<QueueEntry>> {
        // The vector keeps insertion order, which is the FIFO order
        let mut state = self.state();
        let next = state
            .queue
            .iter_mut()
            .find(|q| q.document_id == document_id && q.assigned_copy_id.is_none());
        Ok(next.map(|entry| {
            entry.assigned_copy_id = Some(copy_id);
            entry.clone()
        }))
    }

    async fn remove_reservation_for(
        &self,
        document_id: i32,
        user_id: i32,
    ) -> AppResult<Option<QueueEntry>> {
        let mut state = self.state();
        let position = state.queue.iter().position(|q| {
            q.document_id == document_id && q.user_id == user_id && q.is_reservation()
        });
        Ok(position.map(|i| state.queue.remove(i)))
    }

    async fn cancel(&self, document_id: i32, user_id: i32) -> AppResult<Option<QueueEntry>> {
        let mut state = self.state();
        let position = state
            .queue
            .iter()
            .position(|q| q.document_id == document_id && q.user_id == user_id);
        Ok(position.map(|i| state.queue.remove(i)))
    }

    async fn flush(&self, document_id: i32) -> AppResult<Vec<QueueEntry>> {
        let mut state = self.state();
        let (flushed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.queue)
            .into_iter()
            .partition(|q| q.document_id == document_id);
        state.queue = kept;
        Ok(flushed)
    }

    async fn list(&self, document_id: i32) -> AppResult<Vec<QueueEntry>> {
        Ok(self
            .state()
            .queue
            .iter()
            .filter(|q| q.document_id == document_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn active_for(&self, document_id: i32) -> AppResult<Option<OutstandingRequest>> {
        let active = self
            .state()
            .requests
            .iter()
            .filter(|r| r.document_id == document_id && r.active)
            .cloned()
            .collect();
        single_active(document_id, active)
    }

    async fn place(
        &self,
        document_id: i32,
        user_id: i32,
        librarian: &str,
    ) -> AppResult<OutstandingRequest> {
        let mut state = self.state();
        if state
            .requests
            .iter()
            .any(|r| r.document_id == document_id && r.active)
        {
            return Err(AppError::Consistency(format!(
                "document {} already has an active request",
                document_id
            )));
        }
        let request = OutstandingRequest {
            id: state.next_id(),
            document_id,
            user_id,
            librarian: librarian.to_string(),
            active: true,
            created_at: Utc::now(),
            closed_by: None,
            closed_at: None,
        };
        state.requests.push(request.clone());
        Ok(request)
    }

    async fn close(&self, user_id: i32, document_id: i32, librarian: &str) -> AppResult<()> {
        let now = Utc::now();
        for request in self.state().requests.iter_mut().filter(|r| {
            r.user_id == user_id && r.document_id == document_id && r.active
        }) {
            request.active = false;
            request.closed_by = Some(librarian.to_string());
            request.closed_at = Some(now);
        }
        Ok(())
    }

    async fn deactivate_all(&self, document_id: i32) -> AppResult<u64> {
        let now = Utc::now();
        let mut count = 0;
        for request in self
            .state()
            .requests
            .iter_mut()
            .filter(|r| r.document_id == document_id && r.active)
        {
            request.active = false;
            request.closed_at = Some(now);
            count += 1;
        }
        Ok(count)
    }
}
