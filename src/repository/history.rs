//! History ledger repository

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    error::{AppError, AppResult},
    models::{HistoryEntry, NewHistoryEntry},
};

use super::transaction::PgUnitOfWork;

/// Append-only record of check-outs, returns and renewals
#[async_trait]
pub trait HistoryLedger: Send + Sync {
    async fn open(&self, entry: NewHistoryEntry) -> AppResult<HistoryEntry>;

    async fn get(&self, id: i32) -> AppResult<HistoryEntry>;

    /// Open entries referencing a copy. More than one means a broken invariant.
    async fn open_for_copy(&self, copy_id: i32) -> AppResult<Vec<HistoryEntry>>;

    /// Whether the user has an open loan on any copy of the document
    async fn has_open_loan(&self, user_id: i32, document_id: i32) -> AppResult<bool>;

    /// Close an entry if it is still open. `None` when it was already closed.
    async fn close(
        &self,
        id: i32,
        librarian: &str,
        date: NaiveDate,
    ) -> AppResult<Option<HistoryEntry>>;

    /// All entries of a user, oldest first
    async fn for_user(&self, user_id: i32) -> AppResult<Vec<HistoryEntry>>;
}

const ENTRY_COLUMNS: &str =
    "id, user_id, copy_id, librarian_co, date_check_out, librarian_re, date_return, renewed";

#[async_trait]
impl HistoryLedger for PgUnitOfWork {
    async fn open(&self, entry: NewHistoryEntry) -> AppResult<HistoryEntry> {
        let mut conn = self.conn().await?;
        let query = format!(
            r#"
            INSERT INTO history (user_id, copy_id, librarian_co, date_check_out, renewed)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );

        sqlx::query_as::<_, HistoryEntry>(&query)
            .bind(entry.user_id)
            .bind(entry.copy_id)
            .bind(&entry.librarian_co)
            .bind(entry.date_check_out)
            .bind(entry.renewed)
            .fetch_one(&mut **conn)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => AppError::Consistency(format!(
                    "copy {} already has an open loan",
                    entry.copy_id
                )),
                _ => AppError::Database(e),
            })
    }

    async fn get(&self, id: i32) -> AppResult<HistoryEntry> {
        let mut conn = self.conn().await?;
        let query = format!("SELECT {} FROM history WHERE id = $1", ENTRY_COLUMNS);
        sqlx::query_as::<_, HistoryEntry>(&query)
            .bind(id)
            .fetch_optional(&mut **conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("History entry with id {} not found", id)))
    }

    async fn open_for_copy(&self, copy_id: i32) -> AppResult<Vec<HistoryEntry>> {
        let mut conn = self.conn().await?;
        let query = format!(
            "SELECT {} FROM history WHERE copy_id = $1 AND date_return IS NULL ORDER BY id",
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<_, HistoryEntry>(&query)
            .bind(copy_id)
            .fetch_all(&mut **conn)
            .await?;
        Ok(entries)
    }

    async fn has_open_loan(&self, user_id: i32, document_id: i32) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM history h
                JOIN copies c ON h.copy_id = c.id
                WHERE h.user_id = $1 AND c.document_id = $2 AND h.date_return IS NULL
            )
            "#,
        )
        .bind(user_id)
        .bind(document_id)
        .fetch_one(&mut **conn)
        .await?;
        Ok(exists)
    }

    async fn close(
        &self,
        id: i32,
        librarian: &str,
        date: NaiveDate,
    ) -> AppResult<Option<HistoryEntry>> {
        let mut conn = self.conn().await?;
        let query = format!(
            r#"
            UPDATE history SET date_return = $2, librarian_re = $3
            WHERE id = $1 AND date_return IS NULL
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );
        let entry = sqlx::query_as::<_, HistoryEntry>(&query)
            .bind(id)
            .bind(date)
            .bind(librarian)
            .fetch_optional(&mut **conn)
            .await?;
        Ok(entry)
    }

    async fn for_user(&self, user_id: i32) -> AppResult<Vec<HistoryEntry>> {
        let mut conn = self.conn().await?;
        let query = format!(
            "SELECT {} FROM history WHERE user_id = $1 ORDER BY date_check_out, id",
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<_, HistoryEntry>(&query)
            .bind(user_id)
            .fetch_all(&mut **conn)
            .await?;
        Ok(entries)
    }
}
