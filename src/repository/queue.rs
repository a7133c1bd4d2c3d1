//! Per-document wait-list repository

use async_trait::async_trait;

use crate::{error::AppResult, models::QueueEntry};

use super::transaction::PgUnitOfWork;

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append the user to the document's queue. `None` if already queued.
    async fn push(&self, document_id: i32, user_id: i32) -> AppResult<Option<QueueEntry>>;

    /// Assign the copy to the oldest entry that has none yet
    async fn pop_next(&self, document_id: i32, copy_id: i32) -> AppResult<Option<QueueEntry>>;

    /// Remove and return the user's reservation (entry with an assigned copy)
    async fn remove_reservation_for(
        &self,
        document_id: i32,
        user_id: i32,
    ) -> AppResult<Option<QueueEntry>>;

    /// Remove the user's entry whether or not a copy was assigned
    async fn cancel(&self, document_id: i32, user_id: i32) -> AppResult<Option<QueueEntry>>;

    /// Discard every entry of the document and return what was discarded
    async fn flush(&self, document_id: i32) -> AppResult<Vec<QueueEntry>>;

    /// Entries in FIFO order
    async fn list(&self, document_id: i32) -> AppResult<Vec<QueueEntry>>;
}

#[async_trait]
impl QueueStore for PgUnitOfWork {
    async fn push(&self, document_id: i32, user_id: i32) -> AppResult<Option<QueueEntry>> {
        let mut conn = self.conn().await?;
        let entry = sqlx::query_as::<_, QueueEntry>(
            r#"
            INSERT INTO queue_entries (document_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (document_id, user_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(document_id)
        .bind(user_id)
        .fetch_optional(&mut **conn)
        .await?;
        Ok(entry)
    }

    async fn pop_next(&self, document_id: i32, copy_id: i32) -> AppResult<Option<QueueEntry>> {
        let mut conn = self.conn().await?;
        let entry = sqlx::query_as::<_, QueueEntry>(
            r#"
            UPDATE queue_entries SET assigned_copy_id = $2
            WHERE id = (
                SELECT id FROM queue_entries
                WHERE document_id = $1 AND assigned_copy_id IS NULL
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(document_id)
        .bind(copy_id)
        .fetch_optional(&mut **conn)
        .await?;
        Ok(entry)
    }

    async fn remove_reservation_for(
        &self,
        document_id: i32,
        user_id: i32,
    ) -> AppResult<Option<QueueEntry>> {
        let mut conn = self.conn().await?;
        let entry = sqlx::query_as::<_, QueueEntry>(
            r#"
            DELETE FROM queue_entries
            WHERE document_id = $1 AND user_id = $2 AND assigned_copy_id IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(document_id)
        .bind(user_id)
        .fetch_optional(&mut **conn)
        .await?;
        Ok(entry)
    }

    async fn cancel(&self, document_id: i32, user_id: i32) -> AppResult<Option<QueueEntry>> {
        let mut conn = self.conn().await?;
        let entry = sqlx::query_as::<_, QueueEntry>(
            "DELETE FROM queue_entries WHERE document_id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(document_id)
        .bind(user_id)
        .fetch_optional(&mut **conn)
        .await?;
        Ok(entry)
    }

    async fn flush(&self, document_id: i32) -> AppResult<Vec<QueueEntry>> {
        let mut conn = self.conn().await?;
        let entries = sqlx::query_as::<_, QueueEntry>(
            "DELETE FROM queue_entries WHERE document_id = $1 RETURNING *",
        )
        .bind(document_id)
        .fetch_all(&mut **conn)
        .await?;
        Ok(entries)
    }

    async fn list(&self, document_id: i32) -> AppResult<Vec<QueueEntry>> {
        let mut conn = self.conn().await?;
        let entries = sqlx::query_as::<_, QueueEntry>(
            "SELECT * FROM queue_entries WHERE document_id = $1 ORDER BY created_at, id",
        )
        .bind(document_id)
        .fetch_all(&mut **conn)
        .await?;
        Ok(entries)
    }
}
