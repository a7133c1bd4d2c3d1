//! Outstanding requests repository

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::OutstandingRequest,
};

use super::transaction::PgUnitOfWork;

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// The active request of a document. Several active requests is a
    /// consistency error.
    async fn active_for(&self, document_id: i32) -> AppResult<Option<OutstandingRequest>>;

    async fn place(
        &self,
        document_id: i32,
        user_id: i32,
        librarian: &str,
    ) -> AppResult<OutstandingRequest>;

    /// Deactivate the user's active request on the document
    async fn close(&self, user_id: i32, document_id: i32, librarian: &str) -> AppResult<()>;

    /// Deactivate every active request of the document, returning how many
    async fn deactivate_all(&self, document_id: i32) -> AppResult<u64>;
}

/// Shared by every store: pick the single active request or report the clash
pub(crate) fn single_active(
    document_id: i32,
    mut active: Vec<OutstandingRequest>,
) -> AppResult<Option<OutstandingRequest>> {
    match active.len() {
        0 => Ok(None),
        1 => Ok(active.pop()),
        n => Err(AppError::Consistency(format!(
            "document {} has {} active requests",
            document_id, n
        ))),
    }
}

#[async_trait]
impl RequestStore for PgUnitOfWork {
    async fn active_for(&self, document_id: i32) -> AppResult<Option<OutstandingRequest>> {
        let mut conn = self.conn().await?;
        let active = sqlx::query_as::<_, OutstandingRequest>(
            "SELECT * FROM requests WHERE document_id = $1 AND active ORDER BY id",
        )
        .bind(document_id)
        .fetch_all(&mut **conn)
        .await?;

        single_active(document_id, active)
    }

    async fn place(
        &self,
        document_id: i32,
        user_id: i32,
        librarian: &str,
    ) -> AppResult<OutstandingRequest> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, OutstandingRequest>(
            r#"
            INSERT INTO requests (document_id, user_id, librarian, active, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING *
            "#,
        )
        .bind(document_id)
        .bind(user_id)
        .bind(librarian)
        .bind(Utc::now())
        .fetch_one(&mut **conn)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => AppError::Consistency(format!(
                "document {} already has an active request",
                document_id
            )),
            _ => AppError::Database(e),
        })
    }

    async fn close(&self, user_id: i32, document_id: i32, librarian: &str) -> AppResult<()> {
        let mut conn = self.conn().await?;
        sqlx::query(
            r#"
            UPDATE requests SET active = FALSE, closed_by = $3, closed_at = $4
            WHERE user_id = $1 AND document_id = $2 AND active
            "#,
        )
        .bind(user_id)
        .bind(document_id)
        .bind(librarian)
        .bind(Utc::now())
        .execute(&mut **conn)
        .await?;
        Ok(())
    }

    async fn deactivate_all(&self, document_id: i32) -> AppResult<u64> {
        let mut conn = self.conn().await?;
        let rows_affected = sqlx::query(
            "UPDATE requests SET active = FALSE, closed_at = $2 WHERE document_id = $1 AND active",
        )
        .bind(document_id)
        .bind(Utc::now())
        .execute(&mut **conn)
        .await?
        .rows_affected();
        Ok(rows_affected)
    }
}
