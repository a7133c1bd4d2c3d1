//! Catalog store: documents, copies, users and groups

use async_trait::async_trait;

use crate::{
    error::{AppError, AppResult},
    models::{
        copy::{CopyRow, CopyStatus, DocumentCopy},
        Document, Group, User,
    },
};

use super::transaction::PgUnitOfWork;

/// Read access to the catalog plus the few fields the lending core writes:
/// copy status, the document `requested` flag and user fines.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn lookup_group(&self, name: &str) -> AppResult<Option<Group>>;

    async fn get_document(&self, id: i32) -> AppResult<Document>;

    async fn get_copy(&self, id: i32) -> AppResult<DocumentCopy>;

    async fn get_user(&self, id: i32) -> AppResult<User>;

    /// Active copies of a document, lowest id first
    async fn document_active_copies(&self, document_id: i32) -> AppResult<Vec<DocumentCopy>>;

    /// Mark a copy checked out only if it is active and still available.
    /// Returns false when another operation got there first.
    async fn mark_checked_out(&self, copy_id: i32) -> AppResult<bool>;

    async fn mark_available(&self, copy_id: i32) -> AppResult<()>;

    async fn set_document_requested(&self, document_id: i32, requested: bool) -> AppResult<()>;

    /// Add a fine delta and return the updated user
    async fn add_fine(&self, user_id: i32, amount: i64) -> AppResult<User>;
}

#[async_trait]
impl CatalogStore for PgUnitOfWork {
    async fn lookup_group(&self, name: &str) -> AppResult<Option<Group>> {
        let mut conn = self.conn().await?;
        let group = sqlx::query_as::<_, Group>("SELECT id, name FROM groups WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut **conn)
            .await?;
        Ok(group)
    }

    async fn get_document(&self, id: i32) -> AppResult<Document> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, Document>(
            "SELECT id, title, active, keywords, requested FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document with id {} not found", id)))
    }

    async fn get_copy(&self, id: i32) -> AppResult<DocumentCopy> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, CopyRow>(
            "SELECT id, document_id, active, checked_out FROM copies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Copy with id {} not found", id)))?
        .try_into()
    }

    async fn get_user(&self, id: i32) -> AppResult<User> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, User>(
            "SELECT id, name, surname, email, group_id, fine FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn document_active_copies(&self, document_id: i32) -> AppResult<Vec<DocumentCopy>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, CopyRow>(
            r#"
            SELECT id, document_id, active, checked_out
            FROM copies
            WHERE document_id = $1 AND active
            ORDER BY id
            "#,
        )
        .bind(document_id)
        .fetch_all(&mut **conn)
        .await?;

        rows.into_iter().map(DocumentCopy::try_from).collect()
    }

    async fn mark_checked_out(&self, copy_id: i32) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let rows_affected = sqlx::query(
            "UPDATE copies SET checked_out = $2 WHERE id = $1 AND active AND checked_out = $3",
        )
        .bind(copy_id)
        .bind(i16::from(CopyStatus::CheckedOut))
        .bind(i16::from(CopyStatus::Available))
        .execute(&mut **conn)
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }

    async fn mark_available(&self, copy_id: i32) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let rows_affected = sqlx::query("UPDATE copies SET checked_out = $2 WHERE id = $1")
            .bind(copy_id)
            .bind(i16::from(CopyStatus::Available))
            .execute(&mut **conn)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("Copy with id {} not found", copy_id)));
        }
        Ok(())
    }

    async fn set_document_requested(&self, document_id: i32, requested: bool) -> AppResult<()> {
        let mut conn = self.conn().await?;
        sqlx::query("UPDATE documents SET requested = $2 WHERE id = $1")
            .bind(document_id)
            .bind(requested)
            .execute(&mut **conn)
            .await?;
        Ok(())
    }

    async fn add_fine(&self, user_id: i32, amount: i64) -> AppResult<User> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET fine = fine + $2
            WHERE id = $1
            RETURNING id, name, surname, email, group_id, fine
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut **conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))
    }
}
