//! Outstanding request model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Librarian-placed standing claim on a document, served before the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OutstandingRequest {
    pub id: i32,
    pub document_id: i32,
    pub user_id: i32,
    /// Librarian who placed the request
    pub librarian: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub closed_by: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
}
