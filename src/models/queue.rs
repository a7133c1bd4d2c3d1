//! Wait-list entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// A user waiting for a copy of a document.
///
/// Once a freed copy is assigned the entry becomes a reservation: the copy is
/// held until the user checks it out, which consumes the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct QueueEntry {
    pub id: i32,
    pub document_id: i32,
    pub user_id: i32,
    pub assigned_copy_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn is_reservation(&self) -> bool {
        self.assigned_copy_id.is_some()
    }
}
