//! History ledger entry model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// One lending event. An entry without `date_return` is an open loan.
///
/// Entries are append-only: a return or a renewal closes the entry, a renewal
/// opens a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct HistoryEntry {
    pub id: i32,
    pub user_id: i32,
    pub copy_id: i32,
    /// Librarian who checked the copy out
    pub librarian_co: String,
    pub date_check_out: NaiveDate,
    /// Librarian who processed the return
    pub librarian_re: Option<String>,
    pub date_return: Option<NaiveDate>,
    pub renewed: bool,
}

impl HistoryEntry {
    pub fn is_open(&self) -> bool {
        self.date_return.is_none()
    }
}

/// Data for a new ledger entry
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub user_id: i32,
    pub copy_id: i32,
    pub librarian_co: String,
    pub date_check_out: NaiveDate,
    pub renewed: bool,
}
