//! Copy (physical circulating instance) model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::AppError;

/// Circulation status of a copy, stored as `checked_out`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum CopyStatus {
    Available = 0,
    /// On loan, or held for a queued user
    CheckedOut = 2,
}

impl TryFrom<i16> for CopyStatus {
    type Error = AppError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(CopyStatus::Available),
            2 => Ok(CopyStatus::CheckedOut),
            other => Err(AppError::Consistency(format!(
                "unknown copy status {}",
                other
            ))),
        }
    }
}

impl From<CopyStatus> for i16 {
    fn from(s: CopyStatus) -> Self {
        s as i16
    }
}

/// Copy model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DocumentCopy {
    pub id: i32,
    pub document_id: i32,
    pub active: bool,
    pub checked_out: CopyStatus,
}

impl DocumentCopy {
    /// Active and not on loan or held
    pub fn is_available(&self) -> bool {
        self.active && self.checked_out == CopyStatus::Available
    }
}

/// Raw copy row from database
#[derive(Debug, FromRow)]
pub struct CopyRow {
    pub id: i32,
    pub document_id: i32,
    pub active: bool,
    pub checked_out: i16,
}

impl TryFrom<CopyRow> for DocumentCopy {
    type Error = AppError;

    fn try_from(row: CopyRow) -> Result<Self, Self::Error> {
        let checked_out = CopyStatus::try_from(row.checked_out).map_err(|_| {
            AppError::Consistency(format!(
                "copy {} has unknown checked_out value {}",
                row.id, row.checked_out
            ))
        })?;
        Ok(DocumentCopy {
            id: row.id,
            document_id: row.document_id,
            active: row.active,
            checked_out,
        })
    }
}
