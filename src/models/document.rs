//! Document (catalog title) model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Keyword marking a document as reference-only (never circulates)
pub const REFERENCE_KEYWORD: &str = "reference";

/// Document as seen by the lending core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Document {
    pub id: i32,
    pub title: String,
    pub active: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// True while an outstanding request is active for this document
    #[serde(default)]
    pub requested: bool,
}

impl Document {
    pub fn is_reference(&self) -> bool {
        self.keywords.iter().any(|k| k == REFERENCE_KEYWORD)
    }
}
