//! User and group models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// User group (patron category)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Group {
    pub id: i32,
    pub name: String,
}

/// Library user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub group_id: Option<i32>,
    /// Accumulated overdue fines
    #[serde(default)]
    pub fine: i64,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }

    /// Whether the user belongs to the given group
    pub fn is_in(&self, group: &Group) -> bool {
        self.group_id == Some(group.id)
    }
}
