use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::UserId;

/// A saved reading. `reading_data` holds `{cards, questions, history}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub reading_data: serde_json::Value,
    pub is_saved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedLayout {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub cards: Vec<String>,
    pub created_at: DateTime<Utc>,
}
