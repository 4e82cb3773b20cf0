use duckdb::Connection;
use serde::Serialize;
use serde_json::json;
use std::sync::MutexGuard;
use tracing::info;

use crate::auth::UserId;
use crate::db::{service::DbService, DbPool, ReadingRecord, SavedLayout};
use crate::reading::error::{ReadingError, ReadingResult};
use crate::reading::session::ReadingSession;

const DESCRIPTION_CHARS: usize = 100;

#[derive(Debug, Serialize)]
pub struct ReadingPage {
    pub readings: Vec<ReadingRecord>,
    pub total: i64,
}

/// Durable readings and layouts, always scoped to their owner.
#[derive(Clone)]
pub struct ReadingArchive {
    pool: DbPool,
}

/// First response cut to 100 characters.
pub fn default_description(session: &ReadingSession) -> Option<String> {
    session
        .first_response()
        .map(|r| r.chars().take(DESCRIPTION_CHARS).collect())
}

impl ReadingArchive {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> ReadingResult<MutexGuard<'_, Connection>> {
        self.pool.lock().map_err(|_| ReadingError::StoragePoisoned)
    }

    /// Writes the session as a saved reading. Anonymous sessions cannot be
    /// saved: they yield `None` and nothing is written.
    pub fn persist(
        &self,
        session: &ReadingSession,
        name: &str,
        description: Option<&str>,
    ) -> ReadingResult<Option<i64>> {
        let Some(user_id) = session.user_id else {
            return Ok(None);
        };

        let description = description
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string)
            .or_else(|| default_description(session))
            .unwrap_or_else(|| name.to_string());

        let reading_data = json!({
            "cards": session.cards,
            "questions": session.user_responses,
            "history": session.history,
        })
        .to_string();

        let conn = self.conn()?;
        let id = DbService::insert_reading(&conn, user_id, name, Some(&description), &reading_data)?;
        info!("Saved session {} as reading {} for user {}", session.session_id, id, user_id);
        Ok(Some(id))
    }

    pub fn readings_for_user(&self, user_id: UserId, limit: usize, offset: usize) -> ReadingResult<ReadingPage> {
        let conn = self.conn()?;
        let readings = DbService::list_readings(&conn, user_id, limit, offset)?;
        let total = DbService::count_readings(&conn, user_id)?;
        Ok(ReadingPage { readings, total })
    }

    pub fn count_for_user(&self, user_id: UserId) -> ReadingResult<i64> {
        let conn = self.conn()?;
        Ok(DbService::count_readings(&conn, user_id)?)
    }

    pub fn reading_for_user(&self, user_id: UserId, reading_id: i64) -> ReadingResult<ReadingRecord> {
        let conn = self.conn()?;
        DbService::get_reading(&conn, user_id, reading_id)?
            .ok_or_else(|| ReadingError::NotFound(format!("Reading {}", reading_id)))
    }

    pub fn save_layout(
        &self,
        user_id: UserId,
        name: &str,
        description: Option<&str>,
        cards: &[String],
    ) -> ReadingResult<i64> {
        if name.trim().is_empty() {
            return Err(ReadingError::validation("Layout name is required"));
        }
        if cards.is_empty() {
            return Err(ReadingError::validation("Layout cards are required"));
        }
        let cards_json = serde_json::to_string(cards)?;
        let conn = self.conn()?;
        Ok(DbService::insert_layout(&conn, user_id, name, description, &cards_json)?)
    }

    pub fn layouts_for_user(&self, user_id: UserId) -> ReadingResult<Vec<SavedLayout>> {
        let conn = self.conn()?;
        Ok(DbService::list_layouts(&conn, user_id)?)
    }

    pub fn delete_layout(&self, user_id: UserId, layout_id: i64) -> ReadingResult<()> {
        let conn = self.conn()?;
        if DbService::delete_layout(&conn, user_id, layout_id)? {
            Ok(())
        } else {
            Err(ReadingError::NotFound(format!("Layout {}", layout_id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_is_truncated_by_characters() {
        let mut session = ReadingSession::new("s", None);
        assert_eq!(default_description(&session), None);

        let long = "я".repeat(150);
        session.submit_questions(&[long]);
        let description = default_description(&session).unwrap();
        assert_eq!(description.chars().count(), 100);
    }
}
