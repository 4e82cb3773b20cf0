use crate::auth::UserId;
use crate::db::models::{ReadingRecord, SavedLayout};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection, Result as DbResult, Row};

pub struct DbService;

const READING_COLUMNS: &str =
    "id, user_id, reading_name, description, reading_data, is_saved, CAST(created_at AS VARCHAR)";

const LAYOUT_COLUMNS: &str = "id, user_id, name, description, cards, CAST(created_at AS VARCHAR)";

/// DuckDB renders `CAST(ts AS VARCHAR)` as `YYYY-MM-DD HH:MM:SS[.ffffff]` without a zone.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

impl DbService {
    fn row_to_reading(row: &Row) -> DbResult<ReadingRecord> {
        let data_str: String = row.get(4)?;
        // Rows written by older clients may not be valid JSON; keep them as a raw string
        let reading_data = serde_json::from_str(&data_str)
            .unwrap_or_else(|_| serde_json::Value::String(data_str.clone()));
        let created_str: String = row.get(6)?;

        Ok(ReadingRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get::<_, Option<String>>(3)?,
            reading_data,
            is_saved: row.get::<_, Option<bool>>(5)?.unwrap_or(true),
            created_at: parse_timestamp(&created_str),
        })
    }

    fn row_to_layout(row: &Row) -> DbResult<SavedLayout> {
        let cards_str: String = row.get(4)?;
        let cards = serde_json::from_str(&cards_str).unwrap_or_default();
        let created_str: String = row.get(5)?;

        Ok(SavedLayout {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get::<_, Option<String>>(3)?,
            cards,
            created_at: parse_timestamp(&created_str),
        })
    }

    // --- Session Snapshots ---

    pub fn upsert_snapshot(conn: &Connection, session_id: &str, snapshot: &str) -> DbResult<()> {
        conn.execute(
            "INSERT INTO reading_sessions (id, snapshot) VALUES (?, ?)
             ON CONFLICT (id) DO UPDATE SET snapshot = excluded.snapshot, updated_at = now()",
            params![session_id, snapshot],
        )?;
        Ok(())
    }

    pub fn get_snapshot(conn: &Connection, session_id: &str) -> DbResult<Option<String>> {
        let mut stmt = conn.prepare("SELECT snapshot FROM reading_sessions WHERE id = ?")?;
        let mut rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // --- Readings ---

    pub fn insert_reading(
        conn: &Connection,
        user_id: UserId,
        name: &str,
        description: Option<&str>,
        reading_data: &str,
    ) -> DbResult<i64> {
        conn.query_row(
            "INSERT INTO tarot_readings (user_id, reading_name, description, reading_data, is_saved)
             VALUES (?, ?, ?, ?, TRUE)
             RETURNING id",
            params![user_id, name, description, reading_data],
            |row| row.get(0),
        )
    }

    pub fn list_readings(
        conn: &Connection,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> DbResult<Vec<ReadingRecord>> {
        let sql = format!(
            "SELECT {} FROM tarot_readings WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            READING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![user_id, limit as i64, offset as i64],
            Self::row_to_reading,
        )?;

        let mut readings = Vec::new();
        for row in rows {
            readings.push(row?);
        }
        Ok(readings)
    }

    pub fn count_readings(conn: &Connection, user_id: UserId) -> DbResult<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM tarot_readings WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )
    }

    pub fn get_reading(conn: &Connection, user_id: UserId, reading_id: i64) -> DbResult<Option<ReadingRecord>> {
        let sql = format!(
            "SELECT {} FROM tarot_readings WHERE id = ? AND user_id = ?",
            READING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![reading_id, user_id], Self::row_to_reading)?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // --- Layouts ---

    pub fn insert_layout(
        conn: &Connection,
        user_id: UserId,
        name: &str,
        description: Option<&str>,
        cards: &str,
    ) -> DbResult<i64> {
        conn.query_row(
            "INSERT INTO saved_layouts (user_id, name, description, cards)
             VALUES (?, ?, ?, ?)
             RETURNING id",
            params![user_id, name, description, cards],
            |row| row.get(0),
        )
    }

    pub fn list_layouts(conn: &Connection, user_id: UserId) -> DbResult<Vec<SavedLayout>> {
        let sql = format!(
            "SELECT {} FROM saved_layouts WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            LAYOUT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], Self::row_to_layout)?;

        let mut layouts = Vec::new();
        for row in rows {
            layouts.push(row?);
        }
        Ok(layouts)
    }

    /// Returns false when no layout with that id belongs to the user.
    pub fn delete_layout(conn: &Connection, user_id: UserId, layout_id: i64) -> DbResult<bool> {
        let affected = conn.execute(
            "DELETE FROM saved_layouts WHERE id = ? AND user_id = ?",
            params![layout_id, user_id],
        )?;
        Ok(affected > 0)
    }
}
