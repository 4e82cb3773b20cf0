#[cfg(test)]
mod tests {
    use arcana::config::DatabaseConfig;
    use arcana::db::{self, service::DbService};
    use serde_json::json;

    // In memory database just for tests
    fn get_test_db() -> db::DbPool {
        let config = DatabaseConfig {
            path: ":memory:".to_string(),
        };
        db::get_connection(&config).unwrap()
    }

    #[test]
    fn test_snapshot_upsert() {
        let pool = get_test_db();
        let conn = pool.lock().unwrap();

        // 1. Missing snapshot
        assert!(DbService::get_snapshot(&conn, "abc").unwrap().is_none());

        // 2. Insert, then overwrite the same id
        let first = r#"{"session_id":"abc"}"#;
        let second = r#"{"session_id":"abc","questions_asked":true}"#;
        DbService::upsert_snapshot(&conn, "abc", first).unwrap();
        assert_eq!(DbService::get_snapshot(&conn, "abc").unwrap().as_deref(), Some(first));

        DbService::upsert_snapshot(&conn, "abc", second).unwrap();
        assert_eq!(DbService::get_snapshot(&conn, "abc").unwrap().as_deref(), Some(second));

        // 3. Other ids are untouched
        DbService::upsert_snapshot(&conn, "xyz", first).unwrap();
        assert_eq!(DbService::get_snapshot(&conn, "abc").unwrap().as_deref(), Some(second));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM reading_sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_reading_lifecycle() {
        let pool = db::open_in_memory().unwrap();
        let conn = pool.lock().unwrap();

        let data = json!({"cards": [], "questions": ["Career?"], "history": []}).to_string();

        // 1. Insert readings for two users
        let first = DbService::insert_reading(&conn, 1, "Morning", Some("Career?"), &data).unwrap();
        let second = DbService::insert_reading(&conn, 1, "Evening", None, &data).unwrap();
        let foreign = DbService::insert_reading(&conn, 2, "Theirs", None, &data).unwrap();
        assert!(second > first);

        // 2. Listing is newest first and scoped to the owner
        let list = DbService::list_readings(&conn, 1, 10, 0).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second);
        assert_eq!(list[1].name, "Morning");
        assert_eq!(list[1].reading_data["questions"][0], "Career?");
        assert!(list[0].is_saved);

        // 3. Pagination
        let page = DbService::list_readings(&conn, 1, 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, first);
        assert_eq!(DbService::count_readings(&conn, 1).unwrap(), 2);

        // 4. Another user's reading is invisible
        assert!(DbService::get_reading(&conn, 1, foreign).unwrap().is_none());
        let own = DbService::get_reading(&conn, 1, first).unwrap().unwrap();
        assert_eq!(own.description.as_deref(), Some("Career?"));
    }

    #[test]
    fn test_layout_lifecycle() {
        let pool = db::open_in_memory().unwrap();
        let conn = pool.lock().unwrap();

        let cards = serde_json::to_string(&["The Fool", "The Moon", "The Sun"]).unwrap();

        // 1. Insert
        let id = DbService::insert_layout(&conn, 9, "Past/Present/Future", None, &cards).unwrap();

        // 2. List
        let layouts = DbService::list_layouts(&conn, 9).unwrap();
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].cards, vec!["The Fool", "The Moon", "The Sun"]);
        assert!(DbService::list_layouts(&conn, 10).unwrap().is_empty());

        // 3. Delete only works for the owner
        assert!(!DbService::delete_layout(&conn, 10, id).unwrap());
        assert!(DbService::delete_layout(&conn, 9, id).unwrap());
        assert!(!DbService::delete_layout(&conn, 9, id).unwrap());
    }
}
