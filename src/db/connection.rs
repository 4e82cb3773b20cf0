use crate::config::DatabaseConfig;
use duckdb::{Connection, Result as DbResult};
use std::sync::{Arc, Mutex};
use tracing::info;

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = r#"
CREATE SEQUENCE IF NOT EXISTS seq_readings_id;
CREATE SEQUENCE IF NOT EXISTS seq_layouts_id;

CREATE TABLE IF NOT EXISTS reading_sessions (
    id VARCHAR PRIMARY KEY,
    snapshot TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS tarot_readings (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_readings_id'),
    user_id BIGINT NOT NULL,
    reading_name VARCHAR NOT NULL,
    description VARCHAR,
    reading_data TEXT NOT NULL,
    is_saved BOOLEAN DEFAULT TRUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS saved_layouts (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_layouts_id'),
    user_id BIGINT NOT NULL,
    name VARCHAR NOT NULL,
    description VARCHAR,
    cards TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_readings_user ON tarot_readings(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_layouts_user ON saved_layouts(user_id, created_at);
"#;

pub fn get_connection(config: &DatabaseConfig) -> DbResult<DbPool> {
    info!("Connecting to DuckDB at {}", config.path);
    let conn = Connection::open(&config.path)?;

    init_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// Fresh in-memory database with the schema applied.
pub fn open_in_memory() -> DbResult<DbPool> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn init_schema(conn: &Connection) -> DbResult<()> {
    info!("Initializing database schema");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
