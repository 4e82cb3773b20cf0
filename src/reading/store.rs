use duckdb::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::auth::UserId;
use crate::db::{service::DbService, DbPool};
use crate::reading::error::{ReadingError, ReadingResult};
use crate::reading::session::ReadingSession;

/// How to treat a session id with no snapshot behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Fail with `NotFound`.
    Strict,
    /// Create and persist an empty anonymous session.
    CreateMissing,
}

/// One async mutex per session id. Entries nobody holds or waits on are
/// pruned on the next acquire.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(session_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Durable session snapshots keyed by session id. Saves always write the
/// whole session.
pub struct SessionStore {
    pool: DbPool,
    locks: SessionLocks,
}

impl SessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            locks: SessionLocks::default(),
        }
    }

    fn conn(&self) -> ReadingResult<MutexGuard<'_, Connection>> {
        self.pool.lock().map_err(|_| ReadingError::StoragePoisoned)
    }

    pub fn create(&self, session_id: &str, user_id: Option<UserId>) -> ReadingResult<ReadingSession> {
        let session = ReadingSession::new(session_id, user_id);
        self.save(&session)?;
        info!("Created reading session {}", session_id);
        Ok(session)
    }

    pub fn load(&self, session_id: &str) -> ReadingResult<ReadingSession> {
        self.peek(session_id, Lookup::Strict)
    }

    pub fn load_or_create(&self, session_id: &str) -> ReadingResult<ReadingSession> {
        match self.snapshot(session_id)? {
            Some(raw) => ReadingSession::from_snapshot(session_id, &raw),
            None => self.create(session_id, None),
        }
    }

    /// Reads a session without ever writing. Under `CreateMissing` a missing
    /// session comes back empty and in memory only; it is persisted by the
    /// first successful `update`.
    pub fn peek(&self, session_id: &str, lookup: Lookup) -> ReadingResult<ReadingSession> {
        match (self.snapshot(session_id)?, lookup) {
            (Some(raw), _) => ReadingSession::from_snapshot(session_id, &raw),
            (None, Lookup::Strict) => Err(ReadingError::NotFound(format!("Session {}", session_id))),
            (None, Lookup::CreateMissing) => Ok(ReadingSession::new(session_id, None)),
        }
    }

    pub fn save(&self, session: &ReadingSession) -> ReadingResult<()> {
        let snapshot = session.to_snapshot()?;
        let conn = self.conn()?;
        DbService::upsert_snapshot(&conn, &session.session_id, &snapshot)?;
        debug!(
            "Saved session {} ({} history entries)",
            session.session_id,
            session.history.len()
        );
        Ok(())
    }

    /// The raw persisted snapshot, if any.
    pub fn snapshot(&self, session_id: &str) -> ReadingResult<Option<String>> {
        let conn = self.conn()?;
        Ok(DbService::get_snapshot(&conn, session_id)?)
    }


    /// Loads the session under its lock, applies `apply`, and saves the
    /// result before releasing the lock. Nothing is written when `apply` fails.
    pub async fn update<T, F>(
        &self,
        session_id: &str,
        lookup: Lookup,
        apply: F,
    ) -> ReadingResult<(ReadingSession, T)>
    where
        F: FnOnce(&mut ReadingSession) -> ReadingResult<T>,
    {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.peek(session_id, lookup)?;
        let value = apply(&mut session)?;
        self.save(&session)?;
        Ok((session, value))
    }
}
