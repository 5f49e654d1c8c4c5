use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::image::Image;
use crate::version::error::CacheError;
use crate::version::evaluation::StoredEvaluation;
use crate::version::storer::{Storer, evaluation_key, job_key, tags_key};

/// Value stored under a job key; only its presence matters
const QUEUED_MARKER: &str = "queued";

/// SQLite-backed key/value store where every entry expires after `ttl`
pub struct Cache {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl Cache {
    pub fn new(db_path: &Path, ttl: Duration) -> Result<Self, CacheError> {
        info!("Initializing cache database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        debug!("Database connection established");

        Self::with_connection(conn, ttl)
    }

    /// Cache that lives only as long as the process, used by tests and `--db :memory:`
    pub fn in_memory(ttl: Duration) -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?, ttl)
    }

    fn with_connection(conn: Connection, ttl: Duration) -> Result<Self, CacheError> {
        let cache = Self {
            conn: Mutex::new(conn),
            ttl,
        };

        cache.create_schema()?;
        info!(ttl_secs = ttl.as_secs(), "Cache initialized successfully");

        Ok(cache)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    fn current_timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_expires_at ON entries(expires_at)",
            [],
        )?;

        debug!("Database schema created successfully");
        Ok(())
    }

    /// Raw read of a live entry
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Self::current_timestamp_ms();
        let conn = self.lock_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM entries WHERE key = ?1 AND expires_at > ?2",
                (key, now),
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    /// Raw write, replacing any previous value and resetting its expiry
    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Self::current_timestamp_ms().saturating_add(ttl_ms);
        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            INSERT INTO entries (key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
            (key, value, expires_at),
        )?;

        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get_raw(key)? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let value = serde_json::to_string(value)?;
        self.set_raw(key, &value)
    }
}

impl Storer for Cache {
    fn get_tags(&self, image: &Image) -> Result<Option<Vec<String>>, CacheError> {
        self.get_json(&tags_key(image))
    }

    fn set_tags(&self, image: &Image, versions: &[String]) -> Result<(), CacheError> {
        debug!(
            "Saving {} versions for {}",
            versions.len(),
            image.full_name_without_tag()
        );
        self.set_json(&tags_key(image), versions)
    }

    fn mark_job_queued(&self, job_id: &str) -> Result<(), CacheError> {
        self.set_raw(&job_key(job_id), QUEUED_MARKER)
    }

    fn is_job_queued(&self, job_id: &str) -> Result<bool, CacheError> {
        Ok(self.get_raw(&job_key(job_id))?.is_some())
    }

    fn set_evaluation(
        &self,
        job_id: &str,
        evaluation: &StoredEvaluation,
    ) -> Result<(), CacheError> {
        self.set_json(&evaluation_key(job_id), evaluation)
    }

    fn get_evaluation(&self, job_id: &str) -> Result<Option<StoredEvaluation>, CacheError> {
        self.get_json(&evaluation_key(job_id))
    }

    fn gc(&self) -> Result<usize, CacheError> {
        let now = Self::current_timestamp_ms();
        let conn = self.lock_conn()?;

        let deleted = conn.execute("DELETE FROM entries WHERE expires_at <= ?1", [now])?;
        debug!("Removed {} expired cache entries", deleted);

        Ok(deleted)
    }

    fn ping(&self) -> Result<(), CacheError> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
