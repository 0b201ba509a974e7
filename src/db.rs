//! Shared SQLite handle for all stores.
//!
//! One database file holds every table (users, refresh tokens, dishes,
//! reservations, orders, reviews, coupons); each store receives a clone of
//! the handle and creates its own schema in its constructor.

use anyhow::Result;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Cloneable handle around the single SQLite connection.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl Db {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: rusqlite::Connection) -> Result<Self> {
        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the underlying connection.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock()
    }

    /// Liveness probe for the health endpoint.
    pub fn ping(&self) -> bool {
        self.lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
