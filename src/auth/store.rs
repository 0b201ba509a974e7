//! SQLite-backed credential and session store.
//!
//! Tables:
//! - `users`: email (unique, case-insensitive), bcrypt hash, profile, role,
//!   active flag
//! - `refresh_tokens`: per-user bounded list (capacity 5) of currently-honored
//!   refresh tokens, SHA-256 hashed at rest
//!
//! Membership in `refresh_tokens` is the sole server-side proof that a refresh
//! token is still usable; revocation is removal. Every mutation of the list
//! runs inside a transaction that re-enforces the capacity, so concurrent
//! logins and refreshes for the same user can never overwrite each other's
//! entries — there is no whole-list write anywhere.

use anyhow::Result;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::{epoch_secs, Db};

/// Maximum refresh tokens honored per user; oldest evicted first.
pub const REFRESH_TOKEN_CAPACITY: usize = 5;

/// User role for authorization gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }

    fn from_db(raw: &str) -> Role {
        match raw {
            "admin" => Role::Admin,
            _ => Role::Customer,
        }
    }
}

/// A registered user, safe for client responses (no secrets).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A user record joined with its password hash, for login verification only.
/// Never serialized.
#[derive(Debug)]
pub struct Credential {
    pub user: User,
    pub password_hash: String,
}

/// Input for user creation; the password is already hashed by the caller.
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
}

/// SQLite-backed store for users and their honored refresh tokens.
pub struct AuthStore {
    db: Db,
}

impl AuthStore {
    pub fn new(db: Db) -> Result<Self> {
        db.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                name TEXT NOT NULL,
                phone TEXT,
                role TEXT NOT NULL DEFAULT 'customer',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

            CREATE TABLE IF NOT EXISTS refresh_tokens (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                issued_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);",
        )?;
        Ok(Self { db })
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Create a user. Returns `None` when the email is already taken
    /// (case-insensitive).
    pub fn create_user(&self, new: NewUser) -> Result<Option<User>> {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: new.email.trim().to_lowercase(),
            name: new.name.trim().to_string(),
            phone: new.phone,
            role: new.role,
            is_active: true,
            created_at: epoch_secs(),
            updated_at: epoch_secs(),
        };

        let conn = self.db.lock();
        let result = conn.execute(
            "INSERT INTO users (id, email, password_hash, name, phone, role, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
            params![
                user.id,
                user.email,
                new.password_hash,
                user.name,
                user.phone,
                user.role.as_str(),
                user.created_at,
                user.updated_at,
            ],
        );

        match result {
            Ok(_) => Ok(Some(user)),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by email, including the password hash for verification.
    pub fn find_by_email(&self, email: &str) -> Result<Option<Credential>> {
        let conn = self.db.lock();
        let row = conn.query_row(
            "SELECT id, email, name, phone, role, is_active, created_at, updated_at, password_hash
             FROM users WHERE email = ?1",
            params![email.trim().to_lowercase()],
            |row| {
                Ok(Credential {
                    user: user_from_row(row)?,
                    password_hash: row.get(8)?,
                })
            },
        );
        optional(row)
    }

    pub fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.db.lock();
        let row = conn.query_row(
            "SELECT id, email, name, phone, role, is_active, created_at, updated_at
             FROM users WHERE id = ?1",
            params![user_id],
            user_from_row,
        );
        optional(row)
    }

    /// Flip the active flag. Returns false for unknown users.
    pub fn set_active(&self, user_id: &str, active: bool) -> Result<bool> {
        let conn = self.db.lock();
        let updated = conn.execute(
            "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active as i64, epoch_secs(), user_id],
        )?;
        Ok(updated > 0)
    }

    // ── Refresh tokens ──────────────────────────────────────────────

    /// Append a refresh token to the user's honored list, evicting the oldest
    /// entries beyond capacity. Unknown users are a no-op.
    pub fn add_refresh_token(&self, user_id: &str, token: &str) -> Result<()> {
        let hash = hash_token(token);
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO refresh_tokens (token_hash, user_id, issued_at)
             VALUES (?1, ?2, ?3)",
            params![hash, user_id, epoch_secs()],
        );
        match inserted {
            Ok(_) => {
                trim_to_capacity(&tx, user_id)?;
                tx.commit()?;
                Ok(())
            }
            // Foreign key violation: the user does not exist. Contract says
            // no-op, never an error.
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a refresh token. Idempotent; returns whether a row was removed.
    pub fn remove_refresh_token(&self, user_id: &str, token: &str) -> Result<bool> {
        let conn = self.db.lock();
        let removed = conn.execute(
            "DELETE FROM refresh_tokens WHERE user_id = ?1 AND token_hash = ?2",
            params![user_id, hash_token(token)],
        )?;
        Ok(removed > 0)
    }

    /// Is this refresh token still honored for this user?
    pub fn is_honored(&self, user_id: &str, token: &str) -> Result<bool> {
        let conn = self.db.lock();
        let row = conn.query_row(
            "SELECT 1 FROM refresh_tokens WHERE user_id = ?1 AND token_hash = ?2",
            params![user_id, hash_token(token)],
            |row| row.get::<_, i64>(0),
        );
        match row {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace `old` with `new` in the user's honored list.
    ///
    /// Single transaction: delete the old hash, and only if that removed a row
    /// insert the new one (then re-enforce capacity). Two concurrent rotations
    /// presenting the same old token serialize on the write lock and exactly
    /// one succeeds — the loser observes zero rows deleted and its transaction
    /// rolls back.
    pub fn rotate_refresh_token(&self, user_id: &str, old: &str, new: &str) -> Result<bool> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM refresh_tokens WHERE user_id = ?1 AND token_hash = ?2",
            params![user_id, hash_token(old)],
        )?;
        if removed == 0 {
            return Ok(false);
        }
        tx.execute(
            "INSERT OR IGNORE INTO refresh_tokens (token_hash, user_id, issued_at)
             VALUES (?1, ?2, ?3)",
            params![hash_token(new), user_id, epoch_secs()],
        )?;
        trim_to_capacity(&tx, user_id)?;
        tx.commit()?;
        Ok(true)
    }

    /// Number of currently-honored refresh tokens for a user.
    pub fn honored_count(&self, user_id: &str) -> Result<u64> {
        let conn = self.db.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Keep only the newest `REFRESH_TOKEN_CAPACITY` tokens for a user.
fn trim_to_capacity(tx: &rusqlite::Transaction<'_>, user_id: &str) -> rusqlite::Result<()> {
    tx.execute(
        "DELETE FROM refresh_tokens
         WHERE user_id = ?1 AND token_hash NOT IN (
             SELECT token_hash FROM refresh_tokens
             WHERE user_id = ?1
             ORDER BY issued_at DESC, rowid DESC
             LIMIT ?2
         )",
        params![user_id, REFRESH_TOKEN_CAPACITY as i64],
    )?;
    Ok(())
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        role: Role::from_db(&role),
        is_active: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn optional<T>(row: rusqlite::Result<T>) -> Result<Option<T>> {
    match row {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Hash a refresh token for at-rest storage (single SHA-256 pass — tokens are
/// already high-entropy signed blobs).
fn hash_token(token: &str) -> String {
    let mut h = Sha256::new();
    h.update(token.as_bytes());
    hex::encode(h.finalize())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> AuthStore {
        AuthStore::new(Db::open_in_memory().unwrap()).unwrap()
    }

    fn make_user(store: &AuthStore, email: &str) -> User {
        store
            .create_user(NewUser {
                email: email.into(),
                password_hash: "fake-hash".into(),
                name: "Test User".into(),
                phone: None,
                role: Role::Customer,
            })
            .unwrap()
            .expect("email free")
    }

    #[test]
    fn create_and_find_user() {
        let store = test_store();
        let user = make_user(&store, "a@x.com");

        let found = store.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(found.email, "a@x.com");
        assert!(found.is_active);

        let cred = store.find_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(cred.user.id, user.id);
        assert_eq!(cred.password_hash, "fake-hash");
    }

    #[test]
    fn duplicate_email_returns_none() {
        let store = test_store();
        make_user(&store, "a@x.com");
        let dup = store
            .create_user(NewUser {
                email: "A@X.COM".into(),
                password_hash: "h".into(),
                name: "Other".into(),
                phone: None,
                role: Role::Customer,
            })
            .unwrap();
        assert!(dup.is_none());
    }

    #[test]
    fn email_is_stored_lowercased() {
        let store = test_store();
        let user = store
            .create_user(NewUser {
                email: "  MiXeD@Case.Com ".into(),
                password_hash: "h".into(),
                name: "Mixed".into(),
                phone: None,
                role: Role::Customer,
            })
            .unwrap()
            .unwrap();
        assert_eq!(user.email, "mixed@case.com");
        assert!(store.find_by_email("mixed@CASE.com").unwrap().is_some());
    }

    #[test]
    fn token_add_honor_remove() {
        let store = test_store();
        let user = make_user(&store, "a@x.com");

        store.add_refresh_token(&user.id, "tok-1").unwrap();
        assert!(store.is_honored(&user.id, "tok-1").unwrap());
        assert!(!store.is_honored(&user.id, "tok-2").unwrap());

        assert!(store.remove_refresh_token(&user.id, "tok-1").unwrap());
        assert!(!store.is_honored(&user.id, "tok-1").unwrap());
        // Removal is idempotent.
        assert!(!store.remove_refresh_token(&user.id, "tok-1").unwrap());
    }

    #[test]
    fn unknown_user_ops_are_noops() {
        let store = test_store();
        store.add_refresh_token("ghost", "tok").unwrap();
        assert!(!store.is_honored("ghost", "tok").unwrap());
        assert!(!store.remove_refresh_token("ghost", "tok").unwrap());
        assert!(!store.rotate_refresh_token("ghost", "tok", "new").unwrap());
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let store = test_store();
        let user = make_user(&store, "a@x.com");

        for i in 0..7 {
            store
                .add_refresh_token(&user.id, &format!("tok-{i}"))
                .unwrap();
        }

        assert_eq!(store.honored_count(&user.id).unwrap(), 5);
        // Oldest two evicted, newest five remain.
        assert!(!store.is_honored(&user.id, "tok-0").unwrap());
        assert!(!store.is_honored(&user.id, "tok-1").unwrap());
        for i in 2..7 {
            assert!(store.is_honored(&user.id, &format!("tok-{i}")).unwrap());
        }
    }

    #[test]
    fn rotate_replaces_old_with_new() {
        let store = test_store();
        let user = make_user(&store, "a@x.com");
        store.add_refresh_token(&user.id, "old").unwrap();

        assert!(store.rotate_refresh_token(&user.id, "old", "new").unwrap());
        assert!(!store.is_honored(&user.id, "old").unwrap());
        assert!(store.is_honored(&user.id, "new").unwrap());
        assert_eq!(store.honored_count(&user.id).unwrap(), 1);
    }

    #[test]
    fn rotate_with_unhonored_old_fails_and_inserts_nothing() {
        let store = test_store();
        let user = make_user(&store, "a@x.com");
        store.add_refresh_token(&user.id, "old").unwrap();
        assert!(store.rotate_refresh_token(&user.id, "old", "new").unwrap());

        // Replay of the already-rotated token: rejected, and the attempted
        // replacement must not appear in the honored list.
        assert!(!store
            .rotate_refresh_token(&user.id, "old", "newer")
            .unwrap());
        assert!(!store.is_honored(&user.id, "newer").unwrap());
        assert_eq!(store.honored_count(&user.id).unwrap(), 1);
    }

    #[test]
    fn rotate_respects_capacity() {
        let store = test_store();
        let user = make_user(&store, "a@x.com");
        for i in 0..5 {
            store
                .add_refresh_token(&user.id, &format!("tok-{i}"))
                .unwrap();
        }
        assert!(store
            .rotate_refresh_token(&user.id, "tok-3", "rotated")
            .unwrap());
        assert_eq!(store.honored_count(&user.id).unwrap(), 5);
        assert!(store.is_honored(&user.id, "rotated").unwrap());
    }

    #[test]
    fn tokens_are_stored_hashed() {
        let store = test_store();
        let user = make_user(&store, "a@x.com");
        store.add_refresh_token(&user.id, "raw-token").unwrap();

        let raw_present: i64 = store
            .db
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM refresh_tokens WHERE token_hash = 'raw-token'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw_present, 0);
    }

    #[test]
    fn set_active_flips_flag() {
        let store = test_store();
        let user = make_user(&store, "a@x.com");
        assert!(store.set_active(&user.id, false).unwrap());
        assert!(!store.find_by_id(&user.id).unwrap().unwrap().is_active);
        assert!(!store.set_active("ghost", false).unwrap());
    }
}
