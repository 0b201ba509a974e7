//! SQLite-backed coupon store.
//!
//! Answers "does this code exist and is it live" only — discount arithmetic
//! is outside this service.

use anyhow::Result;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::{epoch_secs, Db};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: String,
    /// Uppercase, unique.
    pub code: String,
    pub description: String,
    pub is_active: bool,
    /// Unix seconds; `None` means no expiry.
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCoupon {
    pub code: String,
    pub description: String,
    pub expires_at: Option<i64>,
}

pub struct CouponStore {
    db: Db,
}

impl CouponStore {
    pub fn new(db: Db) -> Result<Self> {
        db.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS coupons (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                expires_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self { db })
    }

    /// Create a coupon. Returns `None` when the code is already taken.
    pub fn create(&self, new: NewCoupon) -> Result<Option<Coupon>> {
        let coupon = Coupon {
            id: uuid::Uuid::new_v4().to_string(),
            code: new.code.trim().to_uppercase(),
            description: new.description.trim().to_string(),
            is_active: true,
            expires_at: new.expires_at,
            created_at: epoch_secs(),
            updated_at: epoch_secs(),
        };
        let result = self.db.lock().execute(
            "INSERT INTO coupons (id, code, description, is_active, expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)",
            params![
                coupon.id,
                coupon.code,
                coupon.description,
                coupon.expires_at,
                coupon.created_at,
                coupon.updated_at,
            ],
        );
        match result {
            Ok(_) => Ok(Some(coupon)),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find a coupon by code (case-insensitive), regardless of liveness.
    pub fn find(&self, code: &str) -> Result<Option<Coupon>> {
        let conn = self.db.lock();
        let row = conn.query_row(
            &format!("SELECT {COLUMNS} FROM coupons WHERE code = ?1"),
            params![code.trim().to_uppercase()],
            coupon_from_row,
        );
        match row {
            Ok(coupon) => Ok(Some(coupon)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Active, unexpired coupons.
    pub fn list_active(&self) -> Result<Vec<Coupon>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM coupons
             WHERE is_active = 1 AND (expires_at IS NULL OR expires_at > ?1)
             ORDER BY code"
        ))?;
        let rows = stmt
            .query_map(params![epoch_secs()], coupon_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn deactivate(&self, id: &str) -> Result<bool> {
        let updated = self.db.lock().execute(
            "UPDATE coupons SET is_active = 0, updated_at = ?1 WHERE id = ?2",
            params![epoch_secs(), id],
        )?;
        Ok(updated > 0)
    }
}

const COLUMNS: &str = "id, code, description, is_active, expires_at, created_at, updated_at";

fn coupon_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Coupon> {
    Ok(Coupon {
        id: row.get(0)?,
        code: row.get(1)?,
        description: row.get(2)?,
        is_active: row.get::<_, i64>(3)? != 0,
        expires_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> CouponStore {
        CouponStore::new(Db::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn codes_are_uppercased_and_unique() {
        let store = test_store();
        let coupon = store
            .create(NewCoupon {
                code: "welcome10".into(),
                description: "10% off first order".into(),
                expires_at: None,
            })
            .unwrap()
            .unwrap();
        assert_eq!(coupon.code, "WELCOME10");

        assert!(store
            .create(NewCoupon {
                code: "WELCOME10".into(),
                description: "dup".into(),
                expires_at: None,
            })
            .unwrap()
            .is_none());

        assert!(store.find("Welcome10").unwrap().is_some());
    }

    #[test]
    fn list_active_excludes_expired_and_deactivated() {
        let store = test_store();
        store
            .create(NewCoupon {
                code: "LIVE".into(),
                description: "live".into(),
                expires_at: None,
            })
            .unwrap()
            .unwrap();
        store
            .create(NewCoupon {
                code: "EXPIRED".into(),
                description: "old".into(),
                expires_at: Some(epoch_secs() - 60),
            })
            .unwrap()
            .unwrap();
        let dead = store
            .create(NewCoupon {
                code: "DEAD".into(),
                description: "off".into(),
                expires_at: None,
            })
            .unwrap()
            .unwrap();
        assert!(store.deactivate(&dead.id).unwrap());

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].code, "LIVE");
    }
}
