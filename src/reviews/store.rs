//! SQLite-backed review store. One review per user per dish.

use anyhow::Result;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::{epoch_secs, Db};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub user_id: String,
    pub dish_id: String,
    /// 1–5.
    pub rating: u8,
    pub comment: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub dish_id: String,
    pub rating: u8,
    pub comment: String,
}

pub enum CreateReview {
    Created(Review),
    /// This user already reviewed this dish.
    Duplicate,
    DishMissing,
}

pub struct ReviewStore {
    db: Db,
}

impl ReviewStore {
    pub fn new(db: Db) -> Result<Self> {
        db.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                dish_id TEXT NOT NULL REFERENCES dishes(id) ON DELETE CASCADE,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (user_id, dish_id)
            );
            CREATE INDEX IF NOT EXISTS idx_reviews_dish ON reviews(dish_id);",
        )?;
        Ok(Self { db })
    }

    pub fn create(&self, user_id: &str, new: NewReview) -> Result<CreateReview> {
        let conn = self.db.lock();

        let dish_exists: bool = conn
            .query_row(
                "SELECT 1 FROM dishes WHERE id = ?1",
                params![new.dish_id],
                |row| row.get::<_, i64>(0),
            )
            .map(|_| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(other),
            })?;
        if !dish_exists {
            return Ok(CreateReview::DishMissing);
        }

        let review = Review {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            dish_id: new.dish_id,
            rating: new.rating,
            comment: new.comment.trim().to_string(),
            created_at: epoch_secs(),
            updated_at: epoch_secs(),
        };
        let result = conn.execute(
            "INSERT INTO reviews (id, user_id, dish_id, rating, comment, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                review.id,
                review.user_id,
                review.dish_id,
                review.rating,
                review.comment,
                review.created_at,
                review.updated_at,
            ],
        );
        match result {
            Ok(_) => Ok(CreateReview::Created(review)),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(CreateReview::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_for_dish(&self, dish_id: &str) -> Result<Vec<Review>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, dish_id, rating, comment, created_at, updated_at
             FROM reviews WHERE dish_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![dish_id], review_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete a review: owners may delete their own, admins any.
    pub fn delete(&self, id: &str, requester_id: &str, is_admin: bool) -> Result<bool> {
        let conn = self.db.lock();
        let deleted = if is_admin {
            conn.execute("DELETE FROM reviews WHERE id = ?1", params![id])?
        } else {
            conn.execute(
                "DELETE FROM reviews WHERE id = ?1 AND user_id = ?2",
                params![id, requester_id],
            )?
        };
        Ok(deleted > 0)
    }
}

fn review_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        user_id: row.get(1)?,
        dish_id: row.get(2)?,
        rating: row.get(3)?,
        comment: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{AuthStore, NewUser, Role};
    use crate::menu::{Category, DishStore, NewDish, SpiceLevel};

    fn fixture() -> (ReviewStore, String, String) {
        let db = Db::open_in_memory().unwrap();
        let auth = AuthStore::new(db.clone()).unwrap();
        let dishes = DishStore::new(db.clone()).unwrap();
        let reviews = ReviewStore::new(db).unwrap();

        let user = auth
            .create_user(NewUser {
                email: "a@x.com".into(),
                password_hash: "h".into(),
                name: "A B".into(),
                phone: None,
                role: Role::Customer,
            })
            .unwrap()
            .unwrap();
        let dish = dishes
            .create(NewDish {
                name: "Ramen".into(),
                description: "A test dish".into(),
                price: 14.0,
                category: Category::Main,
                is_vegetarian: false,
                spice_level: SpiceLevel::Medium,
                is_available: true,
            })
            .unwrap();
        (reviews, user.id, dish.id)
    }

    #[test]
    fn one_review_per_user_per_dish() {
        let (store, user_id, dish_id) = fixture();

        let first = store
            .create(
                &user_id,
                NewReview {
                    dish_id: dish_id.clone(),
                    rating: 5,
                    comment: "Great".into(),
                },
            )
            .unwrap();
        assert!(matches!(first, CreateReview::Created(_)));

        let second = store
            .create(
                &user_id,
                NewReview {
                    dish_id: dish_id.clone(),
                    rating: 1,
                    comment: "Changed my mind".into(),
                },
            )
            .unwrap();
        assert!(matches!(second, CreateReview::Duplicate));
        assert_eq!(store.list_for_dish(&dish_id).unwrap().len(), 1);
    }

    #[test]
    fn review_requires_existing_dish() {
        let (store, user_id, _) = fixture();
        let outcome = store
            .create(
                &user_id,
                NewReview {
                    dish_id: "ghost".into(),
                    rating: 3,
                    comment: "?".into(),
                },
            )
            .unwrap();
        assert!(matches!(outcome, CreateReview::DishMissing));
    }

    #[test]
    fn delete_owner_and_admin_rules() {
        let (store, user_id, dish_id) = fixture();
        let CreateReview::Created(review) = store
            .create(
                &user_id,
                NewReview {
                    dish_id,
                    rating: 4,
                    comment: "Nice".into(),
                },
            )
            .unwrap()
        else {
            panic!("expected created");
        };

        // A stranger cannot delete it, an admin can.
        assert!(!store.delete(&review.id, "stranger", false).unwrap());
        assert!(store.delete(&review.id, "stranger", true).unwrap());
        assert!(!store.delete(&review.id, &user_id, false).unwrap());
    }
}
