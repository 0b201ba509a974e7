//! SQLite-backed dish catalogue store.
//!
//! Prices are stored verbatim and never computed on — billing is outside
//! this service.

use anyhow::Result;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::{epoch_secs, Db};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Appetizer,
    Main,
    Dessert,
    Beverage,
    Special,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Appetizer => "appetizer",
            Category::Main => "main",
            Category::Dessert => "dessert",
            Category::Beverage => "beverage",
            Category::Special => "special",
        }
    }

    pub fn parse(raw: &str) -> Option<Category> {
        match raw {
            "appetizer" => Some(Category::Appetizer),
            "main" => Some(Category::Main),
            "dessert" => Some(Category::Dessert),
            "beverage" => Some(Category::Beverage),
            "special" => Some(Category::Special),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpiceLevel {
    Mild,
    Medium,
    Hot,
    VeryHot,
}

impl SpiceLevel {
    fn as_str(self) -> &'static str {
        match self {
            SpiceLevel::Mild => "mild",
            SpiceLevel::Medium => "medium",
            SpiceLevel::Hot => "hot",
            SpiceLevel::VeryHot => "very-hot",
        }
    }

    fn from_db(raw: &str) -> SpiceLevel {
        match raw {
            "medium" => SpiceLevel::Medium,
            "hot" => SpiceLevel::Hot,
            "very-hot" => SpiceLevel::VeryHot,
            _ => SpiceLevel::Mild,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: Category,
    pub is_vegetarian: bool,
    pub spice_level: SpiceLevel,
    pub is_available: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDish {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: Category,
    #[serde(default)]
    pub is_vegetarian: bool,
    #[serde(default = "default_spice")]
    pub spice_level: SpiceLevel,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_spice() -> SpiceLevel {
    SpiceLevel::Mild
}

fn default_available() -> bool {
    true
}

/// Listing filter: by category and/or availability.
#[derive(Debug, Default, Clone, Copy)]
pub struct DishFilter {
    pub category: Option<Category>,
    pub available_only: bool,
}

pub struct DishStore {
    db: Db,
}

impl DishStore {
    pub fn new(db: Db) -> Result<Self> {
        db.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS dishes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                price REAL NOT NULL,
                category TEXT NOT NULL,
                is_vegetarian INTEGER NOT NULL DEFAULT 0,
                spice_level TEXT NOT NULL DEFAULT 'mild',
                is_available INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dishes_category ON dishes(category, is_available);",
        )?;
        Ok(Self { db })
    }

    pub fn create(&self, new: NewDish) -> Result<Dish> {
        let dish = Dish {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            description: new.description.trim().to_string(),
            price: new.price,
            category: new.category,
            is_vegetarian: new.is_vegetarian,
            spice_level: new.spice_level,
            is_available: new.is_available,
            created_at: epoch_secs(),
            updated_at: epoch_secs(),
        };
        self.db.lock().execute(
            "INSERT INTO dishes (id, name, description, price, category, is_vegetarian, spice_level, is_available, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                dish.id,
                dish.name,
                dish.description,
                dish.price,
                dish.category.as_str(),
                dish.is_vegetarian as i64,
                dish.spice_level.as_str(),
                dish.is_available as i64,
                dish.created_at,
                dish.updated_at,
            ],
        )?;
        Ok(dish)
    }

    pub fn get(&self, id: &str) -> Result<Option<Dish>> {
        let conn = self.db.lock();
        let row = conn.query_row(
            &format!("SELECT {DISH_COLUMNS} FROM dishes WHERE id = ?1"),
            params![id],
            dish_from_row,
        );
        match row {
            Ok(dish) => Ok(Some(dish)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list(&self, filter: DishFilter) -> Result<Vec<Dish>> {
        let mut sql = format!("SELECT {DISH_COLUMNS} FROM dishes");
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(category) = filter.category {
            clauses.push("category = ?");
            values.push(rusqlite::types::Value::Text(category.as_str().to_string()));
        }
        if filter.available_only {
            clauses.push("is_available = 1");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY name");

        let conn = self.db.lock();
        let mut stmt = conn.prepare(&sql)?;
        let dishes = stmt
            .query_map(rusqlite::params_from_iter(values), dish_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(dishes)
    }

    /// Full-record update. Returns the updated dish, or `None` if absent.
    pub fn update(&self, id: &str, new: NewDish) -> Result<Option<Dish>> {
        let updated = self.db.lock().execute(
            "UPDATE dishes SET name = ?1, description = ?2, price = ?3, category = ?4,
                    is_vegetarian = ?5, spice_level = ?6, is_available = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                new.name.trim(),
                new.description.trim(),
                new.price,
                new.category.as_str(),
                new.is_vegetarian as i64,
                new.spice_level.as_str(),
                new.is_available as i64,
                epoch_secs(),
                id,
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self
            .db
            .lock()
            .execute("DELETE FROM dishes WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

const DISH_COLUMNS: &str =
    "id, name, description, price, category, is_vegetarian, spice_level, is_available, created_at, updated_at";

fn dish_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Dish> {
    let category: String = row.get(4)?;
    let spice: String = row.get(6)?;
    Ok(Dish {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        category: Category::parse(&category).unwrap_or(Category::Main),
        is_vegetarian: row.get::<_, i64>(5)? != 0,
        spice_level: SpiceLevel::from_db(&spice),
        is_available: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
