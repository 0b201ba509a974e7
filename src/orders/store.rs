//! SQLite-backed order store.
//!
//! Orders hold dish line items (with a name snapshot taken at order time, so
//! later menu edits don't rewrite order history) and a kitchen status. No
//! totals are computed or stored — billing is outside this service.

use anyhow::Result;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::{epoch_secs, Db};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    fn from_db(raw: &str) -> OrderStatus {
        match raw {
            "confirmed" => OrderStatus::Confirmed,
            "preparing" => OrderStatus::Preparing,
            "ready" => OrderStatus::Ready,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Pending,
        }
    }

    fn can_transition(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Preparing)
                | (Confirmed, Cancelled)
                | (Preparing, Ready)
                | (Ready, Delivered)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub dish_id: String,
    /// Dish name at order time.
    pub dish_name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub dish_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

pub enum StatusUpdate {
    Updated(Order),
    NotFound,
    IllegalTransition(OrderStatus),
}

pub struct OrderStore {
    db: Db,
}

impl OrderStore {
    pub fn new(db: Db) -> Result<Self> {
        db.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);

            CREATE TABLE IF NOT EXISTS order_items (
                order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                dish_id TEXT NOT NULL REFERENCES dishes(id),
                dish_name TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0)
            );
            CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);",
        )?;
        Ok(Self { db })
    }

    /// Place an order. Returns `None` when any referenced dish is missing or
    /// currently unavailable; the whole order is transactional.
    pub fn create(&self, user_id: &str, items: &[NewOrderItem]) -> Result<Option<Order>> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;

        let mut snapshot = Vec::with_capacity(items.len());
        for item in items {
            let dish: Option<(String, i64)> = match tx.query_row(
                "SELECT name, is_available FROM dishes WHERE id = ?1",
                params![item.dish_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            ) {
                Ok(found) => Some(found),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(e.into()),
            };
            match dish {
                Some((name, available)) if available != 0 => snapshot.push(OrderItem {
                    dish_id: item.dish_id.clone(),
                    dish_name: name,
                    quantity: item.quantity,
                }),
                _ => return Ok(None),
            }
        }

        let order = Order {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            items: snapshot,
            status: OrderStatus::Pending,
            created_at: epoch_secs(),
            updated_at: epoch_secs(),
        };
        tx.execute(
            "INSERT INTO orders (id, user_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                order.id,
                order.user_id,
                order.status.as_str(),
                order.created_at,
                order.updated_at,
            ],
        )?;
        for item in &order.items {
            tx.execute(
                "INSERT INTO order_items (order_id, dish_id, dish_name, quantity)
                 VALUES (?1, ?2, ?3, ?4)",
                params![order.id, item.dish_id, item.dish_name, item.quantity],
            )?;
        }
        tx.commit()?;
        Ok(Some(order))
    }

    pub fn get(&self, id: &str) -> Result<Option<Order>> {
        let conn = self.db.lock();
        let row = conn.query_row(
            "SELECT id, user_id, status, created_at, updated_at FROM orders WHERE id = ?1",
            params![id],
            order_header_from_row,
        );
        let mut order = match row {
            Ok(order) => order,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        order.items = load_items(&conn, &order.id)?;
        Ok(Some(order))
    }

    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>> {
        self.list_where("WHERE user_id = ?1", params![user_id])
    }

    pub fn list_all(&self) -> Result<Vec<Order>> {
        self.list_where("", [])
    }

    fn list_where<P: rusqlite::Params>(&self, clause: &str, params: P) -> Result<Vec<Order>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, user_id, status, created_at, updated_at FROM orders {clause} ORDER BY created_at DESC"
        ))?;
        let mut orders = stmt
            .query_map(params, order_header_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for order in &mut orders {
            order.items = load_items(&conn, &order.id)?;
        }
        Ok(orders)
    }

    pub fn set_status(&self, id: &str, to: OrderStatus) -> Result<StatusUpdate> {
        let Some(current) = self.get(id)? else {
            return Ok(StatusUpdate::NotFound);
        };
        if !current.status.can_transition(to) {
            return Ok(StatusUpdate::IllegalTransition(current.status));
        }
        self.db.lock().execute(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![to.as_str(), epoch_secs(), id],
        )?;
        Ok(StatusUpdate::Updated(Order {
            status: to,
            updated_at: epoch_secs(),
            ..current
        }))
    }
}

fn order_header_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    let status: String = row.get(2)?;
    Ok(Order {
        id: row.get(0)?,
        user_id: row.get(1)?,
        items: Vec::new(),
        status: OrderStatus::from_db(&status),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn load_items(conn: &rusqlite::Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT dish_id, dish_name, quantity FROM order_items WHERE order_id = ?1 ORDER BY rowid",
    )?;
    let items = stmt
        .query_map(params![order_id], |row| {
            Ok(OrderItem {
                dish_id: row.get(0)?,
                dish_name: row.get(1)?,
                quantity: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

// ── Tests ───────────────────────────────────────────────────────────
