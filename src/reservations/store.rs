//! SQLite-backed reservation store.

use anyhow::Result;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::{epoch_secs, Db};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }

    fn from_db(raw: &str) -> ReservationStatus {
        match raw {
            "confirmed" => ReservationStatus::Confirmed,
            "cancelled" => ReservationStatus::Cancelled,
            "completed" => ReservationStatus::Completed,
            _ => ReservationStatus::Pending,
        }
    }

    /// Admin-driven transitions. Terminal states stay terminal.
    fn can_transition(self, to: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    /// `HH:MM`, 24-hour.
    pub time: String,
    pub guests: u32,
    pub customer_name: String,
    pub customer_phone: String,
    pub special_requests: Option<String>,
    pub status: ReservationStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReservation {
    pub date: String,
    pub time: String,
    pub guests: u32,
    pub customer_name: String,
    pub customer_phone: String,
    pub special_requests: Option<String>,
}

/// Result of an admin status change.
pub enum StatusUpdate {
    Updated(Reservation),
    NotFound,
    IllegalTransition(ReservationStatus),
}

/// Result of an owner-initiated cancellation.
pub enum CancelOutcome {
    Cancelled(Reservation),
    NotFound,
    NotCancellable(ReservationStatus),
}

pub struct ReservationStore {
    db: Db,
}

impl ReservationStore {
    pub fn new(db: Db) -> Result<Self> {
        db.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS reservations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                guests INTEGER NOT NULL,
                customer_name TEXT NOT NULL,
                customer_phone TEXT NOT NULL,
                special_requests TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reservations_user ON reservations(user_id);",
        )?;
        Ok(Self { db })
    }

    pub fn create(&self, user_id: &str, new: NewReservation) -> Result<Reservation> {
        let reservation = Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            date: new.date,
            time: new.time,
            guests: new.guests,
            customer_name: new.customer_name.trim().to_string(),
            customer_phone: new.customer_phone.trim().to_string(),
            special_requests: new.special_requests,
            status: ReservationStatus::Pending,
            created_at: epoch_secs(),
            updated_at: epoch_secs(),
        };
        self.db.lock().execute(
            "INSERT INTO reservations (id, user_id, date, time, guests, customer_name, customer_phone, special_requests, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                reservation.id,
                reservation.user_id,
                reservation.date,
                reservation.time,
                reservation.guests,
                reservation.customer_name,
                reservation.customer_phone,
                reservation.special_requests,
                reservation.status.as_str(),
                reservation.created_at,
                reservation.updated_at,
            ],
        )?;
        Ok(reservation)
    }

    pub fn get(&self, id: &str) -> Result<Option<Reservation>> {
        let conn = self.db.lock();
        let row = conn.query_row(
            &format!("SELECT {COLUMNS} FROM reservations WHERE id = ?1"),
            params![id],
            reservation_from_row,
        );
        match row {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Reservation>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM reservations WHERE user_id = ?1 ORDER BY date, time"
        ))?;
        let rows = stmt
            .query_map(params![user_id], reservation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_all(&self) -> Result<Vec<Reservation>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM reservations ORDER BY date, time"
        ))?;
        let rows = stmt
            .query_map([], reservation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Admin status transition, checked against the legal transition table.
    pub fn set_status(&self, id: &str, to: ReservationStatus) -> Result<StatusUpdate> {
        let Some(current) = self.get(id)? else {
            return Ok(StatusUpdate::NotFound);
        };
        if !current.status.can_transition(to) {
            return Ok(StatusUpdate::IllegalTransition(current.status));
        }
        self.db.lock().execute(
            "UPDATE reservations SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![to.as_str(), epoch_secs(), id],
        )?;
        Ok(StatusUpdate::Updated(Reservation {
            status: to,
            updated_at: epoch_secs(),
            ..current
        }))
    }

    /// Owner cancellation: only pending/confirmed reservations, only one's own.
    pub fn cancel_own(&self, id: &str, user_id: &str) -> Result<CancelOutcome> {
        let Some(current) = self.get(id)? else {
            return Ok(CancelOutcome::NotFound);
        };
        if current.user_id != user_id {
            // Do not reveal other users' reservations.
            return Ok(CancelOutcome::NotFound);
        }
        if !matches!(
            current.status,
            ReservationStatus::Pending | ReservationStatus::Confirmed
        ) {
            return Ok(CancelOutcome::NotCancellable(current.status));
        }
        self.db.lock().execute(
            "UPDATE reservations SET status = 'cancelled', updated_at = ?1 WHERE id = ?2",
            params![epoch_secs(), id],
        )?;
        Ok(CancelOutcome::Cancelled(Reservation {
            status: ReservationStatus::Cancelled,
            updated_at: epoch_secs(),
            ..current
        }))
    }
}

const COLUMNS: &str = "id, user_id, date, time, guests, customer_name, customer_phone, special_requests, status, created_at, updated_at";

fn reservation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reservation> {
    let status: String = row.get(8)?;
    Ok(Reservation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: row.get(2)?,
        time: row.get(3)?,
        guests: row.get(4)?,
        customer_name: row.get(5)?,
        customer_phone: row.get(6)?,
        special_requests: row.get(7)?,
        status: ReservationStatus::from_db(&status),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{AuthStore, NewUser, Role};

    fn stores() -> (ReservationStore, String) {
        let db = Db::open_in_memory().unwrap();
        let auth = AuthStore::new(db.clone()).unwrap();
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
        (ReservationStore::new(db).unwrap(), user.id)
    }

    fn new_reservation() -> NewReservation {
        NewReservation {
            date: "2026-09-01".into(),
            time: "19:30".into(),
            guests: 4,
            customer_name: "A B".into(),
            customer_phone: "+1 555 0100".into(),
            special_requests: None,
        }
    }

    #[test]
    fn create_and_list() {
        let (store, user_id) = stores();
        let r = store.create(&user_id, new_reservation()).unwrap();
        assert_eq!(r.status, ReservationStatus::Pending);

        assert_eq!(store.list_for_user(&user_id).unwrap().len(), 1);
        assert!(store.list_for_user("other").unwrap().is_empty());
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn status_transitions_are_checked() {
        let (store, user_id) = stores();
        let r = store.create(&user_id, new_reservation()).unwrap();

        assert!(matches!(
            store.set_status(&r.id, ReservationStatus::Completed).unwrap(),
            StatusUpdate::IllegalTransition(ReservationStatus::Pending)
        ));
        assert!(matches!(
            store.set_status(&r.id, ReservationStatus::Confirmed).unwrap(),
            StatusUpdate::Updated(_)
        ));
        assert!(matches!(
            store.set_status(&r.id, ReservationStatus::Completed).unwrap(),
            StatusUpdate::Updated(_)
        ));
        assert!(matches!(
            store.set_status("ghost", ReservationStatus::Confirmed).unwrap(),
            StatusUpdate::NotFound
        ));
    }

    #[test]
    fn owner_cancellation() {
        let (store, user_id) = stores();
        let r = store.create(&user_id, new_reservation()).unwrap();

        assert!(matches!(
            store.cancel_own(&r.id, "someone-else").unwrap(),
            CancelOutcome::NotFound
        ));
        assert!(matches!(
            store.cancel_own(&r.id, &user_id).unwrap(),
            CancelOutcome::Cancelled(_)
        ));
        assert!(matches!(
            store.cancel_own(&r.id, &user_id).unwrap(),
            CancelOutcome::NotCancellable(ReservationStatus::Cancelled)
        ));
    }
}
