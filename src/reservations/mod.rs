//! Table reservations.

pub mod store;

pub use store::{
    CancelOutcome, NewReservation, Reservation, ReservationStatus, ReservationStore, StatusUpdate,
};
