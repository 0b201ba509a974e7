//! maitred — restaurant ordering and reservation API.
//!
//! An axum HTTP gateway over an embedded SQLite store, plus a client-side
//! session library. The core is the authentication session lifecycle:
//! short-lived signed access tokens, longer-lived rotating refresh tokens
//! with a bounded per-user history, and race-safe concurrent refresh on both
//! sides of the wire.

pub mod auth;
pub mod client;
pub mod config;
pub mod coupons;
pub mod db;
pub mod gateway;
pub mod menu;
pub mod orders;
pub mod reservations;
pub mod reviews;
