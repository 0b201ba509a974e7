//! Authentication session lifecycle.
//!
//! Provides:
//! - Signed access/refresh token pairs (two distinct secrets and expiries)
//! - Per-user bounded rotating refresh-token history (capacity 5, SQLite)
//! - The register/login/refresh/logout protocol with atomic token rotation
//!
//! ## Design decisions
//! - Access tokens are stateless and never persisted; revocation only exists
//!   for refresh tokens, by removing them from the honored list.
//! - Refresh rotation is a single store-level transaction (remove-old,
//!   insert-new, enforce cap), so concurrent refreshes with the same token
//!   cannot both succeed and concurrent refreshes with different tokens
//!   cannot clobber each other.

pub mod codec;
pub mod error;
pub mod service;
pub mod store;

pub use codec::TokenCodec;
pub use error::AuthError;
pub use service::{AuthSession, LoginRequest, RegisterRequest, SessionManager};
pub use store::{AuthStore, Role, User};
