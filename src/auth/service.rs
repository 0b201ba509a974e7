//! Session manager: the login/registration/refresh/logout protocol.
//!
//! State machine per user session:
//! `Anonymous --(register|login)--> Authenticated(access, refresh honored)`;
//! `Authenticated --(refresh, honored)--> Authenticated(new pair)`;
//! `Authenticated --(refresh, not honored)--> Anonymous (InvalidToken)`;
//! `Authenticated --(logout)--> Anonymous`.
//!
//! Access-token expiry alone does not transition server-side state — the
//! token is stateless and the client reacts by calling refresh.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::codec::{TokenCodec, TokenError};
use super::error::{AuthError, FieldError};
use super::store::{AuthStore, NewUser, Role, User};

/// Valid-format bcrypt hash burned on lookups of unknown emails, so the
/// work factor is paid on both login paths and response timing does not
/// reveal whether an email exists.
const DUMMY_HASH: &str = "$2b$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW";

/// Registration payload. Serializable because the client library sends it
/// over the wire too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Login payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A freshly-issued session: the user plus both tokens. The refresh token is
/// for the transport layer (cookie) only — it never appears in a JSON body.
#[derive(Debug)]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// Orchestrates the credential store, token codec and session store into the
/// register/login/refresh/logout protocol.
pub struct SessionManager {
    store: Arc<AuthStore>,
    codec: TokenCodec,
    hash_cost: u32,
}

impl SessionManager {
    pub fn new(store: Arc<AuthStore>, codec: TokenCodec) -> Self {
        Self {
            store,
            codec,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt cost factor.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    // ── Protocol operations ─────────────────────────────────────────

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthSession, AuthError> {
        let fields = validate_register(&req);
        if !fields.is_empty() {
            return Err(AuthError::Validation(fields));
        }

        let password_hash = hash_password(req.password, self.hash_cost).await?;
        let user = self
            .store
            .create_user(NewUser {
                email: req.email,
                password_hash,
                name: req.name,
                phone: req.phone,
                role: Role::Customer,
            })?
            .ok_or(AuthError::DuplicateEmail)?;

        tracing::info!(user_id = %user.id, "user registered");
        self.issue_session(user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthSession, AuthError> {
        let fields = validate_login(&req);
        if !fields.is_empty() {
            return Err(AuthError::Validation(fields));
        }

        let Some(credential) = self.store.find_by_email(&req.email)? else {
            // Burn a verification anyway so unknown emails cost the same.
            let _ = verify_password(req.password, DUMMY_HASH.to_string()).await;
            return Err(AuthError::InvalidCredentials);
        };

        let password_ok = verify_password(req.password, credential.password_hash).await?;
        if !password_ok || !credential.user.is_active {
            tracing::warn!(email = %credential.user.email, "failed login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_session(credential.user)
    }

    /// Rotate a presented refresh token into a fresh access/refresh pair.
    pub async fn refresh(&self, presented: Option<&str>) -> Result<AuthSession, AuthError> {
        let presented = presented.ok_or(AuthError::MissingToken)?;
        let claims = self
            .codec
            .verify_refresh_token(presented)
            .map_err(token_error)?;

        let user = self
            .store
            .find_by_id(&claims.sub)?
            .filter(|u| u.is_active)
            .ok_or(AuthError::InvalidToken)?;

        let access_token = self.codec.issue_access_token(&user).map_err(token_error)?;
        let refresh_token = self
            .codec
            .issue_refresh_token(&user.id)
            .map_err(token_error)?;

        // Atomic rotate: a token that was already rotated away (replay) or
        // explicitly revoked is no longer honored and fails here.
        let rotated = self
            .store
            .rotate_refresh_token(&user.id, presented, &refresh_token)?;
        if !rotated {
            tracing::warn!(user_id = %user.id, "refresh replay or revoked token rejected");
            return Err(AuthError::InvalidToken);
        }

        tracing::debug!(user_id = %user.id, "refresh token rotated");
        Ok(AuthSession {
            user,
            access_token,
            refresh_token,
        })
    }

    /// Best-effort revocation of the presented refresh token. Never fails:
    /// the caller has already authenticated, and the transport clears the
    /// client-held credential regardless of store outcome.
    pub async fn logout(&self, user: &User, presented: Option<&str>) {
        if let Some(token) = presented {
            match self.store.remove_refresh_token(&user.id, token) {
                Ok(removed) => {
                    tracing::debug!(user_id = %user.id, removed, "logout revoked refresh token");
                }
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "logout token removal failed");
                }
            }
        }
    }

    /// Guard for protected operations: verify the access token and re-check
    /// the subject still exists and is active.
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<User, AuthError> {
        let token = bearer.ok_or(AuthError::MissingToken)?;
        let claims = self
            .codec
            .verify_access_token(token)
            .map_err(token_error)?;

        self.store
            .find_by_id(&claims.sub)?
            .filter(|u| u.is_active)
            .ok_or(AuthError::UserInactiveOrMissing)
    }

    /// Role gate layered on top of `authenticate`.
    pub fn require_role(user: &User, role: Role) -> Result<(), AuthError> {
        if user.role == role {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole)
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn issue_session(&self, user: User) -> Result<AuthSession, AuthError> {
        let access_token = self.codec.issue_access_token(&user).map_err(token_error)?;
        let refresh_token = self
            .codec
            .issue_refresh_token(&user.id)
            .map_err(token_error)?;
        self.store.add_refresh_token(&user.id, &refresh_token)?;
        Ok(AuthSession {
            user,
            access_token,
            refresh_token,
        })
    }
}

fn token_error(err: TokenError) -> AuthError {
    match err {
        TokenError::Expired | TokenError::Invalid => AuthError::InvalidToken,
        TokenError::Signing(e) => AuthError::Internal(e.into()),
    }
}

/// Bcrypt is CPU-bound; run it off the async runtime so hashing never stalls
/// other in-flight requests.
async fn hash_password(password: String, cost: u32) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Internal(e.into()))?
        .map_err(|e| AuthError::Internal(e.into()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Internal(e.into()))?
        .map_err(|e| AuthError::Internal(e.into()))
}

// ── Payload validation ──────────────────────────────────────────────

fn validate_register(req: &RegisterRequest) -> Vec<FieldError> {
    let mut fields = Vec::new();
    if !is_valid_email(&req.email) {
        fields.push(FieldError {
            field: "email",
            message: "Invalid email format",
        });
    }
    if req.password.len() < 6 {
        fields.push(FieldError {
            field: "password",
            message: "Password must be at least 6 characters",
        });
    }
    if req.name.trim().is_empty() {
        fields.push(FieldError {
            field: "name",
            message: "Name is required",
        });
    }
    if let Some(phone) = &req.phone {
        let ok = !phone.trim().is_empty()
            && phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' '));
        if !ok {
            fields.push(FieldError {
                field: "phone",
                message: "Invalid phone number",
            });
        }
    }
    fields
}

fn validate_login(req: &LoginRequest) -> Vec<FieldError> {
    let mut fields = Vec::new();
    if !is_valid_email(&req.email) {
        fields.push(FieldError {
            field: "email",
            message: "Invalid email format",
        });
    }
    if req.password.len() < 6 {
        fields.push(FieldError {
            field: "password",
            message: "Password must be at least 6 characters",
        });
    }
    fields
}

fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

// ── Tests ───────────────────────────────────────────────────────────
