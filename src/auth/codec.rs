//! Stateless signing and verification of access and refresh tokens.
//!
//! Two independent HS256 secrets bound to two independent expiries: a leaked
//! access token cannot mint new sessions, and access-token verification never
//! touches the database. Refresh tokens carry only the subject id; everything
//! a request handler needs (email, role) rides in the access claims.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::store::{Role, User};
use crate::db::epoch_secs;

/// Access-token lifetime: 15 minutes.
pub const ACCESS_TTL_SECS: i64 = 15 * 60;

/// Refresh-token lifetime: 7 days.
pub const REFRESH_TTL_SECS: i64 = 7 * 24 * 3600;

/// Claim set of an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: user id.
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
}

/// Claim set of a refresh token. Deliberately minimal — the subject is
/// re-loaded and re-checked on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("token signing failed")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issues and verifies both token kinds.
pub struct TokenCodec {
    access_enc: EncodingKey,
    access_dec: DecodingKey,
    refresh_enc: EncodingKey,
    refresh_dec: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        Self::with_ttls(access_secret, refresh_secret, ACCESS_TTL_SECS, REFRESH_TTL_SECS)
    }

    /// Custom lifetimes; tests use this to mint already-expired tokens.
    pub fn with_ttls(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Self {
        // Zero leeway: an expired token is expired, with no grace window.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            access_enc: EncodingKey::from_secret(access_secret.as_bytes()),
            access_dec: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_enc: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_dec: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
            validation,
        }
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String, TokenError> {
        let now = epoch_secs();
        let claims = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + self.access_ttl_secs,
        };
        encode(&Header::default(), &claims, &self.access_enc).map_err(TokenError::Signing)
    }

    pub fn issue_refresh_token(&self, user_id: &str) -> Result<String, TokenError> {
        let now = epoch_secs();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.refresh_ttl_secs,
        };
        encode(&Header::default(), &claims, &self.refresh_enc).map_err(TokenError::Signing)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.access_dec, &self.validation)
            .map(|data| data.claims)
            .map_err(classify)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        decode::<RefreshClaims>(token, &self.refresh_dec, &self.validation)
            .map(|data| data.claims)
            .map_err(classify)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: "user-1".into(),
            email: "a@x.com".into(),
            name: "A".into(),
            phone: None,
            role: Role::Customer,
            is_active: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new("access-secret", "refresh-secret")
    }

    #[test]
    fn access_token_round_trip() {
        let codec = codec();
        let token = codec.issue_access_token(&sample_user()).unwrap();
        let claims = codec.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, Role::Customer);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_round_trip() {
        let codec = codec();
        let token = codec.issue_refresh_token("user-1").unwrap();
        let claims = codec.verify_refresh_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let codec = codec();
        let access = codec.issue_access_token(&sample_user()).unwrap();
        let refresh = codec.issue_refresh_token("user-1").unwrap();

        // Wrong secret, so verification fails even though both are valid JWTs.
        assert!(matches!(
            codec.verify_refresh_token(&access),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            codec.verify_access_token(&refresh),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn expired_token_is_rejected_as_expired() {
        let codec = TokenCodec::with_ttls("a", "r", -10, -10);
        let token = codec.issue_access_token(&sample_user()).unwrap();
        assert!(matches!(
            codec.verify_access_token(&token),
            Err(TokenError::Expired)
        ));

        let refresh = codec.issue_refresh_token("user-1").unwrap();
        assert!(matches!(
            codec.verify_refresh_token(&refresh),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn garbage_is_invalid_not_expired() {
        let codec = codec();
        assert!(matches!(
            codec.verify_access_token("not-a-jwt"),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn distinct_secrets_verify_independently() {
        let a = TokenCodec::new("secret-one", "secret-two");
        let b = TokenCodec::new("secret-three", "secret-two");
        let refresh = a.issue_refresh_token("user-1").unwrap();
        // Same refresh secret: still verifiable despite different access secrets.
        assert!(b.verify_refresh_token(&refresh).is_ok());
    }
}
