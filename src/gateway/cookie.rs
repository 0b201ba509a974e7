//! Refresh-credential cookie plumbing.
//!
//! The refresh token travels exclusively in an HTTP-only cookie scoped to the
//! auth endpoints; it never appears in a JSON body. `Secure` is added in
//! production, `SameSite=Strict` always. Logout clears by re-setting the same
//! cookie with a zero max-age.

use axum::http::{header, HeaderMap};

use crate::auth::codec::REFRESH_TTL_SECS;

pub const REFRESH_COOKIE: &str = "refresh_token";

/// Path scope: the credential is only ever needed by the auth endpoints.
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

/// `Set-Cookie` value carrying a freshly-issued refresh token.
pub fn build(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{REFRESH_COOKIE}={token}; Path={REFRESH_COOKIE_PATH}; Max-Age={REFRESH_TTL_SECS}; HttpOnly; SameSite=Strict"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that clears the refresh credential.
pub fn clear(secure: bool) -> String {
    let mut cookie = format!(
        "{REFRESH_COOKIE}=; Path={REFRESH_COOKIE_PATH}; Max-Age=0; HttpOnly; SameSite=Strict"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Extract the refresh token from the request's `Cookie` header(s).
pub fn from_headers(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name == REFRESH_COOKIE && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn build_and_clear_shapes() {
        let set = build("tok-123", false);
        assert!(set.starts_with("refresh_token=tok-123;"));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("SameSite=Strict"));
        assert!(!set.contains("Secure"));

        let secure = build("tok-123", true);
        assert!(secure.ends_with("; Secure"));

        let cleared = clear(false);
        assert!(cleared.starts_with("refresh_token=;"));
        assert!(cleared.contains("Max-Age=0"));
    }

    #[test]
    fn parses_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc.def.ghi; lang=en"),
        );
        assert_eq!(from_headers(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn absent_or_empty_is_none() {
        let headers = HeaderMap::new();
        assert!(from_headers(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("refresh_token="));
        assert!(from_headers(&headers).is_none());
    }
}
