//! Axum-based HTTP gateway with body limits, timeouts, and rate limiting.
//!
//! - Request body size limit (64KB max)
//! - Request timeouts (30s) to prevent slow-loris abuse
//! - Sliding-window per-client rate limiting on the auth endpoints
//! - Access tokens via `Authorization: Bearer`; the refresh credential via an
//!   HTTP-only cookie (see [`cookie`])
//!
//! All responses use the `{success, message, data?}` envelope.

pub mod cookie;

mod coupons;
mod dishes;
mod orders;
mod reservations;
mod reviews;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::auth::{
    AuthError, AuthSession, AuthStore, LoginRequest, RegisterRequest, Role, SessionManager,
    TokenCodec, User,
};
use crate::config::Config;
use crate::coupons::CouponStore;
use crate::db::Db;
use crate::menu::DishStore;
use crate::orders::OrderStore;
use crate::reservations::ReservationStore;
use crate::reviews::ReviewStore;

/// Maximum request body size (64KB) — prevents memory exhaustion.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Sliding window used by auth rate limiting (15 minutes).
pub const RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;

/// How often the rate limiter sweeps stale client entries from its map.
const RATE_LIMITER_SWEEP_INTERVAL_SECS: u64 = 300; // 5 minutes

/// Concrete return type for handlers (avoids `impl IntoResponse` inference
/// issues).
pub(crate) type ApiResponse = (StatusCode, Json<serde_json::Value>);

// ── Rate limiting ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    limit_per_window: u32,
    window: Duration,
    requests: Mutex<(HashMap<String, Vec<Instant>>, Instant)>,
}

impl SlidingWindowRateLimiter {
    fn new(limit_per_window: u32, window: Duration) -> Self {
        Self {
            limit_per_window,
            window,
            requests: Mutex::new((HashMap::new(), Instant::now())),
        }
    }

    fn allow(&self, key: &str) -> bool {
        if self.limit_per_window == 0 {
            return true;
        }

        let now = Instant::now();
        let cutoff = now.checked_sub(self.window).unwrap_or_else(Instant::now);

        let mut guard = self.requests.lock();
        let (requests, last_sweep) = &mut *guard;

        // Periodic sweep: remove clients with no recent requests
        if last_sweep.elapsed() >= Duration::from_secs(RATE_LIMITER_SWEEP_INTERVAL_SECS) {
            requests.retain(|_, timestamps| {
                timestamps.retain(|t| *t > cutoff);
                !timestamps.is_empty()
            });
            *last_sweep = now;
        }

        let entry = requests.entry(key.to_owned()).or_default();
        entry.retain(|instant| *instant > cutoff);

        if entry.len() >= self.limit_per_window as usize {
            return false;
        }

        entry.push(now);
        true
    }
}

fn client_key_from_headers(headers: &HeaderMap) -> String {
    for header_name in ["X-Forwarded-For", "X-Real-IP"] {
        if let Some(value) = headers.get(header_name).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return first.to_owned();
            }
        }
    }
    "unknown".into()
}

// ── Shared state ────────────────────────────────────────────────────

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub dishes: Arc<DishStore>,
    pub reservations: Arc<ReservationStore>,
    pub orders: Arc<OrderStore>,
    pub reviews: Arc<ReviewStore>,
    pub coupons: Arc<CouponStore>,
    pub auth_limiter: Arc<SlidingWindowRateLimiter>,
    /// Adds `Secure` to the refresh cookie (production).
    pub cookie_secure: bool,
    pub environment: &'static str,
    db: Db,
}

impl AppState {
    /// Open the database and wire every store and the session manager.
    pub fn build(config: &Config) -> Result<AppState> {
        let db = Db::open(&config.db_path)?;
        let auth_store = Arc::new(AuthStore::new(db.clone())?);
        let codec = TokenCodec::new(&config.access_secret, &config.refresh_secret);
        let sessions = Arc::new(SessionManager::new(auth_store, codec));

        // Strict budget in production; effectively open during development
        // and tests.
        let auth_limit = if config.is_production() { 5 } else { 1000 };
        let auth_limiter = Arc::new(SlidingWindowRateLimiter::new(
            auth_limit,
            Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
        ));

        tracing::info!(db = %config.db_path.display(), "stores initialized");

        Ok(AppState {
            sessions,
            dishes: Arc::new(DishStore::new(db.clone())?),
            reservations: Arc::new(ReservationStore::new(db.clone())?),
            orders: Arc::new(OrderStore::new(db.clone())?),
            reviews: Arc::new(ReviewStore::new(db.clone())?),
            coupons: Arc::new(CouponStore::new(db.clone())?),
            auth_limiter,
            cookie_secure: config.is_production(),
            environment: config.environment.as_str(),
            db,
        })
    }
}

// ── Router / server ─────────────────────────────────────────────────

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/auth/register", post(handle_register))
        .route("/api/v1/auth/login", post(handle_login))
        .route("/api/v1/auth/refresh", post(handle_refresh))
        .route("/api/v1/auth/logout", post(handle_logout))
        .route("/api/v1/auth/me", get(handle_me))
        .route(
            "/api/v1/dishes",
            get(dishes::handle_list).post(dishes::handle_create),
        )
        .route(
            "/api/v1/dishes/{dish_id}",
            get(dishes::handle_get)
                .put(dishes::handle_update)
                .delete(dishes::handle_delete),
        )
        .route(
            "/api/v1/dishes/{dish_id}/reviews",
            get(reviews::handle_list_for_dish),
        )
        .route(
            "/api/v1/reservations",
            get(reservations::handle_list).post(reservations::handle_create),
        )
        .route(
            "/api/v1/reservations/{reservation_id}",
            axum::routing::delete(reservations::handle_cancel),
        )
        .route(
            "/api/v1/reservations/{reservation_id}/status",
            axum::routing::put(reservations::handle_set_status),
        )
        .route(
            "/api/v1/orders",
            get(orders::handle_list).post(orders::handle_create),
        )
        .route("/api/v1/orders/{order_id}", get(orders::handle_get))
        .route(
            "/api/v1/orders/{order_id}/status",
            axum::routing::put(orders::handle_set_status),
        )
        .route("/api/v1/reviews", post(reviews::handle_create))
        .route(
            "/api/v1/reviews/{review_id}",
            axum::routing::delete(reviews::handle_delete),
        )
        .route(
            "/api/v1/coupons",
            get(coupons::handle_list_active).post(coupons::handle_create),
        )
        .route("/api/v1/coupons/{code}", get(coupons::handle_get))
        .route(
            "/api/v1/coupons/{coupon_id}/deactivate",
            axum::routing::put(coupons::handle_deactivate),
        )
        .fallback(handle_not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(state)
}

/// Run the HTTP gateway.
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = AppState::build(&config)?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual = listener.local_addr()?;

    println!("🍽  maitred gateway listening on http://{actual}");
    println!("  POST /api/v1/auth/register   — create an account");
    println!("  POST /api/v1/auth/login      — authenticate, get tokens");
    println!("  POST /api/v1/auth/refresh    — rotate the refresh credential");
    println!("  POST /api/v1/auth/logout     — revoke the refresh credential");
    println!("  GET  /api/v1/auth/me         — current user");
    println!("  GET  /api/v1/dishes          — browse the menu");
    println!("  GET  /api/v1/health          — liveness");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ── Response envelope ───────────────────────────────────────────────

pub(crate) fn success(
    status: StatusCode,
    message: &str,
    data: Option<serde_json::Value>,
) -> ApiResponse {
    let mut body = serde_json::json!({
        "success": true,
        "message": message,
        "statusCode": status.as_u16(),
    });
    if let Some(data) = data {
        body["data"] = data;
    }
    (status, Json(body))
}

pub(crate) fn failure(status: StatusCode, message: &str) -> ApiResponse {
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "message": message,
            "statusCode": status.as_u16(),
        })),
    )
}

/// Map a session-protocol error into the envelope, logging internals.
pub(crate) fn auth_failure(err: &AuthError) -> ApiResponse {
    if let AuthError::Internal(inner) = err {
        tracing::error!(error = %inner, "internal error in auth path");
    }
    let status = err.status();
    let mut body = serde_json::json!({
        "success": false,
        "message": err.client_message(),
        "statusCode": status.as_u16(),
    });
    if let Some(fields) = err.field_errors() {
        body["errors"] = serde_json::json!(fields);
    }
    (status, Json(body))
}

async fn handle_not_found() -> ApiResponse {
    failure(StatusCode::NOT_FOUND, "Route not found")
}

// ── Auth guards ─────────────────────────────────────────────────────

/// Extract bearer token from Authorization header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Authenticate the caller, or produce the error response.
pub(crate) async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<User, ApiResponse> {
    state
        .sessions
        .authenticate(extract_bearer_token(headers))
        .await
        .map_err(|e| auth_failure(&e))
}

/// Authenticate and require the admin role.
pub(crate) async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<User, ApiResponse> {
    let user = require_user(state, headers).await?;
    SessionManager::require_role(&user, Role::Admin).map_err(|e| auth_failure(&e))?;
    Ok(user)
}

// ── Auth handlers ───────────────────────────────────────────────────

fn auth_rate_limited(state: &AppState, headers: &HeaderMap) -> Option<ApiResponse> {
    if state.auth_limiter.allow(&client_key_from_headers(headers)) {
        None
    } else {
        Some(failure(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many auth attempts, try again later",
        ))
    }
}

/// Attach a `Set-Cookie` header to an envelope response.
fn with_cookie(resp: ApiResponse, cookie_value: String) -> Response {
    let mut response = resp.into_response();
    match HeaderValue::from_str(&cookie_value) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(_) => tracing::warn!("refresh cookie value was not a valid header"),
    }
    response
}

fn session_body(session: &AuthSession) -> serde_json::Value {
    serde_json::json!({
        "user": session.user,
        "accessToken": session.access_token,
    })
}

/// POST /api/v1/auth/register — create an account and start a session.
async fn handle_register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RegisterRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    if let Some(limited) = auth_rate_limited(&state, &headers) {
        return limited.into_response();
    }
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}"))
                .into_response();
        }
    };

    match state.sessions.register(body).await {
        Ok(session) => with_cookie(
            success(
                StatusCode::CREATED,
                "User registered successfully",
                Some(session_body(&session)),
            ),
            cookie::build(&session.refresh_token, state.cookie_secure),
        ),
        Err(e) => auth_failure(&e).into_response(),
    }
}

/// POST /api/v1/auth/login — authenticate and start a session.
async fn handle_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    if let Some(limited) = auth_rate_limited(&state, &headers) {
        return limited.into_response();
    }
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => {
            return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}"))
                .into_response();
        }
    };

    match state.sessions.login(body).await {
        Ok(session) => with_cookie(
            success(
                StatusCode::OK,
                "Login successful",
                Some(session_body(&session)),
            ),
            cookie::build(&session.refresh_token, state.cookie_secure),
        ),
        Err(e) => auth_failure(&e).into_response(),
    }
}

/// POST /api/v1/auth/refresh — rotate the refresh credential, mint a new
/// access token.
async fn handle_refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(limited) = auth_rate_limited(&state, &headers) {
        return limited.into_response();
    }
    let presented = cookie::from_headers(&headers);

    match state.sessions.refresh(presented.as_deref()).await {
        Ok(session) => with_cookie(
            success(
                StatusCode::OK,
                "Token refreshed successfully",
                Some(serde_json::json!({ "accessToken": session.access_token })),
            ),
            cookie::build(&session.refresh_token, state.cookie_secure),
        ),
        Err(e) => auth_failure(&e).into_response(),
    }
}

/// POST /api/v1/auth/logout — revoke the refresh credential.
///
/// The cookie is cleared even when the store-side removal did nothing; once
/// the caller is authenticated this endpoint always reports success.
async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp.into_response(),
    };

    let presented = cookie::from_headers(&headers);
    state.sessions.logout(&user, presented.as_deref()).await;

    with_cookie(
        success(StatusCode::OK, "Logout successful", None),
        cookie::clear(state.cookie_secure),
    )
}

/// GET /api/v1/auth/me — current user profile.
async fn handle_me(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    match require_user(&state, &headers).await {
        Ok(user) => success(
            StatusCode::OK,
            "Profile retrieved successfully",
            Some(serde_json::json!({ "user": user })),
        ),
        Err(resp) => resp,
    }
}

/// GET /api/v1/health — liveness and store reachability.
async fn handle_health(State(state): State<AppState>) -> ApiResponse {
    success(
        StatusCode::OK,
        "maitred API is running",
        Some(serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "environment": state.environment,
            "version": env!("CARGO_PKG_VERSION"),
            "database": if state.db.ping() { "connected" } else { "disconnected" },
        })),
    )
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_enforces_window_budget() {
        let limiter = SlidingWindowRateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.allow("1.2.3.4"));
        assert!(limiter.allow("1.2.3.4"));
        assert!(!limiter.allow("1.2.3.4"));
        // Other clients are unaffected.
        assert!(limiter.allow("5.6.7.8"));
    }

    #[test]
    fn zero_limit_disables_limiting() {
        let limiter = SlidingWindowRateLimiter::new(0, Duration::from_secs(60));
        for _ in 0..100 {
            assert!(limiter.allow("1.2.3.4"));
        }
    }

    #[test]
    fn client_key_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("9.9.9.9, 10.0.0.1"));
        assert_eq!(client_key_from_headers(&headers), "9.9.9.9");
        assert_eq!(client_key_from_headers(&HeaderMap::new()), "unknown");
    }
}
