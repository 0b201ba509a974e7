//! Client-side session synchronizer.
//!
//! Companion library that makes the rotating-token protocol transparent to
//! calling code, the way the browser app's auth context did for its pages:
//!
//! - Holds the current access token in memory and attaches it to every
//!   outbound request; the refresh credential lives in the HTTP client's
//!   cookie jar and never touches application code.
//! - On a 401 from a request that carried a token: exactly one refresh
//!   attempt, then one retry. A failed refresh tears the local session down.
//! - Concurrent 401s share a single in-flight refresh future (single-flight),
//!   so a second caller can never present a refresh token the first caller
//!   already rotated away.
//! - Login/logout events broadcast to sibling handles ("tabs"), which update
//!   their in-memory state without their own network round trip.

use std::sync::Arc;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::auth::{LoginRequest, RegisterRequest, User};

/// Session events propagated between sibling handles. The browser original
/// dual-listened on a broadcast channel and on storage events; both are
/// modeled here as subscribers of the same stream.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    LoggedIn { access_token: String, user: User },
    LoggedOut,
}

/// Why a refresh attempt failed. Cloneable because the result is shared
/// between every caller of the in-flight refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh rejected by the server")]
    Unauthorized,
    #[error("refresh transport failed: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// The session could not be refreshed; local state has been cleared.
    #[error("session expired")]
    SessionExpired,
    #[error("request failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("response body was not the expected shape")]
    MalformedResponse,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

#[derive(Default)]
struct SessionState {
    access_token: Option<String>,
    user: Option<User>,
    initialized: bool,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    state: RwLock<SessionState>,
    /// The single-flight handle: `Some` while a refresh is in flight.
    refresh_slot: Mutex<Option<RefreshFuture>>,
    events: broadcast::Sender<SessionEvent>,
}

/// The standard `{success, message, data}` response envelope.
#[derive(Deserialize)]
struct Envelope {
    message: Option<String>,
    data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionData {
    user: User,
    access_token: String,
}

/// One handle per "tab". Clones share everything; [`SessionClient::sibling`]
/// creates a handle with its own token cell that shares only the event bus
/// and the cookie jar, which is what sibling browser tabs actually share.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    /// `base_url` is the server origin, e.g. `http://127.0.0.1:5000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()?;
        Ok(Self::with_parts(http, base_url.into(), broadcast::channel(16).0))
    }

    fn with_parts(
        http: reqwest::Client,
        base_url: String,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                state: RwLock::new(SessionState::default()),
                refresh_slot: Mutex::new(None),
                events,
            }),
        }
    }

    /// A sibling handle: fresh in-memory session state, shared event bus and
    /// cookie jar.
    pub fn sibling(&self) -> SessionClient {
        Self::with_parts(
            self.inner.http.clone(),
            self.inner.base_url.clone(),
            self.inner.events.clone(),
        )
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn access_token(&self) -> Option<String> {
        self.inner.state.read().access_token.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.read().access_token.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.read().initialized
    }

    // ── Event bus ───────────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Apply a sibling's session event to this handle's in-memory state.
    pub fn apply_event(&self, event: &SessionEvent) {
        let mut state = self.inner.state.write();
        match event {
            SessionEvent::LoggedIn { access_token, user } => {
                state.access_token = Some(access_token.clone());
                state.user = Some(user.clone());
            }
            SessionEvent::LoggedOut => {
                state.access_token = None;
                state.user = None;
            }
        }
    }

    /// Keep this handle in sync with sibling events until the bus closes.
    pub fn spawn_sync(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.subscribe();
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => client.apply_event(&event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // ── Session lifecycle ───────────────────────────────────────────

    /// Create an account and start a session.
    pub async fn register(&self, payload: &RegisterRequest) -> Result<User, ClientError> {
        let response = self
            .inner
            .http
            .post(self.url("/auth/register"))
            .json(payload)
            .send()
            .await?;
        self.adopt_session(response).await
    }

    /// Authenticate and start a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let response = self
            .inner
            .http
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        self.adopt_session(response).await
    }

    /// End the session: best-effort server revocation, then local teardown
    /// and a broadcast to siblings.
    pub async fn logout(&self) {
        if let Some(token) = self.access_token() {
            let outcome = self
                .inner
                .http
                .post(self.url("/auth/logout"))
                .bearer_auth(token)
                .send()
                .await;
            if let Err(e) = outcome {
                tracing::warn!(error = %e, "server-side logout failed; clearing locally");
            }
        }
        self.teardown();
    }

    /// Page-load initialization: if no token is held, attempt one silent
    /// refresh using the cookie credential. Failure is a normal anonymous
    /// start, not an error.
    pub async fn initialize(&self) {
        if self.access_token().is_none() {
            if let Ok(token) = self.refresh_access_token().await {
                if let Ok(user) = self.fetch_me(&token).await {
                    self.inner.state.write().user = Some(user);
                }
            }
        }
        self.inner.state.write().initialized = true;
    }

    // ── Authenticated requests ──────────────────────────────────────

    /// Send an authenticated request. On a 401 from a request that carried a
    /// token: one refresh, one retry. A failed refresh clears the session.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let token = self.access_token();
        let response = self
            .send_raw(method.clone(), path, body, token.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED || token.is_none() {
            return Ok(response);
        }

        match self.refresh_access_token().await {
            Ok(new_token) => Ok(self.send_raw(method, path, body, Some(&new_token)).await?),
            Err(_) => {
                self.teardown();
                Err(ClientError::SessionExpired)
            }
        }
    }

    /// Refresh the access token, deduplicating concurrent callers: whoever
    /// arrives while a refresh is in flight awaits the same shared future.
    pub async fn refresh_access_token(&self) -> Result<String, RefreshError> {
        let fut = {
            let mut slot = self.inner.refresh_slot.lock();
            match slot.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let fut: RefreshFuture = async move {
                        let result = perform_refresh(&inner).await;
                        // Clear the handle so a later failure starts a fresh
                        // attempt; callers already waiting share this result.
                        inner.refresh_slot.lock().take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };
        fut.await
    }

    // ── Internals ───────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.inner.base_url)
    }

    async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut builder = self.inner.http.request(method, self.url(path));
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(json) = body {
            builder = builder.json(json);
        }
        builder.send().await
    }

    /// Parse a login/register response, adopt the session, notify siblings.
    async fn adopt_session(&self, response: reqwest::Response) -> Result<User, ClientError> {
        let status = response.status();
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|_| ClientError::MalformedResponse)?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| "request failed".to_string()),
            });
        }

        let data = envelope.data.ok_or(ClientError::MalformedResponse)?;
        let session: SessionData =
            serde_json::from_value(data).map_err(|_| ClientError::MalformedResponse)?;

        {
            let mut state = self.inner.state.write();
            state.access_token = Some(session.access_token.clone());
            state.user = Some(session.user.clone());
            state.initialized = true;
        }
        let _ = self.inner.events.send(SessionEvent::LoggedIn {
            access_token: session.access_token,
            user: session.user.clone(),
        });
        Ok(session.user)
    }

    async fn fetch_me(&self, token: &str) -> Result<User, ClientError> {
        let response = self
            .inner
            .http
            .get(self.url("/auth/me"))
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Api {
                status: response.status().as_u16(),
                message: "profile fetch failed".to_string(),
            });
        }
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|_| ClientError::MalformedResponse)?;
        #[derive(Deserialize)]
        struct MeData {
            user: User,
        }
        let data = envelope.data.ok_or(ClientError::MalformedResponse)?;
        let me: MeData = serde_json::from_value(data).map_err(|_| ClientError::MalformedResponse)?;
        Ok(me.user)
    }

    /// Clear local session state; broadcast `LoggedOut` only when there was a
    /// session to clear, so concurrent teardowns produce a single event.
    fn teardown(&self) {
        let had_session = {
            let mut state = self.inner.state.write();
            let had = state.access_token.is_some() || state.user.is_some();
            state.access_token = None;
            state.user = None;
            had
        };
        if had_session {
            let _ = self.inner.events.send(SessionEvent::LoggedOut);
        }
    }
}

/// The actual network refresh; runs at most once per in-flight window.
async fn perform_refresh(inner: &Arc<Inner>) -> Result<String, RefreshError> {
    let response = inner
        .http
        .post(format!("{}/api/v1/auth/refresh", inner.base_url))
        .send()
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(RefreshError::Unauthorized);
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RefreshData {
        access_token: String,
    }
    let envelope: Envelope = response
        .json()
        .await
        .map_err(|e| RefreshError::Transport(e.to_string()))?;
    let data = envelope
        .data
        .ok_or_else(|| RefreshError::Transport("missing data in refresh response".into()))?;
    let parsed: RefreshData = serde_json::from_value(data)
        .map_err(|e| RefreshError::Transport(e.to_string()))?;

    inner.state.write().access_token = Some(parsed.access_token.clone());
    tracing::debug!("access token refreshed");
    Ok(parsed.access_token)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_json() -> serde_json::Value {
        serde_json::json!({
            "id": "user-1",
            "email": "a@x.com",
            "name": "A",
            "phone": null,
            "role": "customer",
            "isActive": true,
            "createdAt": 0,
            "updatedAt": 0,
        })
    }

    fn envelope(data: serde_json::Value) -> serde_json::Value {
        serde_json::json!({ "success": true, "message": "ok", "data": data })
    }

    fn seeded_client(uri: &str, token: &str) -> SessionClient {
        let client = SessionClient::new(uri).unwrap();
        client.inner.state.write().access_token = Some(token.to_string());
        client
    }

    #[tokio::test]
    async fn login_broadcasts_to_siblings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                serde_json::json!({ "user": user_json(), "accessToken": "tok-1" }),
            )))
            .mount(&server)
            .await;

        let tab_a = SessionClient::new(server.uri()).unwrap();
        let tab_b = tab_a.sibling();
        let mut events = tab_b.subscribe();

        let user = tab_a.login("a@x.com", "Secret1").await.unwrap();
        assert_eq!(user.role, Role::Customer);
        assert_eq!(tab_a.access_token().as_deref(), Some("tok-1"));

        // The sibling picks the session up from the event stream alone.
        let event = events.recv().await.unwrap();
        tab_b.apply_event(&event);
        assert_eq!(tab_b.access_token().as_deref(), Some("tok-1"));
        assert_eq!(tab_b.current_user().unwrap().email, "a@x.com");
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh_call() {
        let server = MockServer::start().await;

        // Stale-token requests fail, fresh-token retries succeed.
        Mock::given(method("GET"))
            .and(path("/api/v1/orders"))
            .and(header("Authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/orders"))
            .and(header("Authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                serde_json::json!({ "orders": [] }),
            )))
            .expect(2)
            .mount(&server)
            .await;
        // The dedup invariant: exactly one refresh round trip.
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(100))
                    .set_body_json(envelope(serde_json::json!({ "accessToken": "fresh" }))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = seeded_client(&server.uri(), "stale");
        let (first, second) = tokio::join!(
            client.request(Method::GET, "/orders", None),
            client.request(Method::GET, "/orders", None),
        );
        assert_eq!(first.unwrap().status(), 200);
        assert_eq!(second.unwrap().status(), 200);
        assert_eq!(client.access_token().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn failed_refresh_tears_the_session_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/orders"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = seeded_client(&server.uri(), "stale");
        client.inner.state.write().user = None;
        let mut events = client.subscribe();

        let err = client
            .request(Method::GET, "/orders", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SessionExpired));
        assert!(!client.is_authenticated());
        assert!(matches!(events.try_recv(), Ok(SessionEvent::LoggedOut)));
    }

    #[tokio::test]
    async fn unauthenticated_401_is_returned_without_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/orders"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        // No token held: the 401 comes straight back, no refresh attempt.
        let client = SessionClient::new(server.uri()).unwrap();
        let response = client.request(Method::GET, "/orders", None).await.unwrap();
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn initialize_without_credential_is_silently_anonymous() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = SessionClient::new(server.uri()).unwrap();
        client.initialize().await;
        assert!(client.is_initialized());
        assert!(!client.is_authenticated());
        assert!(client.current_user().is_none());
    }

    #[tokio::test]
    async fn initialize_with_credential_restores_the_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(
                serde_json::json!({ "accessToken": "restored" }),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/me"))
            .and(header("Authorization", "Bearer restored"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope(serde_json::json!({ "user": user_json() }))),
            )
            .mount(&server)
            .await;

        let client = SessionClient::new(server.uri()).unwrap();
        client.initialize().await;
        assert!(client.is_authenticated());
        assert_eq!(client.current_user().unwrap().email, "a@x.com");
    }

    #[tokio::test]
    async fn spawn_sync_applies_sibling_logout() {
        let server = MockServer::start().await;
        let tab_a = seeded_client(&server.uri(), "tok-1");
        let tab_b = tab_a.sibling();
        tab_b.apply_event(&SessionEvent::LoggedIn {
            access_token: "tok-1".into(),
            user: serde_json::from_value(user_json()).unwrap(),
        });
        let sync = tab_b.spawn_sync();

        // Local-only teardown on tab A (no server call needed for the test).
        tab_a.teardown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!tab_b.is_authenticated());
        sync.abort();
    }
}
