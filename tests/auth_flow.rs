//! End-to-end session lifecycle against a live gateway on an ephemeral port.

use maitred::auth::store::{AuthStore, NewUser, Role};
use maitred::client::SessionClient;
use maitred::config::{Config, Environment};
use maitred::db::Db;
use maitred::gateway::{router, AppState};

struct TestServer {
    base_url: String,
    db_path: std::path::PathBuf,
    _tmp: tempfile::TempDir,
}

async fn spawn_gateway() -> TestServer {
    let tmp = tempfile::TempDir::new().unwrap();
    let db_path = tmp.path().join("maitred.db");
    let config = Config {
        access_secret: "e2e-access-secret".into(),
        refresh_secret: "e2e-refresh-secret".into(),
        environment: Environment::Development,
        db_path: db_path.clone(),
        host: "127.0.0.1".into(),
        port: 0,
    };
    let state = AppState::build(&config).unwrap();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        db_path,
        _tmp: tmp,
    }
}

/// Pull the `refresh_token` cookie value out of a response's `Set-Cookie`.
fn refresh_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refresh_token="))
        .map(|v| {
            v.split(';')
                .next()
                .unwrap()
                .trim_start_matches("refresh_token=")
                .to_string()
        })
}

fn register_body(email: &str) -> serde_json::Value {
    serde_json::json!({ "email": email, "password": "Secret1", "name": "A" })
}

/// Register → me → bad login → refresh (rotation) → replay rejection.
#[tokio::test]
async fn full_session_lifecycle() {
    let server = spawn_gateway().await;
    let http = reqwest::Client::new();

    // Register: 201, access token in the body, refresh credential as cookie.
    let response = http
        .post(format!("{}/api/v1/auth/register", server.base_url))
        .json(&register_body("a@x.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let original_cookie = refresh_cookie(&response).expect("refresh cookie set");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    let access_token = body["data"]["accessToken"].as_str().unwrap().to_string();

    // Credential secrecy: no hash, no token list in the user payload.
    let user = body["data"]["user"].as_object().unwrap();
    assert_eq!(user["email"], "a@x.com");
    assert!(!user.contains_key("password"));
    assert!(!user.contains_key("passwordHash"));
    assert!(!user.contains_key("refreshTokens"));

    // The access token works against a protected endpoint.
    let me = http
        .get(format!("{}/api/v1/auth/me", server.base_url))
        .bearer_auth(&access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), 200);
    let me_body: serde_json::Value = me.json().await.unwrap();
    assert_eq!(me_body["data"]["user"]["email"], "a@x.com");

    // Wrong password: 401 with the anti-enumeration message.
    let bad_login = http
        .post(format!("{}/api/v1/auth/login", server.base_url))
        .json(&serde_json::json!({ "email": "a@x.com", "password": "WrongOne" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_login.status(), 401);
    let bad_body: serde_json::Value = bad_login.json().await.unwrap();
    assert_eq!(bad_body["message"], "Invalid email or password");

    // Refresh with the registration cookie: new access token, rotated cookie.
    let refreshed = http
        .post(format!("{}/api/v1/auth/refresh", server.base_url))
        .header("Cookie", format!("refresh_token={original_cookie}"))
        .send()
        .await
        .unwrap();
    assert_eq!(refreshed.status(), 200);
    let rotated_cookie = refresh_cookie(&refreshed).expect("rotated cookie set");
    assert_ne!(rotated_cookie, original_cookie);
    let refreshed_body: serde_json::Value = refreshed.json().await.unwrap();
    assert!(refreshed_body["data"]["accessToken"].is_string());

    // Replaying the pre-rotation cookie fails.
    let replay = http
        .post(format!("{}/api/v1/auth/refresh", server.base_url))
        .header("Cookie", format!("refresh_token={original_cookie}"))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 401);

    // The rotated cookie still works.
    let again = http
        .post(format!("{}/api/v1/auth/refresh", server.base_url))
        .header("Cookie", format!("refresh_token={rotated_cookie}"))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 200);
}

#[tokio::test]
async fn logout_revokes_the_refresh_credential() {
    let server = spawn_gateway().await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/api/v1/auth/register", server.base_url))
        .json(&register_body("b@x.com"))
        .send()
        .await
        .unwrap();
    let cookie = refresh_cookie(&response).unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    let access_token = body["data"]["accessToken"].as_str().unwrap().to_string();

    // Logout clears the cookie and revokes the stored token.
    let logout = http
        .post(format!("{}/api/v1/auth/logout", server.base_url))
        .bearer_auth(&access_token)
        .header("Cookie", format!("refresh_token={cookie}"))
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), 200);
    let cleared = logout
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refresh_token="))
        .unwrap()
        .to_string();
    assert!(cleared.contains("Max-Age=0"));

    // The revoked token can no longer refresh.
    let replay = http
        .post(format!("{}/api/v1/auth/refresh", server.base_url))
        .header("Cookie", format!("refresh_token={cookie}"))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 401);

    // The stateless access token stays verifiable until it expires.
    let me = http
        .get(format!("{}/api/v1/auth/me", server.base_url))
        .bearer_auth(&access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), 200);

    // Logout without an access token is refused.
    let anonymous_logout = http
        .post(format!("{}/api/v1/auth/logout", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous_logout.status(), 401);
}

#[tokio::test]
async fn admin_gates_protect_dish_writes() {
    let server = spawn_gateway().await;
    let http = reqwest::Client::new();

    // Plant an admin directly in the store; there is deliberately no
    // admin-creation endpoint.
    let store = AuthStore::new(Db::open(&server.db_path).unwrap()).unwrap();
    store
        .create_user(NewUser {
            email: "chef@x.com".into(),
            password_hash: bcrypt::hash("AdminPass1", 4).unwrap(),
            name: "Chef".into(),
            phone: None,
            role: Role::Admin,
        })
        .unwrap()
        .unwrap();

    let customer: serde_json::Value = http
        .post(format!("{}/api/v1/auth/register", server.base_url))
        .json(&register_body("c@x.com"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let customer_token = customer["data"]["accessToken"].as_str().unwrap();

    let dish = serde_json::json!({
        "name": "Dal Makhani",
        "description": "Slow-cooked black lentils",
        "price": 11.0,
        "category": "main",
    });

    // No token: 401. Customer token: 403. Admin token: 201.
    let anonymous = http
        .post(format!("{}/api/v1/dishes", server.base_url))
        .json(&dish)
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    let forbidden = http
        .post(format!("{}/api/v1/dishes", server.base_url))
        .bearer_auth(customer_token)
        .json(&dish)
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    let admin: serde_json::Value = http
        .post(format!("{}/api/v1/auth/login", server.base_url))
        .json(&serde_json::json!({ "email": "chef@x.com", "password": "AdminPass1" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let admin_token = admin["data"]["accessToken"].as_str().unwrap();

    let created = http
        .post(format!("{}/api/v1/dishes", server.base_url))
        .bearer_auth(admin_token)
        .json(&dish)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    // The new dish is publicly listed.
    let listing: serde_json::Value = http
        .get(format!("{}/api/v1/dishes", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["data"]["dishes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let server = spawn_gateway().await;
    let http = reqwest::Client::new();

    let first = http
        .post(format!("{}/api/v1/auth/register", server.base_url))
        .json(&register_body("dup@x.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 201);

    let second = http
        .post(format!("{}/api/v1/auth/register", server.base_url))
        .json(&register_body("dup@x.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 400);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["message"], "User already exists with this email");
}

/// The session client drives the same live server: register, call a
/// protected endpoint, restore a session from the cookie alone, log out.
#[tokio::test]
async fn session_client_against_live_gateway() {
    let server = spawn_gateway().await;

    let tab_a = SessionClient::new(server.base_url.as_str()).unwrap();
    let mut events = tab_a.subscribe();

    let user = tab_a
        .register(&maitred::auth::RegisterRequest {
            email: "client@x.com".into(),
            password: "Secret1".into(),
            name: "Client".into(),
            phone: None,
        })
        .await
        .unwrap();
    assert_eq!(user.email, "client@x.com");
    assert!(tab_a.is_authenticated());

    // A sibling tab adopts the session from the broadcast event.
    let tab_b = tab_a.sibling();
    let event = events.recv().await.unwrap();
    tab_b.apply_event(&event);
    assert_eq!(tab_b.access_token(), tab_a.access_token());

    // Protected call through the synchronizer.
    let orders = tab_a
        .request(reqwest::Method::GET, "/orders", None)
        .await
        .unwrap();
    assert_eq!(orders.status(), 200);

    // A fresh handle sharing the cookie jar restores the session silently.
    let tab_c = tab_a.sibling();
    tab_c.initialize().await;
    assert!(tab_c.is_authenticated());
    assert_eq!(tab_c.current_user().unwrap().email, "client@x.com");

    // Logout tears down and the refresh credential is gone for everyone
    // sharing the jar.
    tab_c.logout().await;
    assert!(!tab_c.is_authenticated());
    assert!(tab_c.refresh_access_token().await.is_err());
}
