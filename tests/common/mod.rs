//! Shared test utilities for integration tests.
//!
//! `TestClient` drives the full application router (every middleware
//! included) against a private in-memory database. It behaves like a small
//! browser: cookies set by the server are sent back on later requests, and
//! POSTs carry the XSRF token from the `xsrf_token` cookie unless a test asks
//! otherwise. Outgoing mail lands in a memory outbox.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use markitdone::auth::hash_password;
use markitdone::config::{Config, EmailBackend};
use markitdone::db::create_in_memory_pool;
use markitdone::db::queries::{sessions, users};
use markitdone::mail::{EmailMessage, Mailer, Outbox};
use markitdone::models::NewUser;
use markitdone::server;
use markitdone::session::{SessionData, SESSION_COOKIE, XSRF_COOKIE};
use markitdone::state::AppState;
use markitdone::xsrf::XSRF_HEADER;
use tower::ServiceExt;

pub const PASSWORD: &str = "s3cret-pass";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("response is not JSON ({}): {}", e, self.body))
    }
}

/// A test client that simulates a browser session, allowing sequential requests
/// against the application.
pub struct TestClient {
    pub state: AppState,
    router: Router,
    outbox: Outbox,
    cookies: Mutex<HashMap<String, String>>,
}

impl TestClient {
    /// Create a client with a fresh in-memory database. Must be called from
    /// inside a tokio runtime (the background worker is spawned here).
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(mut config: Config) -> Self {
        config.database_path = PathBuf::from(":memory:");
        config.migrations_path = PathBuf::from("migrations");
        config.static_path = PathBuf::from("common_static");
        config.email_backend = EmailBackend::Memory;

        let pool = create_in_memory_pool().expect("Failed to create in-memory pool");
        let outbox = Outbox::default();
        let state = server::build_state(config, pool, Mailer::Memory(outbox.clone()))
            .expect("Failed to build application state");
        let router = server::router(state.clone());

        Self {
            state,
            router,
            outbox,
            cookies: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    fn cookie_header(&self) -> String {
        self.cookies
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn store_cookies(&self, headers: &HeaderMap) {
        let mut jar = self.cookies.lock().unwrap();
        for value in headers.get_all(SET_COOKIE) {
            let raw = value.to_str().unwrap();
            let pair = raw.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            let expired = raw.contains("Max-Age=0") || value.is_empty();
            if expired {
                jar.remove(name.trim());
            } else {
                jar.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        self.store_cookies(&headers);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).to_string(),
        }
    }

    pub async fn get_response(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .uri(uri)
            .header(COOKIE, self.cookie_header())
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Make a GET request and return status and body.
    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        let response = self.get_response(uri).await;
        (response.status, response.body)
    }

    /// Get JSON from an endpoint and parse it.
    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = self.get_response(uri).await;
        let json = if response.body.is_empty() {
            serde_json::Value::Null
        } else {
            response.json()
        };
        (response.status, json)
    }

    fn form_request(&self, uri: &str, form_data: &[(&str, &str)], with_xsrf: bool) -> Request<Body> {
        let body = form_data
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header(COOKIE, self.cookie_header());
        if with_xsrf {
            if let Some(token) = self.cookie(XSRF_COOKIE) {
                builder = builder.header(XSRF_HEADER, token);
            }
        }
        builder.body(Body::from(body)).unwrap()
    }

    /// POST a url-encoded form with the XSRF header set.
    pub async fn post_form_response(&self, uri: &str, form_data: &[(&str, &str)]) -> TestResponse {
        self.send(self.form_request(uri, form_data, true)).await
    }

    /// Make a POST request with form data and return status and body.
    pub async fn post_form(&self, uri: &str, form_data: &[(&str, &str)]) -> (StatusCode, String) {
        let response = self.post_form_response(uri, form_data).await;
        (response.status, response.body)
    }

    /// POST without the XSRF header; the form body is sent as given.
    pub async fn post_form_without_xsrf(
        &self,
        uri: &str,
        form_data: &[(&str, &str)],
    ) -> TestResponse {
        self.send(self.form_request(uri, form_data, false)).await
    }

    /// POST a form to a JSON endpoint and parse the reply (`Null` if empty).
    pub async fn post_json(&self, uri: &str, form_data: &[(&str, &str)]) -> (StatusCode, serde_json::Value) {
        let response = self.post_form_response(uri, form_data).await;
        let json = if response.body.is_empty() {
            serde_json::Value::Null
        } else {
            response.json()
        };
        (response.status, json)
    }

    // =========================================================================
    // Cookies and session
    // =========================================================================

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }

    pub fn clear_cookies(&self) {
        self.cookies.lock().unwrap().clear();
    }

    /// The stored session behind the current `sessionid` cookie.
    pub fn session_data(&self) -> Option<SessionData> {
        let key = self.cookie(SESSION_COOKIE)?;
        let conn = self.state.db.get().unwrap();
        let raw = sessions::get_session(&conn, &key).unwrap()?;
        Some(serde_json::from_str(&raw).unwrap())
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Insert a user directly and return its id.
    pub fn create_user(&self, username: &str, is_active: bool, is_staff: bool) -> i64 {
        let conn = self.state.db.get().unwrap();
        users::create_user(
            &conn,
            &NewUser {
                username: username.into(),
                email: format!("{}@example.com", username),
                password_hash: hash_password(PASSWORD).unwrap(),
                is_active,
                is_staff,
            },
        )
        .unwrap()
    }

    /// Fetch the login form (for the XSRF cookie) and submit it.
    pub async fn login(&self, username: &str, password: &str) -> TestResponse {
        self.get("/accounts/login/").await;
        self.post_form_response(
            "/accounts/login/",
            &[("username", username), ("password", password)],
        )
        .await
    }

    /// Create an active user and log in as them.
    pub async fn logged_in(username: &str) -> (Self, i64) {
        let client = Self::new();
        let id = client.create_user(username, true, false);
        let response = client.login(username, PASSWORD).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "login failed: {}", response.body);
        (client, id)
    }

    // =========================================================================
    // Mail
    // =========================================================================

    /// Wait for the background worker to deliver `count` messages.
    pub async fn wait_for_mail(&self, count: usize) -> Vec<EmailMessage> {
        for _ in 0..200 {
            {
                let sent = self.outbox.lock().unwrap();
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} messages, outbox has {}",
            count,
            self.outbox.lock().unwrap().len()
        );
    }

    pub fn sent_mail(&self) -> Vec<EmailMessage> {
        self.outbox.lock().unwrap().clone()
    }

    // =========================================================================
    // Helper methods for creating entities through the API
    // =========================================================================

    /// Create a list through the API and return its id.
    pub async fn create_list(&self, name: &str) -> i64 {
        let (status, json) = self.post_json("/todos/lists/add/", &[("name", name)]).await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
        json["object"]["id"].as_i64().unwrap()
    }

    /// Create a todo through the API and return the created object.
    pub async fn create_todo(&self, list_id: i64, fields: &[(&str, &str)]) -> serde_json::Value {
        let (status, json) = self
            .post_json(&format!("/todos/lists/{}/todos/add/", list_id), fields)
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", json);
        json["object"].clone()
    }
}
