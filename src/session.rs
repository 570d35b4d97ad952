//! Server-side sessions.
//!
//! A session is a JSON document in the `sessions` table, addressed by an
//! opaque random key carried in the `sessionid` cookie. The middleware loads
//! it before the handler runs and writes it back only when something changed,
//! so anonymous visitors that never touch their session leave no rows behind.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::db::queries::sessions;
use crate::db::TIMESTAMP_FORMAT;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Cookie holding the session key.
pub const SESSION_COOKIE: &str = "sessionid";

/// Script-readable cookie mirroring the session's XSRF token.
pub const XSRF_COOKIE: &str = "xsrf_token";

/// Everything kept per visitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Raw timezone name as submitted on the set-timezone page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub django_timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xsrf_token: Option<String>,
}

#[derive(Debug, Default)]
struct SessionInner {
    key: Option<String>,
    data: SessionData,
    modified: bool,
    /// Keys to delete when the request completes (after login or logout).
    stale_keys: Vec<String>,
}

/// Handle to the current request's session. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    fn new(key: Option<String>, data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                key,
                data,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> SessionData {
        self.lock().data.clone()
    }

    pub fn key(&self) -> Option<String> {
        self.lock().key.clone()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.lock().data.user_id
    }

    pub fn timezone(&self) -> Option<String> {
        self.lock().data.django_timezone.clone()
    }

    pub fn set_timezone(&self, timezone: impl Into<String>) {
        let mut inner = self.lock();
        inner.data.django_timezone = Some(timezone.into());
        inner.modified = true;
    }

    /// The session's XSRF token, created on first use.
    pub fn xsrf_token(&self) -> String {
        let mut inner = self.lock();
        if let Some(token) = &inner.data.xsrf_token {
            return token.clone();
        }
        let token = new_token();
        inner.data.xsrf_token = Some(token.clone());
        inner.modified = true;
        token
    }

    /// Bind the session to `user_id` under a fresh key and XSRF token. The
    /// timezone choice survives.
    pub fn login(&self, user_id: i64) {
        let mut inner = self.lock();
        if let Some(old) = inner.key.take() {
            inner.stale_keys.push(old);
        }
        inner.data.user_id = Some(user_id);
        inner.data.xsrf_token = Some(new_token());
        inner.modified = true;
    }

    /// Drop all session data and start over as an anonymous visitor.
    pub fn flush(&self) {
        let mut inner = self.lock();
        if let Some(old) = inner.key.take() {
            inner.stale_keys.push(old);
        }
        inner.data = SessionData::default();
        inner.modified = false;
    }

    /// Write pending changes and keep the cookies in sync.
    fn persist(&self, state: &AppState, cookies: &Cookies) -> AppResult<()> {
        let mut inner = self.lock();
        let had_stale = !inner.stale_keys.is_empty();
        if !inner.modified && !had_stale {
            return Ok(());
        }

        let conn = state.db.get()?;
        for key in inner.stale_keys.drain(..) {
            sessions::delete_session(&conn, &key)?;
        }

        if !inner.modified {
            cookies.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
            cookies.remove(Cookie::build((XSRF_COOKIE, "")).path("/").build());
            return Ok(());
        }

        let key = inner.key.get_or_insert_with(new_token).clone();
        let age_days = state.config.session_age_days;
        let expires_at = (Utc::now() + chrono::Duration::days(age_days))
            .format(TIMESTAMP_FORMAT)
            .to_string();
        let data = serde_json::to_string(&inner.data)
            .map_err(|e| AppError::Internal(format!("Session encoding failed: {}", e)))?;
        sessions::save_session(&conn, &key, &data, &expires_at)?;
        inner.modified = false;

        cookies.add(
            Cookie::build((SESSION_COOKIE, key))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(time::Duration::days(age_days))
                .build(),
        );
        if let Some(token) = inner.data.xsrf_token.clone() {
            cookies.add(
                Cookie::build((XSRF_COOKIE, token))
                    .path("/")
                    .same_site(SameSite::Lax)
                    .max_age(time::Duration::days(age_days))
                    .build(),
            );
        }
        Ok(())
    }
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn load(state: &AppState, key: &str) -> AppResult<Option<SessionData>> {
    let conn = state.db.get()?;
    let Some(raw) = sessions::get_session(&conn, key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(data) => Ok(Some(data)),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding undecodable session");
            Ok(None)
        }
    }
}

/// Load the visitor's session, expose it to the handler, and save it
/// afterwards.
pub async fn session_middleware(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let session = match cookies.get(SESSION_COOKIE) {
        Some(cookie) => {
            let key = cookie.value().to_string();
            match load(&state, &key) {
                Ok(Some(data)) => Session::new(Some(key), data),
                Ok(None) => Session::default(),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load session");
                    Session::default()
                }
            }
        }
        None => Session::default(),
    };

    request.extensions_mut().insert(session.clone());
    let response = next.run(request).await;

    if let Err(e) = session.persist(&state, &cookies) {
        tracing::error!(error = %e, "Failed to save session");
    }

    response
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("Session middleware is not installed".into()))
    }
}
