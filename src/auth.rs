//! Authentication: password hashing, request guards and the login/logout
//! pages.
//!
//! Passwords are stored as Argon2id PHC strings. The logged-in user's id
//! lives in the server-side session; the extractors below load the account
//! on every request so deactivated users lose access immediately.

use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use askama::Template;
use axum::async_trait;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries::users;
use crate::error::{ApiError, AppError, AppResult, RenderHtml};
use crate::handlers::PageContext;
use crate::models::User;
use crate::session::Session;
use crate::state::AppState;
use crate::timezone::ActiveTimezone;

/// Where anonymous visitors are sent by [`CurrentUser`].
pub const LOGIN_URL: &str = "/accounts/login/";

/// Where a successful login lands without a usable `next`.
pub const LOGIN_REDIRECT_URL: &str = "/";

/// Argon2id hash with default parameters that matches no password.
const DUMMY_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AppError::Internal(format!("Salt encoding failed: {}", e)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against an Argon2 hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        tracing::error!("Stored password hash is not a valid PHC string");
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// The active account bound to the session, if any.
fn session_user(parts: &Parts, state: &AppState) -> AppResult<Option<User>> {
    let Some(user_id) = parts.extensions.get::<Session>().and_then(|s| s.user_id()) else {
        return Ok(None);
    };
    let conn = state.db.get()?;
    Ok(users::get_user(&conn, user_id)?.filter(|u| u.is_active))
}

/// Only same-site paths are followed after login.
fn is_safe_redirect(next: &str) -> bool {
    next.starts_with('/') && !next.starts_with("//") && !next.contains('\\')
}

fn login_redirect(parts: &Parts) -> Response {
    let next = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Redirect::to(&format!("{}?next={}", LOGIN_URL, urlencoding::encode(next))).into_response()
}

/// Logged-in user for HTML pages. Anonymous visitors are redirected to the
/// login page with a `next` parameter.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match session_user(parts, state) {
            Ok(Some(user)) => Ok(Self(user)),
            Ok(None) => Err(login_redirect(parts)),
            Err(e) => Err(e.into_response()),
        }
    }
}

/// The logged-in user on pages that anonymous visitors may also see.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        session_user(parts, state).map(Self)
    }
}

/// Logged-in user for script endpoints. Anonymous requests get a bare 401.
#[derive(Debug, Clone)]
pub struct AjaxUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AjaxUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        session_user(parts, state)?
            .map(Self)
            .ok_or(ApiError(AppError::Unauthorized))
    }
}

/// Logged-in staff member. Other users get 403.
#[derive(Debug, Clone)]
pub struct StaffUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            tracing::warn!(user_id = user.id, "Non-staff user tried to reach admin");
            return Err(
                AppError::Forbidden("You need staff permissions to view this page.".into())
                    .into_response(),
            );
        }
        Ok(Self(user))
    }
}

/// Template for the login page.
#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
    pub username: String,
    pub next: String,
    pub error: String,
}

impl LoginTemplate {
    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}

#[derive(Template)]
#[template(path = "pages/logged_out.html")]
pub struct LoggedOutTemplate {
    pub page: PageContext,
}

#[derive(Debug, Deserialize)]
pub struct NextParam {
    #[serde(default)]
    pub next: String,
}

/// Form data for login.
#[derive(Debug, Deserialize)]
pub struct LoginFormData {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: String,
}

/// Render the login page.
pub async fn login_page(
    session: Session,
    tz: ActiveTimezone,
    Query(params): Query<NextParam>,
) -> AppResult<Html<String>> {
    LoginTemplate {
        page: PageContext::new("Log in", &session, None, tz),
        username: String::new(),
        next: params.next,
        error: String::new(),
    }
    .render_html()
}

/// Handle login form submission.
pub async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    tz: ActiveTimezone,
    Form(form): Form<LoginFormData>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let username = form.username.trim();

    let user = users::get_user_by_username(&conn, username)?;
    // Unknown usernames still pay for one verification.
    let stored_hash = user
        .as_ref()
        .map_or(DUMMY_PASSWORD_HASH, |u| u.password_hash.as_str());
    let password_ok = verify_password(&form.password, stored_hash);
    let user = user.filter(|_| password_ok);

    let error = match user {
        Some(user) if user.is_active => {
            users::touch_last_login(&conn, user.id)?;
            session.login(user.id);
            tracing::info!(user_id = user.id, username = %user.username, "User logged in");

            let target = if is_safe_redirect(&form.next) {
                form.next.as_str()
            } else {
                LOGIN_REDIRECT_URL
            };
            return Ok(Redirect::to(target).into_response());
        }
        Some(_) => "This account is inactive.",
        None => {
            tracing::info!(username, "Failed login attempt");
            "Please enter a correct username and password."
        }
    };

    let html = LoginTemplate {
        page: PageContext::new("Log in", &session, None, tz),
        username: username.to_string(),
        next: form.next,
        error: error.into(),
    }
    .render_html()?;
    Ok(html.into_response())
}

/// Handle logout.
pub async fn logout(session: Session, tz: ActiveTimezone) -> AppResult<Html<String>> {
    if let Some(user_id) = session.user_id() {
        tracing::info!(user_id, "User logged out");
    }
    session.flush();

    LoggedOutTemplate {
        page: PageContext::new("Logged out", &session, None, tz),
    }
    .render_html()
}
