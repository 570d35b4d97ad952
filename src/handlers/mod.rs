pub mod accounts;
pub mod admin;
pub mod home;
pub mod registration;
pub mod tags;
pub mod todos;

use axum::routing::{get, post};
use axum::Router;

use crate::auth;
use crate::models::User;
use crate::session::Session;
use crate::state::AppState;
use crate::timezone::ActiveTimezone;
use crate::VERSION;

/// Fields every page passes to `base.html`.
pub struct PageContext {
    pub title: String,
    pub version: &'static str,
    pub xsrf_token: String,
    /// Empty for anonymous visitors.
    pub username: String,
    pub is_staff: bool,
    pub timezone: &'static str,
}

impl PageContext {
    pub fn new(title: &str, session: &Session, user: Option<&User>, tz: ActiveTimezone) -> Self {
        Self {
            title: title.to_string(),
            version: VERSION,
            xsrf_token: session.xsrf_token(),
            username: user.map(|u| u.username.clone()).unwrap_or_default(),
            is_staff: user.is_some_and(|u| u.is_staff),
            timezone: tz.name(),
        }
    }

    /// Context for pages rendered outside the session middleware.
    pub fn anonymous(title: &str, tz: ActiveTimezone) -> Self {
        Self {
            title: title.to_string(),
            version: VERSION,
            xsrf_token: String::new(),
            username: String::new(),
            is_staff: false,
            timezone: tz.name(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.username.is_empty()
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        // Pages
        .route("/", get(home::index))
        // Accounts
        .route(
            "/accounts/set_timezone/",
            get(accounts::set_timezone_page).post(accounts::set_timezone),
        )
        .route("/accounts/authenticate/", get(accounts::authenticate))
        .route(
            "/accounts/login/",
            get(auth::login_page).post(auth::login_submit),
        )
        .route("/accounts/logout/", get(auth::logout).post(auth::logout))
        // Registration
        .route(
            "/accounts/register/",
            get(registration::register_page).post(registration::register),
        )
        .route(
            "/accounts/register/complete/",
            get(registration::registration_complete),
        )
        .route(
            "/accounts/activate/complete/",
            get(registration::activation_complete),
        )
        .route("/accounts/activate/:key/", get(registration::activate))
        // To-do lists (JSON)
        .route("/todos/lists/", get(todos::list_lists))
        .route("/todos/lists/add/", post(todos::create_list))
        .route("/todos/lists/:id/", get(todos::show_list))
        .route("/todos/lists/:id/update/", post(todos::update_list))
        .route("/todos/lists/:id/delete/", post(todos::delete_list))
        .route("/todos/lists/:id/todos/", get(todos::list_todos))
        .route("/todos/lists/:id/todos/add/", post(todos::create_todo))
        .route("/todos/tags/", get(tags::index))
        .route("/todos/:id/", get(todos::show_todo))
        .route("/todos/:id/update/", post(todos::update_todo))
        .route("/todos/:id/toggle/", post(todos::toggle_todo))
        .route("/todos/:id/delete/", post(todos::delete_todo))
        // Admin
        .route("/admin/", get(admin::index))
        .route("/admin/users/:id/active/", post(admin::toggle_active))
        // Health check
        .route("/health", get(health))
}

async fn health() -> &'static str {
    "OK"
}
