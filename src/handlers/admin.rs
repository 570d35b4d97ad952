use askama::Template;
use axum::extract::{Path, State};
use axum::response::{Html, Redirect};

use crate::auth::StaffUser;
use crate::db::queries::{todo_lists, todos, users};
use crate::error::{AppError, AppResult, RenderHtml};
use crate::handlers::PageContext;
use crate::models::User;
use crate::session::Session;
use crate::state::AppState;
use crate::timezone::ActiveTimezone;

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: String,
    pub last_login: String,
}

impl UserRow {
    fn new(user: User, tz: ActiveTimezone) -> Self {
        Self {
            date_joined: tz.localize(&user.date_joined),
            last_login: user
                .last_login
                .as_deref()
                .map(|t| tz.localize(t))
                .unwrap_or_else(|| user.last_login_or_never().to_string()),
            id: user.id,
            username: user.username,
            email: user.email,
            is_active: user.is_active,
            is_staff: user.is_staff,
        }
    }
}

#[derive(Template)]
#[template(path = "pages/admin.html")]
pub struct AdminTemplate {
    pub page: PageContext,
    pub user_count: i64,
    pub list_count: i64,
    pub todo_count: i64,
    pub users: Vec<UserRow>,
}

pub async fn index(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    session: Session,
    tz: ActiveTimezone,
) -> AppResult<Html<String>> {
    let conn = state.db.get()?;

    AdminTemplate {
        page: PageContext::new("Administration", &session, Some(&staff), tz),
        user_count: users::count_users(&conn)?,
        list_count: todo_lists::count_lists(&conn)?,
        todo_count: todos::count_todos(&conn)?,
        users: users::list_users(&conn)?
            .into_iter()
            .map(|u| UserRow::new(u, tz))
            .collect(),
    }
    .render_html()
}

/// Flip a user's `is_active` flag.
pub async fn toggle_active(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    if id == staff.id {
        return Err(AppError::Validation(
            "You cannot deactivate your own account.".into(),
        ));
    }

    let conn = state.db.get()?;
    let user = users::get_user(&conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
    users::set_active(&conn, id, !user.is_active)?;
    tracing::info!(
        staff_id = staff.id,
        user_id = id,
        active = !user.is_active,
        "Staff changed account activation"
    );

    Ok(Redirect::to("/admin/"))
}
