use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::Form;
use serde::Deserialize;

use crate::auth::{AjaxUser, MaybeUser};
use crate::error::{AppResult, RenderHtml};
use crate::handlers::PageContext;
use crate::session::Session;
use crate::timezone::{common_timezones, ActiveTimezone};

#[derive(Template)]
#[template(path = "pages/set_timezone.html")]
pub struct SetTimezoneTemplate {
    pub page: PageContext,
    pub timezones: Vec<&'static str>,
    pub current: &'static str,
}

impl SetTimezoneTemplate {
    pub fn is_current(&self, name: &str) -> bool {
        self.current == name
    }
}

#[derive(Debug, Deserialize)]
pub struct TimezoneForm {
    pub timezone: String,
}

pub async fn set_timezone_page(
    MaybeUser(user): MaybeUser,
    session: Session,
    tz: ActiveTimezone,
) -> AppResult<Html<String>> {
    SetTimezoneTemplate {
        page: PageContext::new("Set timezone", &session, user.as_ref(), tz),
        timezones: common_timezones(),
        current: tz.name(),
    }
    .render_html()
}

/// Store the submitted zone name as-is; unknown names are ignored later by
/// the timezone middleware.
pub async fn set_timezone(session: Session, Form(form): Form<TimezoneForm>) -> Redirect {
    tracing::debug!(timezone = %form.timezone, "Setting session timezone");
    session.set_timezone(form.timezone);
    Redirect::to("/")
}

/// Tells browser scripts whether the visitor is logged in.
pub async fn authenticate(_user: AjaxUser) -> StatusCode {
    StatusCode::NO_CONTENT
}
