//! Account sign-up with email activation.
//!
//! New accounts start inactive. A random activation key is mailed to the
//! address given at sign-up; following the link within the activation
//! window turns the account on and burns the key.

use std::sync::LazyLock;

use askama::Template;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{hash_password, MaybeUser};
use crate::db::queries::{registration, users};
use crate::error::{AppError, AppResult, RenderHtml};
use crate::handlers::PageContext;
use crate::mail::EmailMessage;
use crate::models::NewUser;
use crate::session::Session;
use crate::state::AppState;
use crate::timezone::ActiveTimezone;

const USERNAME_TAKEN: &str = "A user with that username already exists.";

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]{1,30}$").expect("username pattern is valid"));

#[derive(Template)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub page: PageContext,
    pub username: String,
    pub email: String,
    pub errors: Vec<String>,
}

impl RegisterTemplate {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Static confirmation pages that only differ in their text.
#[derive(Template)]
#[template(path = "pages/notice.html")]
pub struct NoticeTemplate {
    pub page: PageContext,
    pub heading: &'static str,
    pub message: &'static str,
    pub show_login: bool,
}

#[derive(Template)]
#[template(path = "emails/activation_email_subject.txt")]
pub struct ActivationSubjectTemplate<'a> {
    pub site: &'a str,
}

#[derive(Template)]
#[template(path = "emails/activation_email.txt")]
pub struct ActivationEmailTemplate<'a> {
    pub site: &'a str,
    pub username: &'a str,
    pub activation_url: &'a str,
    pub expiration_days: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

impl RegisterForm {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !USERNAME_RE.is_match(self.username.trim()) {
            errors.push(
                "Usernames have at most 30 characters and may contain only letters, \
                 numbers and @/./+/-/_ characters."
                    .to_string(),
            );
        }
        if self.email.trim().parse::<lettre::Address>().is_err() {
            errors.push("Enter a valid email address.".to_string());
        }
        if self.password1.is_empty() {
            errors.push("Choose a password.".to_string());
        } else if self.password1 != self.password2 {
            errors.push("The two password fields didn't match.".to_string());
        }

        errors
    }
}

fn render_form(
    session: &Session,
    tz: ActiveTimezone,
    form: &RegisterForm,
    errors: Vec<String>,
) -> AppResult<Html<String>> {
    RegisterTemplate {
        page: PageContext::new("Register", session, None, tz),
        username: form.username.trim().to_string(),
        email: form.email.trim().to_string(),
        errors,
    }
    .render_html()
}

pub async fn register_page(session: Session, tz: ActiveTimezone) -> AppResult<Html<String>> {
    render_form(&session, tz, &RegisterForm::default(), Vec::new())
}

pub async fn register(
    State(state): State<AppState>,
    session: Session,
    tz: ActiveTimezone,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let mut errors = form.validate();
    let username = form.username.trim();
    let email = form.email.trim();

    let conn = state.db.get()?;
    if errors.is_empty() && users::username_exists(&conn, username)? {
        errors.push(USERNAME_TAKEN.to_string());
    }
    if !errors.is_empty() {
        tracing::debug!(count = errors.len(), "Registration form rejected");
        return Ok(render_form(&session, tz, &form, errors)?.into_response());
    }

    let activation_key = Uuid::new_v4().simple().to_string();
    let new_user = NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(&form.password1)?,
        is_active: false,
        is_staff: false,
    };

    let tx = conn.unchecked_transaction()?;
    let user_id = match users::create_user(&tx, &new_user) {
        Ok(id) => id,
        Err(e) if users::is_unique_violation(&e) => {
            tracing::debug!(username, "Username taken by a concurrent registration");
            let errors = vec![USERNAME_TAKEN.to_string()];
            return Ok(render_form(&session, tz, &form, errors)?.into_response());
        }
        Err(e) => return Err(e.into()),
    };
    registration::create_profile(&tx, user_id, &activation_key)?;
    tx.commit()?;

    state.send_mail(activation_email(&state, &new_user, &activation_key)?);
    tracing::info!(user_id, username, "Registered new account");

    Ok(Redirect::to("/accounts/register/complete/").into_response())
}

fn activation_email(
    state: &AppState,
    user: &NewUser,
    activation_key: &str,
) -> AppResult<EmailMessage> {
    let config = &state.config;
    let activation_url = format!(
        "{}/accounts/activate/{}/",
        config.full_host(),
        activation_key
    );

    let subject = ActivationSubjectTemplate {
        site: &config.host_name,
    }
    .render()
    .map_err(|e| AppError::Internal(format!("Template error: {}", e)))?;

    let body = ActivationEmailTemplate {
        site: &config.host_name,
        username: &user.username,
        activation_url: &activation_url,
        expiration_days: config.account_activation_days,
    }
    .render()
    .map_err(|e| AppError::Internal(format!("Template error: {}", e)))?;

    Ok(EmailMessage {
        from: config.default_from_email.clone(),
        to: vec![user.email.clone()],
        // Subjects must not contain newlines.
        subject: subject.lines().collect::<Vec<_>>().join(" ").trim().to_string(),
        body,
    })
}

pub async fn registration_complete(
    session: Session,
    tz: ActiveTimezone,
) -> AppResult<Html<String>> {
    NoticeTemplate {
        page: PageContext::new("Registration complete", &session, None, tz),
        heading: "Check your email",
        message: "An activation link has been sent to the address you registered with. \
                  Follow it to finish setting up your account.",
        show_login: false,
    }
    .render_html()
}

pub async fn activate(
    State(state): State<AppState>,
    session: Session,
    tz: ActiveTimezone,
    Path(key): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    match registration::activate(&conn, &key, state.config.account_activation_days)? {
        Some(_) => Ok(Redirect::to("/accounts/activate/complete/").into_response()),
        None => {
            let html = NoticeTemplate {
                page: PageContext::new("Activation failed", &session, None, tz),
                heading: "Activation failed",
                message: "This activation link is invalid, was already used or has expired.",
                show_login: false,
            }
            .render_html()?;
            Ok(html.into_response())
        }
    }
}

pub async fn activation_complete(
    MaybeUser(user): MaybeUser,
    session: Session,
    tz: ActiveTimezone,
) -> AppResult<Html<String>> {
    NoticeTemplate {
        page: PageContext::new("Account activated", &session, user.as_ref(), tz),
        heading: "Your account is active",
        message: "Thanks for confirming your email address. You can log in now.",
        show_login: user.is_none(),
    }
    .render_html()
}
