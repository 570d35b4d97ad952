use std::any::Any;

use askama::Template;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};

use crate::handlers::PageContext;
use crate::state::AppState;
use crate::timezone::ActiveTimezone;

/// Newtype for passing error messages through response extensions.
#[derive(Clone)]
pub struct ErrorMessage(pub String);

#[derive(Template)]
#[template(path = "pages/error.html")]
struct ErrorPageTemplate {
    page: PageContext,
    status_code: u16,
    status_text: &'static str,
    message: String,
}

/// Paths whose responses are consumed by scripts and keep their bodies.
fn is_script_endpoint(path: &str) -> bool {
    path.starts_with("/todos/") || path == "/accounts/authenticate/" || path == "/health"
}

/// Middleware that replaces 4xx/5xx responses with a full error page.
///
/// Server errors are also reported to the site admins unless running in
/// debug mode.
pub async fn error_page_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_xhr = request
        .headers()
        .get("x-requested-with")
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"XMLHttpRequest"));
    let path = request.uri().path().to_owned();
    let method = request.method().clone();

    let response = next.run(request).await;

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let message = response
        .extensions()
        .get::<ErrorMessage>()
        .map(|e| e.0.clone())
        .unwrap_or_default();

    if status.is_server_error() {
        tracing::error!(%status, %method, %path, error_message = %message, "request failed");
        if !state.config.debug {
            state.notify_admins(
                &format!("ERROR: {} {}", method, path),
                &format!(
                    "{} {} returned {}.\n\n{}\n",
                    method,
                    path,
                    status,
                    if message.is_empty() {
                        "(no message)"
                    } else {
                        message.as_str()
                    }
                ),
            );
        }
    } else {
        tracing::warn!(%status, %method, %path, error_message = %message, "request failed");
    }

    if is_xhr || is_script_endpoint(&path) {
        return response;
    }

    render_error_page(&state, status, message)
}

/// Fallback handler for unmatched routes.
pub async fn fallback_handler() -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    response.extensions_mut().insert(ErrorMessage(
        "The page you're looking for doesn't exist.".into(),
    ));
    response
}

/// Turn a handler panic into a 500 that the error page middleware reports.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");

    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response
        .extensions_mut()
        .insert(ErrorMessage("The server hit an unexpected error.".into()));
    response
}

fn render_error_page(state: &AppState, status: StatusCode, message: String) -> Response {
    let message = if message.is_empty() {
        default_message(status)
    } else {
        message
    };

    let (status_text, _) = status_info(status);

    let template = ErrorPageTemplate {
        page: PageContext::anonymous(status_text, ActiveTimezone(state.config.time_zone)),
        status_code: status.as_u16(),
        status_text,
        message,
    };

    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render error page template: {}", e);
            (status, "Internal Server Error").into_response()
        }
    }
}

fn status_info(status: StatusCode) -> (&'static str, &'static str) {
    match status.as_u16() {
        400 => ("Bad Request", "The request could not be understood."),
        401 => ("Unauthorized", "You need to log in to see this."),
        403 => ("Forbidden", "You don't have permission to access this."),
        404 => ("Not Found", "The page you're looking for doesn't exist."),
        405 => ("Method Not Allowed", "This action is not supported."),
        422 => ("Unprocessable Entity", "The submitted form was incomplete."),
        500 => ("Internal Server Error", "Something went wrong on our end."),
        _ => ("Error", ""),
    }
}

fn default_message(status: StatusCode) -> String {
    let msg = status_info(status).1;
    if msg.is_empty() {
        format!("An unexpected error occurred ({}).", status.as_u16())
    } else {
        msg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_endpoints_keep_their_bodies() {
        assert!(is_script_endpoint("/todos/lists/"));
        assert!(is_script_endpoint("/accounts/authenticate/"));
        assert!(is_script_endpoint("/health"));
        assert!(!is_script_endpoint("/accounts/login/"));
        assert!(!is_script_endpoint("/todos"));
    }

    #[tokio::test]
    async fn panics_become_server_errors() {
        use axum::routing::get;
        use axum::Router;
        use tower::ServiceExt;
        use tower_http::catch_panic::CatchPanicLayer;

        async fn explode() -> &'static str {
            panic!("kaboom")
        }

        let app = Router::new()
            .route("/boom", get(explode))
            .layer(CatchPanicLayer::custom(panic_response));
        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = response.extensions().get::<ErrorMessage>().unwrap();
        assert_eq!(message.0, "The server hit an unexpected error.");
    }

    #[test]
    fn unknown_statuses_get_a_generic_message() {
        assert_eq!(
            default_message(StatusCode::IM_A_TEAPOT),
            "An unexpected error occurred (418)."
        );
        assert_eq!(
            default_message(StatusCode::NOT_FOUND),
            "The page you're looking for doesn't exist."
        );
    }
}
