//! XSRF (Cross-Site Request Forgery) protection middleware.
//!
//! Every state-changing request (POST, PUT, DELETE, PATCH) must echo the
//! token stored in the visitor's session, either in the `X-XSRF-Token` header
//! (scripts read it from the `xsrf_token` cookie) or in the `_xsrf_token`
//! field of a url-encoded form.

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error_pages::ErrorMessage;
use crate::session::Session;

/// The header name for XSRF tokens in AJAX requests.
pub const XSRF_HEADER: &str = "X-XSRF-Token";

/// The form field name for XSRF tokens in form submissions.
pub const XSRF_FORM_FIELD: &str = "_xsrf_token";

/// Form bodies larger than this are rejected before token lookup.
const MAX_FORM_BYTES: usize = 1024 * 1024;

/// Middleware that validates XSRF tokens on state-changing requests. Must run
/// inside the session middleware.
pub async fn xsrf_middleware(request: Request<Body>, next: Next) -> Response {
    if !matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH
    ) {
        return next.run(request).await;
    }

    // Sessions without a token never rendered a form, so nothing can match.
    let Some(expected) = request
        .extensions()
        .get::<Session>()
        .and_then(|s| s.get().xsrf_token)
    else {
        return xsrf_error_response();
    };

    // Check for token in header first (for AJAX requests)
    let header_token = request
        .headers()
        .get(XSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    if let Some(token) = header_token {
        if token == expected {
            return next.run(request).await;
        }
        return xsrf_error_response();
    }

    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if !is_form {
        // JSON and multipart bodies must use the header
        return xsrf_error_response();
    }

    let (parts, body) = request.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, MAX_FORM_BYTES).await else {
        return xsrf_error_response();
    };

    let form_token = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes)
        .ok()
        .and_then(|pairs| {
            pairs
                .into_iter()
                .find(|(key, _)| key == XSRF_FORM_FIELD)
                .map(|(_, value)| value)
        });

    match form_token {
        Some(token) if token == expected => {
            // Reconstruct the request with the body
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        _ => xsrf_error_response(),
    }
}

fn xsrf_error_response() -> Response {
    let mut response = (StatusCode::FORBIDDEN, "Invalid or missing XSRF token").into_response();
    response.extensions_mut().insert(ErrorMessage(
        "Your form expired or was not submitted from this site. Reload the page and try again."
            .into(),
    ));
    response
}
