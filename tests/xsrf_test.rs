//! Integration tests for XSRF protection on state-changing requests.

mod common;

use axum::body::Body;
use axum::http::header::COOKIE;
use axum::http::{Request, StatusCode};
use common::{TestClient, PASSWORD};
use markitdone::session::XSRF_COOKIE;
use markitdone::xsrf::{XSRF_FORM_FIELD, XSRF_HEADER};

#[tokio::test]
async fn test_post_without_token_is_forbidden() {
    let client = TestClient::new();
    client.get("/accounts/set_timezone/").await;

    let response = client
        .post_form_without_xsrf("/accounts/set_timezone/", &[("timezone", "UTC")])
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.body.contains("403"));
    assert!(client.session_data().unwrap().django_timezone.is_none());
}

#[tokio::test]
async fn test_post_before_any_token_exists_is_forbidden() {
    let client = TestClient::new();
    let response = client
        .post_form_without_xsrf(
            "/accounts/login/",
            &[("username", "x"), ("password", "y")],
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_token_in_form_field_is_accepted() {
    let client = TestClient::new();
    client.create_user("former", true, false);
    client.get("/accounts/login/").await;
    let token = client.cookie(XSRF_COOKIE).unwrap();

    let response = client
        .post_form_without_xsrf(
            "/accounts/login/",
            &[
                (XSRF_FORM_FIELD, token.as_str()),
                ("username", "former"),
                ("password", PASSWORD),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_wrong_token_is_forbidden() {
    let client = TestClient::new();
    client.get("/accounts/login/").await;

    let response = client
        .post_form_without_xsrf(
            "/accounts/set_timezone/",
            &[(XSRF_FORM_FIELD, "not-the-token"), ("timezone", "UTC")],
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_api_post_without_header_is_forbidden_with_plain_body() {
    let (client, _) = TestClient::logged_in("scripter").await;

    let response = client
        .post_form_without_xsrf("/todos/lists/add/", &[("name", "Sneaky")])
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body, "Invalid or missing XSRF token");

    let (_, json) = client.get_json("/todos/lists/").await;
    assert!(json["object_list"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_token_from_another_session_is_rejected() {
    let (victim, _) = TestClient::logged_in("victim").await;
    let attacker = TestClient::new();
    attacker.get("/accounts/login/").await;
    let foreign_token = attacker.cookie(XSRF_COOKIE).unwrap();

    let cookies = format!(
        "sessionid={}",
        victim.cookie(markitdone::session::SESSION_COOKIE).unwrap()
    );
    let request = Request::builder()
        .method("POST")
        .uri("/todos/lists/add/")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header(COOKIE, cookies)
        .header(XSRF_HEADER, foreign_token)
        .body(Body::from("name=Forged"))
        .unwrap();

    let response = victim.send(request).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_safe_methods_need_no_token() {
    let client = TestClient::new();
    let (status, _) = client.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}
