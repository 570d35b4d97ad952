//! Integration tests for sign-up and email activation.

mod common;

use axum::http::StatusCode;
use common::TestClient;
use markitdone::db::queries::{registration, users};
use markitdone::models::NewUser;
use markitdone::tasks::housekeeping;

const NEW_PASSWORD: &str = "hunter2-but-longer";

async fn register(client: &TestClient, username: &str) -> common::TestResponse {
    client.get("/accounts/register/").await;
    client
        .post_form_response(
            "/accounts/register/",
            &[
                ("username", username),
                ("email", &format!("{}@example.com", username)),
                ("password1", NEW_PASSWORD),
                ("password2", NEW_PASSWORD),
            ],
        )
        .await
}

fn activation_path(body: &str) -> String {
    let start = body
        .find("/accounts/activate/")
        .expect("activation link in email");
    let rest = &body[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    rest[..end].to_string()
}

#[tokio::test]
async fn test_register_activate_and_log_in() {
    let client = TestClient::new();

    let response = register(&client, "newbie").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/accounts/register/complete/"));

    let (status, body) = client.get("/accounts/register/complete/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Check your email"));

    // The account exists but cannot log in yet.
    let login = client.login("newbie", NEW_PASSWORD).await;
    assert!(login.body.contains("This account is inactive."));

    let mail = client.wait_for_mail(1).await;
    assert_eq!(mail[0].to, vec!["newbie@example.com".to_string()]);
    assert_eq!(mail[0].subject, "Activate your markitdone.com account");
    assert!(mail[0]
        .body
        .contains("http://markitdone.com/accounts/activate/"));
    assert!(mail[0].body.contains("within 3 days"));

    let path = activation_path(&mail[0].body);
    let response = client.get_response(&path).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/accounts/activate/complete/"));

    let (status, body) = client.get("/accounts/activate/complete/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Your account is active"));

    let login = client.login("newbie", NEW_PASSWORD).await;
    assert_eq!(login.status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_activation_key_cannot_be_reused() {
    let client = TestClient::new();
    register(&client, "once").await;
    let mail = client.wait_for_mail(1).await;
    let path = activation_path(&mail[0].body);

    assert_eq!(client.get_response(&path).await.status, StatusCode::SEE_OTHER);

    let (status, body) = client.get(&path).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Activation failed"));

    let conn = client.state.db.get().unwrap();
    let user = users::get_user_by_username(&conn, "once").unwrap().unwrap();
    assert_eq!(
        registration::get_activation_key(&conn, user.id)
            .unwrap()
            .as_deref(),
        Some(registration::ACTIVATED)
    );
}

#[tokio::test]
async fn test_expired_activation_key_fails_and_is_cleaned_up() {
    let client = TestClient::new();
    register(&client, "late").await;
    let mail = client.wait_for_mail(1).await;
    let path = activation_path(&mail[0].body);

    {
        let conn = client.state.db.get().unwrap();
        conn.execute(
            "UPDATE registration_profiles SET created_at = datetime('now', '-4 days')",
            [],
        )
        .unwrap();
    }

    let (status, body) = client.get(&path).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Activation failed"));

    housekeeping(&client.state.db, 3).unwrap();
    let conn = client.state.db.get().unwrap();
    assert!(!users::username_exists(&conn, "late").unwrap());
}

#[tokio::test]
async fn test_unknown_activation_key_fails() {
    let client = TestClient::new();
    let (status, body) = client
        .get("/accounts/activate/0123456789abcdef0123456789abcdef/")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Activation failed"));

    let (status, _) = client.get("/accounts/activate/ALREADY_ACTIVATED/").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_username_is_rejected() {
    let client = TestClient::new();
    client.create_user("taken", true, false);

    let response = register(&client, "Taken").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response
        .body
        .contains("A user with that username already exists."));
    assert!(client.sent_mail().is_empty());
}

#[tokio::test]
async fn test_invalid_form_is_redisplayed_with_errors() {
    let client = TestClient::new();
    client.get("/accounts/register/").await;

    let (status, body) = client
        .post_form(
            "/accounts/register/",
            &[
                ("username", "has space"),
                ("email", "nope"),
                ("password1", "a"),
                ("password2", "b"),
            ],
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Enter a valid email address."));
    assert!(body.contains("didn&#39;t match") || body.contains("didn&#x27;t match"));
    assert!(body.contains("Usernames have at most 30 characters"));
    // Entered values survive, passwords do not.
    assert!(body.contains(r#"value="has space""#));
}

#[tokio::test]
async fn test_usernames_are_unique_regardless_of_case() {
    let client = TestClient::new();
    client.create_user("Jane", true, false);

    let conn = client.state.db.get().unwrap();
    let err = users::create_user(
        &conn,
        &NewUser {
            username: "jane".into(),
            email: "other@example.com".into(),
            password_hash: "x".into(),
            is_active: false,
            is_staff: false,
        },
    )
    .unwrap_err();
    assert!(users::is_unique_violation(&err));
    assert_eq!(users::count_users(&conn).unwrap(), 1);
    drop(conn);

    let (status, body) = client.get("/accounts/register/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Register"));
    let (status, body) = client
        .post_form(
            "/accounts/register/",
            &[
                ("username", "JANE"),
                ("email", "jane2@example.com"),
                ("password1", "pw"),
                ("password2", "pw"),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("A user with that username already exists."));
}
