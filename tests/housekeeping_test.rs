//! Integration tests for session expiry and the periodic cleanup job.

mod common;

use axum::http::StatusCode;
use common::TestClient;
use markitdone::db::queries::tags;
use markitdone::session::SESSION_COOKIE;
use markitdone::tasks::housekeeping;

fn session_rows(client: &TestClient, key: &str) -> i64 {
    let conn = client.state.db.get().unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE session_key = ?",
        [key],
        |row| row.get(0),
    )
    .unwrap()
}

#[tokio::test]
async fn test_expired_session_is_ignored_and_purged() {
    let (client, _) = TestClient::logged_in("sleepy").await;
    let (status, _) = client.get("/accounts/authenticate/").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let key = client.cookie(SESSION_COOKIE).unwrap();
    {
        let conn = client.state.db.get().unwrap();
        conn.execute(
            "UPDATE sessions SET expires_at = datetime('now', '-1 minute') WHERE session_key = ?",
            [&key],
        )
        .unwrap();
    }

    let (status, body) = client.get("/accounts/authenticate/").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.is_empty());
    assert_eq!(session_rows(&client, &key), 1);

    housekeeping(&client.state.db, client.state.config.account_activation_days).unwrap();
    assert_eq!(session_rows(&client, &key), 0);
}

#[tokio::test]
async fn test_housekeeping_keeps_live_sessions() {
    let (client, _) = TestClient::logged_in("awake").await;
    let key = client.cookie(SESSION_COOKIE).unwrap();

    housekeeping(&client.state.db, client.state.config.account_activation_days).unwrap();
    assert_eq!(session_rows(&client, &key), 1);
    let (status, _) = client.get("/accounts/authenticate/").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_housekeeping_removes_unused_tags() {
    let (client, _) = TestClient::logged_in("tidy").await;
    let list = client.create_list("Chores").await;
    let todo = client
        .create_todo(list, &[("title", "Sweep"), ("tags", "home, weekly")])
        .await;

    let (status, _) = client
        .post_json(
            &format!("/todos/{}/update/", todo["id"]),
            &[("title", "Sweep"), ("tags", "home")],
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    housekeeping(&client.state.db, client.state.config.account_activation_days).unwrap();

    let conn = client.state.db.get().unwrap();
    assert!(tags::get_tag_by_name(&conn, "home").unwrap().is_some());
    assert!(tags::get_tag_by_name(&conn, "weekly").unwrap().is_none());
}
