use crate::models::{NewUser, User};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, is_active, is_staff, date_joined, last_login";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_active: row.get(4)?,
        is_staff: row.get(5)?,
        date_joined: row.get(6)?,
        last_login: row.get(7)?,
    })
}

pub fn get_user(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
        [id],
        user_from_row,
    )
    .optional()
}

/// Usernames are matched case-insensitively.
pub fn get_user_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM users WHERE username = ? COLLATE NOCASE",
            USER_COLUMNS
        ),
        [username],
        user_from_row,
    )
    .optional()
}

pub fn username_exists(conn: &Connection, username: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ? COLLATE NOCASE)",
        [username],
        |row| row.get(0),
    )
}

pub fn list_users(conn: &Connection) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY username COLLATE NOCASE",
        USER_COLUMNS
    ))?;

    let users = stmt
        .query_map([], user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(users)
}

pub fn count_users(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
}

pub fn create_user(conn: &Connection, user: &NewUser) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users (username, email, password_hash, is_active, is_staff)
         VALUES (?, ?, ?, ?, ?)",
        params![
            user.username,
            user.email,
            user.password_hash,
            user.is_active,
            user.is_staff
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(user_id = id, username = %user.username, "Created user");
    Ok(id)
}

/// True for a violated UNIQUE constraint, e.g. a username taken by a
/// concurrent insert.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub fn set_active(conn: &Connection, id: i64, active: bool) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE users SET is_active = ? WHERE id = ?",
        params![active, id],
    )?;
    if rows > 0 {
        info!(user_id = id, active, "Changed user activation");
    }
    Ok(rows > 0)
}

pub fn touch_last_login(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET last_login = datetime('now') WHERE id = ?",
        [id],
    )?;
    Ok(())
}

/// Create the configured staff account unless a user with that name exists.
/// Returns true when a user was created.
pub fn ensure_superuser(conn: &Connection, user: &NewUser) -> rusqlite::Result<bool> {
    if username_exists(conn, &user.username)? {
        debug!(username = %user.username, "Superuser already present");
        return Ok(false);
    }
    create_user(conn, user)?;
    info!(username = %user.username, "Created superuser");
    Ok(true)
}
