use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

/// Load the raw session payload if the session exists and has not expired.
pub fn get_session(conn: &Connection, session_key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT data FROM sessions WHERE session_key = ? AND expires_at > datetime('now')",
        [session_key],
        |row| row.get(0),
    )
    .optional()
}

pub fn save_session(
    conn: &Connection,
    session_key: &str,
    data: &str,
    expires_at: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO sessions (session_key, data, expires_at)
         VALUES (?, ?, ?)
         ON CONFLICT(session_key) DO UPDATE SET data = excluded.data, expires_at = excluded.expires_at",
        params![session_key, data, expires_at],
    )?;
    Ok(())
}

pub fn delete_session(conn: &Connection, session_key: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute("DELETE FROM sessions WHERE session_key = ?", [session_key])?;
    Ok(rows > 0)
}

pub fn delete_expired_sessions(conn: &Connection) -> rusqlite::Result<usize> {
    let rows = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )?;
    if rows > 0 {
        debug!(count = rows, "Deleted expired sessions");
    }
    Ok(rows)
}
