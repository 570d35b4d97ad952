use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

/// Marker stored in place of a key once it has been used.
pub const ACTIVATED: &str = "ALREADY_ACTIVATED";

pub fn create_profile(conn: &Connection, user_id: i64, activation_key: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO registration_profiles (user_id, activation_key) VALUES (?, ?)",
        params![user_id, activation_key],
    )?;
    debug!(user_id, "Created registration profile");
    Ok(())
}

pub fn get_activation_key(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT activation_key FROM registration_profiles WHERE user_id = ?",
        [user_id],
        |row| row.get(0),
    )
    .optional()
}

/// Activate the account owning `activation_key` if the key is unused and
/// younger than `activation_days`. Returns the activated user's id.
pub fn activate(
    conn: &Connection,
    activation_key: &str,
    activation_days: i64,
) -> rusqlite::Result<Option<i64>> {
    if activation_key == ACTIVATED {
        return Ok(None);
    }

    let tx = conn.unchecked_transaction()?;

    let user_id: Option<i64> = tx
        .query_row(
            "SELECT user_id FROM registration_profiles
             WHERE activation_key = ?
               AND created_at > datetime('now', ?)",
            params![activation_key, format!("-{} days", activation_days)],
            |row| row.get(0),
        )
        .optional()?;

    let Some(user_id) = user_id else {
        debug!("Activation key unknown, used or expired");
        return Ok(None);
    };

    tx.execute("UPDATE users SET is_active = 1 WHERE id = ?", [user_id])?;
    tx.execute(
        "UPDATE registration_profiles SET activation_key = ? WHERE user_id = ?",
        params![ACTIVATED, user_id],
    )?;
    tx.commit()?;

    info!(user_id, "Activated account");
    Ok(Some(user_id))
}

/// Remove accounts whose activation window passed without activation.
pub fn delete_expired_registrations(
    conn: &Connection,
    activation_days: i64,
) -> rusqlite::Result<usize> {
    let rows = conn.execute(
        "DELETE FROM users
         WHERE is_active = 0
           AND id IN (
               SELECT user_id FROM registration_profiles
               WHERE activation_key != ?
                 AND created_at <= datetime('now', ?)
           )",
        params![ACTIVATED, format!("-{} days", activation_days)],
    )?;
    if rows > 0 {
        info!(count = rows, "Deleted expired registrations");
    }
    Ok(rows)
}
