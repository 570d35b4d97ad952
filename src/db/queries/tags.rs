use crate::models::{Tag, TagUsage};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

pub fn get_tag_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Tag>> {
    conn.query_row(
        "SELECT id, name FROM tags WHERE name = ?",
        [name],
        |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )
    .optional()
}

pub fn create_or_get_tag(conn: &Connection, name: &str) -> rusqlite::Result<Tag> {
    if let Some(existing) = get_tag_by_name(conn, name)? {
        return Ok(existing);
    }

    conn.execute("INSERT INTO tags (name) VALUES (?)", [name])?;
    let id = conn.last_insert_rowid();
    debug!(tag_id = id, name, "Created tag");

    Ok(Tag {
        id,
        name: name.to_string(),
    })
}

/// Replace the tags of a todo with `names` (already normalized).
pub fn set_todo_tags(conn: &Connection, todo_id: i64, names: &[String]) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM todo_tags WHERE todo_id = ?", [todo_id])?;
    for name in names {
        let tag = create_or_get_tag(conn, name)?;
        conn.execute(
            "INSERT OR IGNORE INTO todo_tags (todo_id, tag_id) VALUES (?, ?)",
            params![todo_id, tag.id],
        )?;
    }
    Ok(())
}

/// Tags used on the owner's todos with how often each is used.
pub fn list_tags_for_owner(conn: &Connection, owner_id: i64) -> rusqlite::Result<Vec<TagUsage>> {
    let mut stmt = conn.prepare(
        "SELECT g.name, COUNT(*) AS usage_count
         FROM tags g
         JOIN todo_tags tt ON tt.tag_id = g.id
         JOIN todos t ON t.id = tt.todo_id
         JOIN todo_lists l ON l.id = t.list_id
         WHERE l.owner_id = ?
         GROUP BY g.id
         ORDER BY g.name",
    )?;

    let tags = stmt
        .query_map([owner_id], |row| {
            Ok(TagUsage {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(tags)
}

pub fn delete_unused_tags(conn: &Connection) -> rusqlite::Result<usize> {
    let rows = conn.execute(
        "DELETE FROM tags WHERE NOT EXISTS (SELECT 1 FROM todo_tags tt WHERE tt.tag_id = tags.id)",
        [],
    )?;
    if rows > 0 {
        debug!(count = rows, "Deleted unused tags");
    }
    Ok(rows)
}
