use crate::models::{TodoList, TodoListSummary};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const SUMMARY_SELECT: &str = "SELECT l.id, l.owner_id, l.name, l.created_at, l.updated_at,
            COUNT(t.id) AS todo_count,
            COUNT(t.id) - COUNT(t.completed_at) AS open_count
     FROM todo_lists l
     LEFT JOIN todos t ON t.list_id = l.id";

fn summary_from_row(row: &Row) -> rusqlite::Result<TodoListSummary> {
    Ok(TodoListSummary {
        list: TodoList {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        },
        todo_count: row.get(5)?,
        open_count: row.get(6)?,
    })
}

pub fn list_lists(conn: &Connection, owner_id: i64) -> rusqlite::Result<Vec<TodoListSummary>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE l.owner_id = ? GROUP BY l.id ORDER BY l.name COLLATE NOCASE, l.id",
        SUMMARY_SELECT
    ))?;

    let lists = stmt
        .query_map([owner_id], summary_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(owner_id, count = lists.len(), "Listed todo lists");
    Ok(lists)
}

/// Fetch a list only if it belongs to `owner_id`.
pub fn get_list(
    conn: &Connection,
    id: i64,
    owner_id: i64,
) -> rusqlite::Result<Option<TodoListSummary>> {
    conn.query_row(
        &format!(
            "{} WHERE l.id = ? AND l.owner_id = ? GROUP BY l.id",
            SUMMARY_SELECT
        ),
        params![id, owner_id],
        summary_from_row,
    )
    .optional()
}

pub fn create_list(conn: &Connection, owner_id: i64, name: &str) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO todo_lists (owner_id, name) VALUES (?, ?)",
        params![owner_id, name],
    )?;
    let id = conn.last_insert_rowid();
    debug!(list_id = id, owner_id, "Created todo list");
    Ok(id)
}

pub fn rename_list(conn: &Connection, id: i64, owner_id: i64, name: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE todo_lists SET name = ?, updated_at = datetime('now')
         WHERE id = ? AND owner_id = ?",
        params![name, id, owner_id],
    )?;
    if rows > 0 {
        debug!(list_id = id, "Renamed todo list");
    }
    Ok(rows > 0)
}

pub fn delete_list(conn: &Connection, id: i64, owner_id: i64) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "DELETE FROM todo_lists WHERE id = ? AND owner_id = ?",
        params![id, owner_id],
    )?;
    if rows > 0 {
        debug!(list_id = id, "Deleted todo list");
    }
    Ok(rows > 0)
}

pub fn count_lists(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM todo_lists", [], |row| row.get(0))
}
