use std::collections::HashMap;

use crate::db::queries::tags;
use crate::models::{NewTodo, Todo, TodoWithTags};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, trace};

const TODO_COLUMNS: &str = "t.id, t.list_id, t.title, t.notes, t.priority, t.due_at,
            t.completed_at, t.created_at, t.updated_at";

#[derive(Default)]
pub struct TodoFilter {
    /// Only todos carrying this (normalized) tag.
    pub tag: Option<String>,
    pub completed: Option<bool>,
    /// SQL ORDER BY expression (e.g., "t.due_at ASC"). Defaults to "t.created_at ASC".
    pub sort_sql: Option<String>,
}

fn todo_from_row(row: &Row) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        list_id: row.get(1)?,
        title: row.get(2)?,
        notes: row.get(3)?,
        priority: row.get(4)?,
        due_at: row.get(5)?,
        completed_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn list_todos(
    conn: &Connection,
    list_id: i64,
    filter: &TodoFilter,
) -> rusqlite::Result<Vec<TodoWithTags>> {
    let mut sql = format!("SELECT {} FROM todos t WHERE t.list_id = ?", TODO_COLUMNS);
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(list_id)];

    if let Some(ref tag) = filter.tag {
        sql.push_str(
            " AND EXISTS(SELECT 1 FROM todo_tags tt JOIN tags g ON g.id = tt.tag_id
                         WHERE tt.todo_id = t.id AND g.name = ?)",
        );
        params_vec.push(Box::new(tag.clone()));
    }
    match filter.completed {
        Some(true) => sql.push_str(" AND t.completed_at IS NOT NULL"),
        Some(false) => sql.push_str(" AND t.completed_at IS NULL"),
        None => {}
    }

    let order_by = filter.sort_sql.as_deref().unwrap_or("t.created_at ASC");
    sql.push_str(&format!(" ORDER BY {}, t.id", order_by));
    trace!(sql = %sql, "Listing todos");

    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let todos: Vec<Todo> = stmt
        .query_map(params_refs.as_slice(), todo_from_row)?
        .collect::<rusqlite::Result<_>>()?;

    let ids: Vec<i64> = todos.iter().map(|t| t.id).collect();
    let mut tags_map = get_tags_for_todos(conn, &ids)?;

    let todos: Vec<TodoWithTags> = todos
        .into_iter()
        .map(|todo| TodoWithTags {
            tags: tags_map.remove(&todo.id).unwrap_or_default(),
            todo,
        })
        .collect();

    debug!(list_id, count = todos.len(), "Listed todos");
    Ok(todos)
}

/// Fetch a todo only if its list belongs to `owner_id`.
pub fn get_todo(
    conn: &Connection,
    id: i64,
    owner_id: i64,
) -> rusqlite::Result<Option<TodoWithTags>> {
    let todo = conn
        .query_row(
            &format!(
                "SELECT {} FROM todos t
                 JOIN todo_lists l ON l.id = t.list_id
                 WHERE t.id = ? AND l.owner_id = ?",
                TODO_COLUMNS
            ),
            params![id, owner_id],
            todo_from_row,
        )
        .optional()?;

    let Some(todo) = todo else {
        return Ok(None);
    };

    let tags = get_tags_for_todos(conn, &[todo.id])?
        .remove(&todo.id)
        .unwrap_or_default();
    Ok(Some(TodoWithTags { todo, tags }))
}

pub fn create_todo(conn: &Connection, list_id: i64, todo: &NewTodo) -> rusqlite::Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO todos (list_id, title, notes, priority, due_at) VALUES (?, ?, ?, ?, ?)",
        params![
            list_id,
            todo.title,
            todo.notes,
            todo.priority.level(),
            todo.due_at
        ],
    )?;
    let id = tx.last_insert_rowid();
    tags::set_todo_tags(&tx, id, &todo.tags)?;
    tx.commit()?;

    debug!(todo_id = id, list_id, "Created todo");
    Ok(id)
}

pub fn update_todo(
    conn: &Connection,
    id: i64,
    list_id: i64,
    todo: &NewTodo,
) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let rows = tx.execute(
        "UPDATE todos
         SET list_id = ?, title = ?, notes = ?, priority = ?, due_at = ?, updated_at = datetime('now')
         WHERE id = ?",
        params![
            list_id,
            todo.title,
            todo.notes,
            todo.priority.level(),
            todo.due_at,
            id
        ],
    )?;
    if rows > 0 {
        tags::set_todo_tags(&tx, id, &todo.tags)?;
    }
    tx.commit()?;

    if rows > 0 {
        debug!(todo_id = id, "Updated todo");
    }
    Ok(rows > 0)
}

pub fn set_completed(conn: &Connection, id: i64, completed: bool) -> rusqlite::Result<bool> {
    let sql = if completed {
        "UPDATE todos SET completed_at = datetime('now'), updated_at = datetime('now') WHERE id = ?"
    } else {
        "UPDATE todos SET completed_at = NULL, updated_at = datetime('now') WHERE id = ?"
    };
    let rows = conn.execute(sql, [id])?;
    if rows > 0 {
        debug!(todo_id = id, completed, "Changed todo completion");
    }
    Ok(rows > 0)
}

pub fn delete_todo(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let rows = conn.execute("DELETE FROM todos WHERE id = ?", [id])?;
    if rows > 0 {
        debug!(todo_id = id, "Deleted todo");
    }
    Ok(rows > 0)
}

pub fn count_todos(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM todos", [], |row| row.get(0))
}

fn get_tags_for_todos(
    conn: &Connection,
    todo_ids: &[i64],
) -> rusqlite::Result<HashMap<i64, Vec<String>>> {
    let mut map: HashMap<i64, Vec<String>> = HashMap::new();
    if todo_ids.is_empty() {
        return Ok(map);
    }

    let placeholders = vec!["?"; todo_ids.len()].join(", ");
    let sql = format!(
        "SELECT tt.todo_id, g.name
         FROM todo_tags tt
         JOIN tags g ON g.id = tt.tag_id
         WHERE tt.todo_id IN ({})
         ORDER BY g.name",
        placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(todo_ids.iter()), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    for row in rows {
        let (todo_id, name) = row?;
        map.entry(todo_id).or_default().push(name);
    }

    Ok(map)
}
