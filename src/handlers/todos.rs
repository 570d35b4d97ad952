//! JSON endpoints behind the to-do list page.
//!
//! Collections are wrapped as `{"object_list": [...]}` and single records as
//! `{"object": {...}}`, the shape the browser scripts expect. Everything is
//! scoped to the requesting user: records owned by someone else are reported
//! as missing.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::Form;
use serde::{Deserialize, Serialize};

use crate::auth::AjaxUser;
use crate::db::queries::{todo_lists, todos};
use crate::db::DbPool;
use crate::error::{ApiResult, AppError};
use crate::form_utils::{deserialize_optional_bool, deserialize_optional_i64};
use crate::models::todo::MAX_TITLE;
use crate::models::todo_list::MAX_LIST_NAME;
use crate::models::{normalize_tags, NewTodo, Priority, TodoListSummary, TodoWithTags};
use crate::sort_utils::{ListSort, Sortable, SortableColumn};
use crate::state::AppState;
use crate::timezone::ActiveTimezone;

#[derive(Debug, Serialize)]
pub struct ObjectResponse<T: Serialize> {
    pub object: T,
}

#[derive(Debug, Serialize)]
pub struct ObjectListResponse<T: Serialize> {
    pub object_list: Vec<T>,
}

fn object<T: Serialize>(object: T) -> Json<ObjectResponse<T>> {
    Json(ObjectResponse { object })
}

fn object_list<T: Serialize>(object_list: Vec<T>) -> Json<ObjectListResponse<T>> {
    Json(ObjectListResponse { object_list })
}

/// A todo as the scripts see it: stored UTC timestamps plus their rendering
/// in the visitor's timezone.
#[derive(Debug, Serialize)]
pub struct TodoJson {
    pub id: i64,
    pub list_id: i64,
    pub title: String,
    pub notes: String,
    pub priority: i64,
    pub due_at: Option<String>,
    pub due_local: Option<String>,
    /// `due_at` formatted for a `datetime-local` input.
    pub due_input: Option<String>,
    pub completed: bool,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub created_local: String,
    pub tags: Vec<String>,
}

impl TodoJson {
    fn new(item: TodoWithTags, tz: ActiveTimezone) -> Self {
        let todo = item.todo;
        Self {
            due_local: todo.due_at.as_deref().map(|d| tz.localize(d)),
            due_input: todo.due_at.as_deref().and_then(|d| tz.to_local_input(d)),
            completed: todo.is_completed(),
            created_local: tz.localize(&todo.created_at),
            id: todo.id,
            list_id: todo.list_id,
            title: todo.title,
            notes: todo.notes,
            priority: todo.priority,
            due_at: todo.due_at,
            completed_at: todo.completed_at,
            created_at: todo.created_at,
            tags: item.tags,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub enum TodoSortColumn {
    #[default]
    Created,
    Due,
    Priority,
    Title,
}

impl SortableColumn for TodoSortColumn {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "due" => Some(Self::Due),
            "priority" => Some(Self::Priority),
            "title" => Some(Self::Title),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Due => "due",
            Self::Priority => "priority",
            Self::Title => "title",
        }
    }

    fn sql_expression(&self) -> &'static str {
        match self {
            Self::Created => "t.created_at",
            // Undated todos sort last in either direction.
            Self::Due => "t.due_at IS NULL, t.due_at",
            Self::Priority => "t.priority",
            Self::Title => "t.title COLLATE NOCASE",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TodoQuery {
    pub tag: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_bool")]
    pub completed: Option<bool>,
    pub sort: Option<String>,
    pub dir: Option<String>,
}

impl Sortable for TodoQuery {
    fn sort_by(&self) -> Option<&String> {
        self.sort.as_ref()
    }

    fn sort_dir(&self) -> Option<&String> {
        self.dir.as_ref()
    }
}

impl TodoQuery {
    fn to_filter(&self) -> todos::TodoFilter {
        let sort: ListSort<TodoSortColumn> = self.resolve_sort();
        todos::TodoFilter {
            tag: self
                .tag
                .as_deref()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
            completed: self.completed,
            sort_sql: Some(sort.sql_order_by()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListForm {
    #[serde(default)]
    pub name: String,
}

impl ListForm {
    fn validated_name(&self) -> Result<&str, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("List name is required".into()));
        }
        if name.chars().count() > MAX_LIST_NAME {
            return Err(AppError::Validation(format!(
                "List name must be at most {} characters",
                MAX_LIST_NAME
            )));
        }
        Ok(name)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TodoForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub due: String,
    #[serde(default)]
    pub tags: String,
    /// Move the todo to another of the user's lists.
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub list: Option<i64>,
}

impl TodoForm {
    fn to_new_todo(&self, tz: ActiveTimezone) -> Result<NewTodo, AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title is required".into()));
        }
        if title.chars().count() > MAX_TITLE {
            return Err(AppError::Validation(format!(
                "Title must be at most {} characters",
                MAX_TITLE
            )));
        }

        let priority = Priority::parse(&self.priority).ok_or_else(|| {
            AppError::Validation(format!("Invalid priority '{}'", self.priority.trim()))
        })?;

        let due_at = match self.due.trim() {
            "" => None,
            due => Some(tz.to_utc(due)?),
        };

        Ok(NewTodo {
            title: title.to_string(),
            notes: self.notes.trim().to_string(),
            priority,
            due_at,
            tags: normalize_tags(&self.tags),
        })
    }
}

fn owned_list(db: &DbPool, list_id: i64, owner_id: i64) -> ApiResult<TodoListSummary> {
    let conn = db.get()?;
    todo_lists::get_list(&conn, list_id, owner_id)?
        .ok_or_else(|| AppError::NotFound("List not found".into()).into())
}

fn owned_todo(db: &DbPool, todo_id: i64, owner_id: i64) -> ApiResult<TodoWithTags> {
    let conn = db.get()?;
    todos::get_todo(&conn, todo_id, owner_id)?
        .ok_or_else(|| AppError::NotFound("Todo not found".into()).into())
}

pub async fn list_lists(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
) -> ApiResult<Json<ObjectListResponse<TodoListSummary>>> {
    let conn = state.db.get()?;
    Ok(object_list(todo_lists::list_lists(&conn, user.id)?))
}

pub async fn create_list(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    Form(form): Form<ListForm>,
) -> ApiResult<(StatusCode, Json<ObjectResponse<TodoListSummary>>)> {
    let name = form.validated_name()?;
    let id = {
        let conn = state.db.get()?;
        todo_lists::create_list(&conn, user.id, name)?
    };
    let list = owned_list(&state.db, id, user.id)?;
    Ok((StatusCode::CREATED, object(list)))
}

pub async fn show_list(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ObjectResponse<TodoListSummary>>> {
    Ok(object(owned_list(&state.db, id, user.id)?))
}

pub async fn update_list(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    Path(id): Path<i64>,
    Form(form): Form<ListForm>,
) -> ApiResult<Json<ObjectResponse<TodoListSummary>>> {
    let name = form.validated_name()?;
    {
        let conn = state.db.get()?;
        if !todo_lists::rename_list(&conn, id, user.id, name)? {
            return Err(AppError::NotFound("List not found".into()).into());
        }
    }
    Ok(object(owned_list(&state.db, id, user.id)?))
}

pub async fn delete_list(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let conn = state.db.get()?;
    if !todo_lists::delete_list(&conn, id, user.id)? {
        return Err(AppError::NotFound("List not found".into()).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_todos(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    tz: ActiveTimezone,
    Path(id): Path<i64>,
    Query(query): Query<TodoQuery>,
) -> ApiResult<Json<ObjectListResponse<TodoJson>>> {
    owned_list(&state.db, id, user.id)?;

    let conn = state.db.get()?;
    let items = todos::list_todos(&conn, id, &query.to_filter())?
        .into_iter()
        .map(|item| TodoJson::new(item, tz))
        .collect();
    Ok(object_list(items))
}

pub async fn create_todo(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    tz: ActiveTimezone,
    Path(list_id): Path<i64>,
    Form(form): Form<TodoForm>,
) -> ApiResult<(StatusCode, Json<ObjectResponse<TodoJson>>)> {
    owned_list(&state.db, list_id, user.id)?;
    let new_todo = form.to_new_todo(tz)?;

    let id = {
        let conn = state.db.get()?;
        todos::create_todo(&conn, list_id, &new_todo)?
    };
    let todo = owned_todo(&state.db, id, user.id)?;
    Ok((StatusCode::CREATED, object(TodoJson::new(todo, tz))))
}

pub async fn show_todo(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    tz: ActiveTimezone,
    Path(id): Path<i64>,
) -> ApiResult<Json<ObjectResponse<TodoJson>>> {
    let todo = owned_todo(&state.db, id, user.id)?;
    Ok(object(TodoJson::new(todo, tz)))
}

pub async fn update_todo(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    tz: ActiveTimezone,
    Path(id): Path<i64>,
    Form(form): Form<TodoForm>,
) -> ApiResult<Json<ObjectResponse<TodoJson>>> {
    let existing = owned_todo(&state.db, id, user.id)?;
    let list_id = match form.list {
        Some(target) if target != existing.todo.list_id => {
            owned_list(&state.db, target, user.id)?;
            target
        }
        _ => existing.todo.list_id,
    };
    let new_todo = form.to_new_todo(tz)?;

    {
        let conn = state.db.get()?;
        todos::update_todo(&conn, id, list_id, &new_todo)?;
    }
    let todo = owned_todo(&state.db, id, user.id)?;
    Ok(object(TodoJson::new(todo, tz)))
}

pub async fn toggle_todo(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    tz: ActiveTimezone,
    Path(id): Path<i64>,
) -> ApiResult<Json<ObjectResponse<TodoJson>>> {
    let existing = owned_todo(&state.db, id, user.id)?;
    {
        let conn = state.db.get()?;
        todos::set_completed(&conn, id, !existing.todo.is_completed())?;
    }
    let todo = owned_todo(&state.db, id, user.id)?;
    Ok(object(TodoJson::new(todo, tz)))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    AjaxUser(user): AjaxUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    owned_todo(&state.db, id, user.id)?;
    let conn = state.db.get()?;
    todos::delete_todo(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chicago() -> ActiveTimezone {
        ActiveTimezone(chrono_tz::America::Chicago)
    }

    #[test]
    fn todo_form_normalizes_fields() {
        let form = TodoForm {
            title: "  Buy milk ".into(),
            priority: "".into(),
            due: "2024-01-15T09:30".into(),
            tags: "Errands, errands ,home".into(),
            ..Default::default()
        };
        let todo = form.to_new_todo(chicago()).unwrap();
        assert_eq!(todo.title, "Buy milk");
        assert_eq!(todo.priority, Priority::None);
        assert_eq!(todo.due_at.as_deref(), Some("2024-01-15 15:30:00"));
        assert_eq!(todo.tags, vec!["errands", "home"]);
    }

    #[test]
    fn todo_form_rejects_invalid_input() {
        let blank = TodoForm::default();
        assert!(blank.to_new_todo(chicago()).is_err());

        let long = TodoForm {
            title: "x".repeat(MAX_TITLE + 1),
            ..Default::default()
        };
        assert!(long.to_new_todo(chicago()).is_err());

        let bad_priority = TodoForm {
            title: "ok".into(),
            priority: "7".into(),
            ..Default::default()
        };
        assert!(bad_priority.to_new_todo(chicago()).is_err());
    }

    #[test]
    fn query_resolves_sort_and_tag() {
        let query = TodoQuery {
            tag: Some(" Home ".into()),
            completed: Some(false),
            sort: Some("due".into()),
            dir: Some("desc".into()),
        };
        let filter = query.to_filter();
        assert_eq!(filter.tag.as_deref(), Some("home"));
        assert_eq!(filter.completed, Some(false));
        assert_eq!(
            filter.sort_sql.as_deref(),
            Some("t.due_at IS NULL, t.due_at DESC")
        );
    }

    #[test]
    fn unknown_sort_column_falls_back_to_created() {
        let query = TodoQuery {
            sort: Some("owner_id".into()),
            ..Default::default()
        };
        assert_eq!(query.to_filter().sort_sql.as_deref(), Some("t.created_at ASC"));
    }
}
