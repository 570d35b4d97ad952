use askama::Template;
use axum::extract::State;
use axum::response::Html;

use crate::auth::CurrentUser;
use crate::db::queries::{todo_lists, todos};
use crate::error::{AppResult, RenderHtml};
use crate::handlers::PageContext;
use crate::models::{TodoListSummary, TodoWithTags};
use crate::session::Session;
use crate::state::AppState;
use crate::timezone::ActiveTimezone;

pub struct OpenTodo {
    pub id: i64,
    pub title: String,
    pub priority: &'static str,
    /// Localized due date, empty when there is none.
    pub due: String,
    pub tags: Vec<String>,
}

impl OpenTodo {
    fn new(item: TodoWithTags, tz: ActiveTimezone) -> Self {
        Self {
            id: item.todo.id,
            priority: item.priority_label(),
            due: item
                .todo
                .due_at
                .as_deref()
                .map(|due| tz.localize(due))
                .unwrap_or_default(),
            title: item.todo.title,
            tags: item.tags,
        }
    }

    pub fn has_due(&self) -> bool {
        !self.due.is_empty()
    }

    pub fn tag_list(&self) -> String {
        self.tags.join(", ")
    }
}

pub struct ListPanel {
    pub list: TodoListSummary,
    pub open: Vec<OpenTodo>,
}

#[derive(Template)]
#[template(path = "pages/main.html")]
pub struct MainTemplate {
    pub page: PageContext,
    pub lists: Vec<ListPanel>,
}

pub async fn index(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    tz: ActiveTimezone,
) -> AppResult<Html<String>> {
    let conn = state.db.get()?;

    let open_only = todos::TodoFilter {
        completed: Some(false),
        sort_sql: Some("t.due_at IS NULL, t.due_at ASC, t.priority DESC".into()),
        ..Default::default()
    };

    let mut lists = Vec::new();
    for list in todo_lists::list_lists(&conn, user.id)? {
        let open = todos::list_todos(&conn, list.list.id, &open_only)?
            .into_iter()
            .map(|item| OpenTodo::new(item, tz))
            .collect();
        lists.push(ListPanel { list, open });
    }

    MainTemplate {
        page: PageContext::new("To-do lists", &session, Some(&user), tz),
        lists,
    }
    .render_html()
}
