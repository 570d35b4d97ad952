use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TodoList {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodoListSummary {
    #[serde(flatten)]
    pub list: TodoList,
    pub todo_count: i64,
    pub open_count: i64,
}

/// Longest accepted list name, in characters.
pub const MAX_LIST_NAME: usize = 100;
