pub mod tag;
pub mod todo;
pub mod todo_list;
pub mod user;

pub use tag::{normalize_tags, Tag, TagUsage};
pub use todo::{NewTodo, Priority, Todo, TodoWithTags};
pub use todo_list::{TodoList, TodoListSummary};
pub use user::{NewUser, User};
