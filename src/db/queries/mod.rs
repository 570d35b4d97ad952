pub mod registration;
pub mod sessions;
pub mod tags;
pub mod todo_lists;
pub mod todos;
pub mod users;
