pub mod migrations;
pub mod pool;
pub mod queries;

pub use pool::{create_in_memory_pool, create_pool, DbPool};

/// Format used for every timestamp column (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
