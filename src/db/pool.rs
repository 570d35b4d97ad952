use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use uuid::Uuid;

pub type DbPool = Pool<SqliteConnectionManager>;

const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;
     PRAGMA busy_timeout = 5000;";

pub fn create_pool(database_path: &Path) -> Result<DbPool, r2d2::Error> {
    if let Some(parent) = database_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(CONNECTION_PRAGMAS)
    });

    Pool::builder().max_size(10).build(manager)
}

/// Pool over a private in-memory database. All connections share one
/// database through SQLite's shared cache; it lives as long as the pool.
pub fn create_in_memory_pool() -> Result<DbPool, r2d2::Error> {
    let uri = format!("file:markitdone-{}?mode=memory&cache=shared", Uuid::new_v4().simple());
    let manager =
        SqliteConnectionManager::file(uri).with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));

    Pool::builder().max_size(4).min_idle(Some(1)).build(manager)
}
