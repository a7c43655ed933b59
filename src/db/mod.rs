pub mod schema;
pub mod writer;
pub mod query;

use anyhow::Result;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

pub fn open_or_create<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    schema::apply_pragmas(&conn)?;
    schema::apply_schema(&conn)?;
    Ok(conn)
}

/// Build a connection pool over an on-disk database, creating the schema first.
pub fn create_pool<P: AsRef<Path>>(db_path: P, size: u32) -> Result<DbPool> {
    // Schema is applied once up front so pooled connections only need pragmas.
    drop(open_or_create(db_path.as_ref())?);
    let manager = SqliteConnectionManager::file(db_path.as_ref()).with_init(|c| {
        c.pragma_update(None, "synchronous", "NORMAL")?;
        c.pragma_update(None, "foreign_keys", "ON")?;
        c.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    });
    let pool = r2d2::Pool::builder().max_size(size.max(1)).build(manager)?;
    Ok(pool)
}
