use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS persons (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT,
  created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_persons_name ON persons(name);

CREATE TABLE IF NOT EXISTS faces (
  id INTEGER PRIMARY KEY,
  image_id INTEGER NOT NULL,
  bbox_top INTEGER NOT NULL,
  bbox_right INTEGER NOT NULL,
  bbox_bottom INTEGER NOT NULL,
  bbox_left INTEGER NOT NULL,
  embedding_blob BLOB,
  hidden INTEGER NOT NULL DEFAULT 0,
  person_id INTEGER,
  person_source TEXT,
  FOREIGN KEY(person_id) REFERENCES persons(id)
);

CREATE INDEX IF NOT EXISTS idx_faces_person ON faces(person_id);
CREATE INDEX IF NOT EXISTS idx_faces_image ON faces(image_id);

CREATE TABLE IF NOT EXISTS face_excluded_persons (
  face_id INTEGER NOT NULL,
  person_id INTEGER NOT NULL,
  FOREIGN KEY(face_id) REFERENCES faces(id) ON DELETE CASCADE,
  PRIMARY KEY(face_id, person_id)
);
    "#,
    )?;

    // Backwards-compatible migration: databases created before faces could
    // record why they were hidden lack this column.
    let mut stmt = conn.prepare("PRAGMA table_info(faces)")?;
    let mut has_hidden_reason = false;
    {
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in rows {
            if name.unwrap_or_default() == "hidden_reason" {
                has_hidden_reason = true;
                break;
            }
        }
    }
    if !has_hidden_reason {
        conn.execute("ALTER TABLE faces ADD COLUMN hidden_reason TEXT", [])?;
    }

    migrate_persons_autoincrement(conn)?;

    Ok(())
}

/// Person ids must never be handed out twice. Databases created before
/// `persons` used AUTOINCREMENT get the table rebuilt, keeping every id.
fn migrate_persons_autoincrement(conn: &Connection) -> Result<()> {
    let sql: Option<String> = conn
        .query_row("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'persons'", [], |r| r.get(0))
        .optional()?;
    if sql.map_or(true, |s| s.to_ascii_uppercase().contains("AUTOINCREMENT")) {
        return Ok(());
    }

    // faces references persons; the swap below briefly drops the parent table.
    let foreign_keys: i64 = conn.pragma_query_value(None, "foreign_keys", |r| r.get(0))?;
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    let rebuilt = conn.execute_batch(
        r#"
BEGIN;
CREATE TABLE persons_rebuilt (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT,
  created_at INTEGER NOT NULL
);
INSERT INTO persons_rebuilt (id, name, created_at) SELECT id, name, created_at FROM persons;
DROP TABLE persons;
ALTER TABLE persons_rebuilt RENAME TO persons;
CREATE INDEX IF NOT EXISTS idx_persons_name ON persons(name);
COMMIT;
    "#,
    );
    if rebuilt.is_err() {
        let _ = conn.execute_batch("ROLLBACK;");
    }
    conn.pragma_update(None, "foreign_keys", foreign_keys)?;
    rebuilt?;
    tracing::info!("migrated persons table to AUTOINCREMENT ids");
    Ok(())
}
