//! Garbage collection of persons nobody visible refers to.

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;
use crate::db::{query, writer};
use crate::models::face::PersonId;

/// Delete every person with no non-hidden face. Hidden faces still pointing
/// at a deleted person are unlinked. Returns the deleted ids.
pub fn collect(conn: &Connection) -> Result<Vec<PersonId>> {
    let mut deleted = Vec::new();
    for person_id in query::all_person_ids(conn)? {
        if !query::faces_of_person(conn, person_id, false)?.is_empty() {
            continue;
        }
        if writer::delete_person(conn, person_id)? {
            deleted.push(person_id);
        }
    }
    if !deleted.is_empty() {
        info!("garbage collected {} persons: {:?}", deleted.len(), deleted);
    }
    Ok(deleted)
}
