use anyhow::Result;
use rusqlite::{Connection, params};
use crate::models::face::{BoundingBox, FaceId, HiddenReason, PersonId, PersonLabel, PersonSource};

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn insert_person(conn: &Connection, name: Option<&str>) -> Result<PersonId> {
    let created_at = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO persons (name, created_at) VALUES (?1, ?2)",
        params![name, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn rename_person(conn: &Connection, person_id: PersonId, name: Option<&str>) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE persons SET name = ?1 WHERE id = ?2",
        params![name, person_id],
    )?;
    Ok(updated > 0)
}

/// Delete a person. Its faces lose both their person and their source in the
/// same transaction.
pub fn delete_person(conn: &Connection, person_id: PersonId) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE faces SET person_id = NULL, person_source = NULL WHERE person_id = ?1",
        params![person_id],
    )?;
    tx.execute("DELETE FROM face_excluded_persons WHERE person_id = ?1", params![person_id])?;
    let deleted = tx.execute("DELETE FROM persons WHERE id = ?1", params![person_id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

pub struct MergePersonsResult {
    pub faces_updated: i64,
}

/// Reassign every face of `source_person_id` to `target_person_id` and delete
/// the source. A merge is the user vouching for those faces, so they all
/// become manual labels.
pub fn merge_persons(conn: &Connection, source_person_id: PersonId, target_person_id: PersonId) -> Result<MergePersonsResult> {
    let tx = conn.unchecked_transaction()?;

    let faces_updated = tx.execute(
        "UPDATE faces SET person_id = ?1, person_source = 'manual' WHERE person_id = ?2",
        params![target_person_id, source_person_id],
    )?;

    // A face that rejected the source person now rejects who it was merged into.
    tx.execute(
        "UPDATE OR IGNORE face_excluded_persons SET person_id = ?1 WHERE person_id = ?2",
        params![target_person_id, source_person_id],
    )?;
    tx.execute("DELETE FROM face_excluded_persons WHERE person_id = ?1", params![source_person_id])?;

    tx.execute("DELETE FROM persons WHERE id = ?1", params![source_person_id])?;

    tx.commit()?;

    Ok(MergePersonsResult {
        faces_updated: faces_updated as i64,
    })
}

pub fn insert_face(
    conn: &Connection,
    image_id: i64,
    bbox: &BoundingBox,
    embedding: Option<&[f32]>,
    hidden_reason: Option<HiddenReason>,
) -> Result<FaceId> {
    let embedding_bytes = embedding.map(encode_embedding);
    conn.execute(
        "INSERT INTO faces (image_id, bbox_top, bbox_right, bbox_bottom, bbox_left, embedding_blob, hidden, hidden_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            image_id,
            bbox.top,
            bbox.right,
            bbox.bottom,
            bbox.left,
            embedding_bytes,
            hidden_reason.is_some() as i64,
            hidden_reason,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_face_embedding(conn: &Connection, face_id: FaceId, embedding: &[f32]) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE faces SET embedding_blob = ?1 WHERE id = ?2",
        params![encode_embedding(embedding), face_id],
    )?;
    Ok(updated > 0)
}

/// Set or clear a face's person. Person and source are written by one
/// statement so readers never see one without the other.
pub fn set_face_person(conn: &Connection, face_id: FaceId, label: Option<PersonLabel>) -> Result<bool> {
    let (person_id, source): (Option<PersonId>, Option<PersonSource>) = match label {
        Some(l) => (Some(l.person_id), Some(l.source)),
        None => (None, None),
    };
    let updated = conn.execute(
        "UPDATE faces SET person_id = ?1, person_source = ?2 WHERE id = ?3",
        params![person_id, source, face_id],
    )?;
    Ok(updated > 0)
}

/// Hide a face with a reason, or un-hide it with `None`.
pub fn set_face_hidden(conn: &Connection, face_id: FaceId, reason: Option<HiddenReason>) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE faces SET hidden = ?1, hidden_reason = ?2 WHERE id = ?3",
        params![reason.is_some() as i64, reason, face_id],
    )?;
    Ok(updated > 0)
}

pub fn exclude_person_for_face(conn: &Connection, face_id: FaceId, person_id: PersonId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO face_excluded_persons (face_id, person_id) VALUES (?1, ?2)",
        params![face_id, person_id],
    )?;
    Ok(())
}

pub fn clear_exclusion(conn: &Connection, face_id: FaceId, person_id: PersonId) -> Result<()> {
    conn.execute(
        "DELETE FROM face_excluded_persons WHERE face_id = ?1 AND person_id = ?2",
        params![face_id, person_id],
    )?;
    Ok(())
}

/// Drop every automatic assignment. Manual labels are untouched.
pub fn clear_automatic_labels(conn: &Connection) -> Result<usize> {
    let cleared = conn.execute(
        "UPDATE faces SET person_id = NULL, person_source = NULL WHERE person_source IS NULL OR person_source = 'automatic'",
        [],
    )?;
    Ok(cleared)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceRepair {
    /// Faces with a source but no person; the source was cleared.
    pub dangling_sources: usize,
    /// Faces with a person but no source; now marked automatic.
    pub missing_sources: usize,
}

/// Repair faces whose person and source disagree about being set.
pub fn normalize_sources(conn: &Connection) -> Result<SourceRepair> {
    let tx = conn.unchecked_transaction()?;
    let dangling_sources = tx.execute(
        "UPDATE faces SET person_source = NULL WHERE person_id IS NULL AND person_source IS NOT NULL",
        [],
    )?;
    let missing_sources = tx.execute(
        "UPDATE faces SET person_source = 'automatic' WHERE person_id IS NOT NULL AND person_source IS NULL",
        [],
    )?;
    tx.commit()?;
    Ok(SourceRepair { dangling_sources, missing_sources })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{query, schema};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::apply_schema(&conn).unwrap();
        conn
    }

    fn face(conn: &Connection) -> FaceId {
        insert_face(conn, 1, &BoundingBox::default(), Some(&[0.0, 1.0]), None).unwrap()
    }

    #[test]
    fn delete_person_unlinks_faces_completely() {
        let conn = conn();
        let p = insert_person(&conn, Some("Alice")).unwrap();
        let f = face(&conn);
        set_face_person(&conn, f, Some(PersonLabel::manual(p))).unwrap();

        assert!(delete_person(&conn, p).unwrap());
        let (pid, src): (Option<i64>, Option<String>) = conn
            .query_row("SELECT person_id, person_source FROM faces WHERE id = ?", params![f], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(pid, None);
        assert_eq!(src, None);
        assert!(!delete_person(&conn, p).unwrap());
    }

    #[test]
    fn merge_moves_faces_and_exclusions() {
        let conn = conn();
        let a = insert_person(&conn, None).unwrap();
        let b = insert_person(&conn, Some("Bob")).unwrap();
        let f1 = face(&conn);
        let f2 = face(&conn);
        set_face_person(&conn, f1, Some(PersonLabel::automatic(a))).unwrap();
        set_face_person(&conn, f2, Some(PersonLabel::manual(a))).unwrap();
        let other = face(&conn);
        exclude_person_for_face(&conn, other, a).unwrap();

        let result = merge_persons(&conn, a, b).unwrap();
        assert_eq!(result.faces_updated, 2);
        assert!(query::get_person(&conn, a).unwrap().is_none());
        assert_eq!(query::get_face(&conn, f1).unwrap().unwrap().label, Some(PersonLabel::manual(b)));
        assert_eq!(query::get_face(&conn, f2).unwrap().unwrap().label, Some(PersonLabel::manual(b)));
        assert!(query::excluded_persons(&conn, other).unwrap().contains(&b));
    }

    #[test]
    fn normalize_repairs_both_directions() {
        let conn = conn();
        let p = insert_person(&conn, None).unwrap();
        let f1 = face(&conn);
        let f2 = face(&conn);
        conn.execute("UPDATE faces SET person_id = ?1 WHERE id = ?2", params![p, f1]).unwrap();
        conn.execute("UPDATE faces SET person_source = 'manual' WHERE id = ?1", params![f2]).unwrap();

        let repair = normalize_sources(&conn).unwrap();
        assert_eq!(repair, SourceRepair { dangling_sources: 1, missing_sources: 1 });
        assert_eq!(query::get_face(&conn, f1).unwrap().unwrap().label, Some(PersonLabel::automatic(p)));
        assert_eq!(query::get_face(&conn, f2).unwrap().unwrap().label, None);
        assert_eq!(normalize_sources(&conn).unwrap(), SourceRepair::default());
    }

    #[test]
    fn hide_and_unhide_track_reason() {
        let conn = conn();
        let f = face(&conn);
        set_face_hidden(&conn, f, Some(HiddenReason::Manual)).unwrap();
        let hidden = query::get_face(&conn, f).unwrap().unwrap();
        assert!(hidden.hidden);
        assert_eq!(hidden.hidden_reason, Some(HiddenReason::Manual));
        assert!(query::all_embeddings(&conn, false).unwrap().is_empty());
        assert_eq!(query::all_embeddings(&conn, true).unwrap().len(), 1);

        set_face_hidden(&conn, f, None).unwrap();
        let shown = query::get_face(&conn, f).unwrap().unwrap();
        assert!(!shown.hidden);
        assert_eq!(shown.hidden_reason, None);
    }
}
