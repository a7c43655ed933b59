use anyhow::Result;
use rusqlite::{Connection, params, Row, OptionalExtension};
use std::collections::{HashMap, HashSet};
use crate::models::face::{BoundingBox, Face, FaceId, Person, PersonId, PersonLabel, PersonSource, PersonSummary};

const FACE_COLUMNS: &str =
    "id, image_id, bbox_top, bbox_right, bbox_bottom, bbox_left, embedding_blob, hidden, hidden_reason, person_id, person_source";

fn row_to_face(row: &Row<'_>) -> rusqlite::Result<Face> {
    let id: FaceId = row.get("id")?;
    let blob: Option<Vec<u8>> = row.get("embedding_blob")?;
    let embedding = match blob {
        Some(b) => match decode_embedding_blob(&b) {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!("Failed to decode embedding for face {}: {}", id, e);
                None
            }
        },
        None => None,
    };
    let person_id: Option<PersonId> = row.get("person_id")?;
    let source: Option<PersonSource> = row.get("person_source")?;
    let label = match (person_id, source) {
        (Some(person_id), Some(source)) => Some(PersonLabel { person_id, source }),
        (Some(person_id), None) => {
            // Integrity fault: read it as an automatic label, the next run repairs the row.
            tracing::warn!("face {} has person {} but no person_source, treating as automatic", id, person_id);
            Some(PersonLabel::automatic(person_id))
        }
        (None, _) => None,
    };
    Ok(Face {
        id,
        image_id: row.get("image_id")?,
        bbox: BoundingBox {
            top: row.get("bbox_top")?,
            right: row.get("bbox_right")?,
            bottom: row.get("bbox_bottom")?,
            left: row.get("bbox_left")?,
        },
        embedding,
        hidden: row.get::<_, i64>("hidden")? != 0,
        hidden_reason: row.get("hidden_reason")?,
        label,
    })
}

fn row_to_person(row: &Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

pub fn decode_embedding_blob(blob: &[u8]) -> Result<Vec<f32>> {
    // Convert bytes back to f32 (little-endian)
    if blob.len() % 4 != 0 {
        anyhow::bail!("Embedding blob length is not a multiple of 4");
    }
    let mut embedding = Vec::with_capacity(blob.len() / 4);
    for chunk in blob.chunks_exact(4) {
        let bytes: [u8; 4] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        embedding.push(f32::from_le_bytes(bytes));
    }
    Ok(embedding)
}

/// Every face with an embedding, ordered by face id. Hidden faces are only
/// included on request.
pub fn all_embeddings(conn: &Connection, include_hidden: bool) -> Result<Vec<(FaceId, Vec<f32>)>> {
    let sql = if include_hidden {
        "SELECT id, embedding_blob FROM faces WHERE embedding_blob IS NOT NULL ORDER BY id"
    } else {
        "SELECT id, embedding_blob FROM faces WHERE embedding_blob IS NOT NULL AND hidden = 0 ORDER BY id"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, FaceId>(0)?, row.get::<_, Vec<u8>>(1)?)))?;
    let mut out = Vec::new();
    for r in rows {
        let (face_id, blob) = r?;
        match decode_embedding_blob(&blob) {
            Ok(embedding) => out.push((face_id, embedding)),
            Err(e) => tracing::warn!("Skipping face {} with unreadable embedding: {}", face_id, e),
        }
    }
    Ok(out)
}

pub fn get_face(conn: &Connection, face_id: FaceId) -> Result<Option<Face>> {
    let sql = format!("SELECT {FACE_COLUMNS} FROM faces WHERE id = ?");
    let face = conn.query_row(&sql, params![face_id], row_to_face).optional()?;
    Ok(face)
}

/// Faces keyed by id for a batch of ids. Missing ids are simply absent.
pub fn get_faces(conn: &Connection, face_ids: &[FaceId]) -> Result<HashMap<FaceId, Face>> {
    let sql = format!("SELECT {FACE_COLUMNS} FROM faces WHERE id = ?");
    let mut stmt = conn.prepare(&sql)?;
    let mut out = HashMap::with_capacity(face_ids.len());
    for &id in face_ids {
        if let Some(face) = stmt.query_row(params![id], row_to_face).optional()? {
            out.insert(id, face);
        }
    }
    Ok(out)
}

pub fn faces_of_person(conn: &Connection, person_id: PersonId, include_hidden: bool) -> Result<Vec<Face>> {
    let sql = if include_hidden {
        format!("SELECT {FACE_COLUMNS} FROM faces WHERE person_id = ? ORDER BY id")
    } else {
        format!("SELECT {FACE_COLUMNS} FROM faces WHERE person_id = ? AND hidden = 0 ORDER BY id")
    };
    let mut stmt = conn.prepare(&sql)?;
    let faces = stmt
        .query_map(params![person_id], row_to_face)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(faces)
}

pub fn count_visible_faces_of_person(conn: &Connection, person_id: PersonId) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM faces WHERE person_id = ? AND hidden = 0",
        params![person_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

pub fn get_person(conn: &Connection, person_id: PersonId) -> Result<Option<Person>> {
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM persons WHERE id = ?")?;
    let person = stmt.query_row(params![person_id], row_to_person).optional()?;
    Ok(person)
}

pub fn find_person_by_name(conn: &Connection, name: &str) -> Result<Option<Person>> {
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM persons WHERE name = ? ORDER BY id LIMIT 1")?;
    let person = stmt.query_row(params![name], row_to_person).optional()?;
    Ok(person)
}

pub fn all_person_ids(conn: &Connection) -> Result<Vec<PersonId>> {
    let mut stmt = conn.prepare("SELECT id FROM persons ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Persons with their non-hidden face counts, named ones first.
pub fn list_persons(conn: &Connection) -> Result<Vec<PersonSummary>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, COUNT(f.id) AS face_count
         FROM persons p LEFT JOIN faces f ON f.person_id = p.id AND f.hidden = 0
         GROUP BY p.id
         ORDER BY (p.name IS NULL OR p.name = ''), p.name, p.id",
    )?;
    let persons = stmt
        .query_map([], |row| Ok(PersonSummary { id: row.get(0)?, name: row.get(1)?, face_count: row.get(2)? }))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(persons)
}

/// Anonymous persons, biggest clusters first. This is the "who are these
/// people?" queue a user works through to name new identities.
pub fn list_anonymous_persons(conn: &Connection, offset: i64, limit: i64) -> Result<Vec<PersonSummary>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, COUNT(f.id) AS face_count
         FROM persons p LEFT JOIN faces f ON f.person_id = p.id AND f.hidden = 0
         WHERE p.name IS NULL OR TRIM(p.name) = ''
         GROUP BY p.id
         ORDER BY face_count DESC, p.id
         LIMIT ? OFFSET ?",
    )?;
    let persons = stmt
        .query_map(params![limit.max(0), offset.max(0)], |row| {
            Ok(PersonSummary { id: row.get(0)?, name: row.get(1)?, face_count: row.get(2)? })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(persons)
}

pub fn excluded_persons(conn: &Connection, face_id: FaceId) -> Result<HashSet<PersonId>> {
    let mut stmt = conn.prepare("SELECT person_id FROM face_excluded_persons WHERE face_id = ?")?;
    let ids = stmt
        .query_map(params![face_id], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(ids)
}

pub fn all_exclusions(conn: &Connection) -> Result<HashMap<FaceId, HashSet<PersonId>>> {
    let mut stmt = conn.prepare("SELECT face_id, person_id FROM face_excluded_persons")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, FaceId>(0)?, row.get::<_, PersonId>(1)?)))?;
    let mut out: HashMap<FaceId, HashSet<PersonId>> = HashMap::new();
    for r in rows {
        let (face_id, person_id) = r?;
        out.entry(face_id).or_default().insert(person_id);
    }
    Ok(out)
}
