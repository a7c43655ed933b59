//! Faces the clusterer could not group with anything.
//!
//! Each is its own singleton identity. A noise face that is already the only
//! visible face of an automatic person is left where it is, so a face that is
//! persistently unclusterable does not get a fresh anonymous person every run.

use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;
use crate::db::{query, writer};
use crate::models::face::{FaceId, PersonId, PersonLabel, PersonSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseDecision {
    Keep,
    NewAnonymous,
}

/// `sole_face_of` reports whether this face is the only visible face of the
/// given person.
pub fn decide<F>(label: Option<PersonLabel>, sole_face_of: F) -> Result<NoiseDecision>
where
    F: FnOnce(PersonId) -> Result<bool>,
{
    match label {
        // Manual labels belong to the user.
        Some(l) if l.source == PersonSource::Manual => Ok(NoiseDecision::Keep),
        Some(l) => {
            if sole_face_of(l.person_id)? {
                Ok(NoiseDecision::Keep)
            } else {
                Ok(NoiseDecision::NewAnonymous)
            }
        }
        None => Ok(NoiseDecision::NewAnonymous),
    }
}

/// Resolve one noise face against the store. Returns the person it was moved
/// to, if it moved.
pub fn resolve_noise_face(conn: &Connection, face_id: FaceId, label: Option<PersonLabel>) -> Result<Option<PersonId>> {
    let decision = decide(label, |person_id| {
        // Counted fresh: earlier noise faces in this run may have left the person.
        Ok(query::count_visible_faces_of_person(conn, person_id)? <= 1)
    })?;
    match decision {
        NoiseDecision::Keep => Ok(None),
        NoiseDecision::NewAnonymous => {
            let tx = conn.unchecked_transaction()?;
            let person_id = writer::insert_person(&tx, None)?;
            writer::set_face_person(&tx, face_id, Some(PersonLabel::automatic(person_id)))?;
            tx.commit()?;
            debug!("noise face {} -> new anonymous person {}", face_id, person_id);
            Ok(Some(person_id))
        }
    }
}
