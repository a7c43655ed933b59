// Reference face index
// --------------------
//
// Brute-force k=1 search over a cluster's labeled faces. Clusters are small,
// so a linear scan per query is cheaper than building anything smarter.

use std::collections::HashSet;
use crate::identity::cluster::euclidean_distance;
use crate::models::face::{FaceId, PersonId};

/// Distances closer than this are treated as a tie.
const TIE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    pub face_id: FaceId,
    pub person_id: PersonId,
    pub distance: f32,
}

struct Reference<'a> {
    face_id: FaceId,
    person_id: PersonId,
    embedding: &'a [f32],
}

pub struct ReferenceIndex<'a> {
    refs: Vec<Reference<'a>>,
}

impl<'a> ReferenceIndex<'a> {
    pub fn new() -> Self {
        Self { refs: Vec::new() }
    }

    pub fn add(&mut self, face_id: FaceId, person_id: PersonId, embedding: &'a [f32]) {
        self.refs.push(Reference { face_id, person_id, embedding });
    }

    /// Closest reference to `query` within `eps`, skipping the face itself and
    /// any person the face has been told it is not.
    ///
    /// Ties go to the lowest person id, then the lowest face id, so the answer
    /// never depends on insertion order.
    pub fn nearest(
        &self,
        query_face: FaceId,
        query: &[f32],
        eps: f32,
        excluded: Option<&HashSet<PersonId>>,
    ) -> Option<Neighbour> {
        let mut best: Option<Neighbour> = None;
        for r in &self.refs {
            if r.face_id == query_face {
                continue;
            }
            if excluded.map_or(false, |ex| ex.contains(&r.person_id)) {
                continue;
            }
            let distance = euclidean_distance(query, r.embedding);
            if distance > eps {
                continue;
            }
            let candidate = Neighbour { face_id: r.face_id, person_id: r.person_id, distance };
            best = match best {
                None => Some(candidate),
                Some(b) if candidate.distance < b.distance - TIE_EPSILON => Some(candidate),
                Some(b) if (candidate.distance - b.distance).abs() <= TIE_EPSILON
                    && (candidate.person_id, candidate.face_id) < (b.person_id, b.face_id) =>
                {
                    Some(candidate)
                }
                keep => keep,
            };
        }
        best
    }
}

impl Default for ReferenceIndex<'_> {
    fn default() -> Self {
        Self::new()
    }
}
