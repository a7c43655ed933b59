#![allow(dead_code)]

use std::path::PathBuf;
use tempfile::TempDir;
use rusqlite::Connection;
use gallery_identity::db::{self, query, writer};
use gallery_identity::identity::{ClusterParams, IdentityEngine};
use gallery_identity::models::face::{BoundingBox, FaceId, PersonId, PersonLabel, PersonSource};

pub const EPS: f32 = 0.44;

/// Create a temporary SQLite database for testing
pub fn setup_test_db() -> (TempDir, PathBuf, Connection) {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("gallery.db");
    let conn = db::open_or_create(&db_path).unwrap();
    (tmp, db_path, conn)
}

pub fn engine() -> IdentityEngine {
    IdentityEngine::new(ClusterParams { eps: EPS, min_samples: 3 })
}

/// A 4-d embedding sitting at `center` on the first axis, nudged by
/// `offset` along `axis`.
pub fn point(center: f32, axis: usize, offset: f32) -> Vec<f32> {
    let mut v = vec![center, 0.0, 0.0, 0.0];
    v[axis] += offset;
    v
}

pub fn add_face(conn: &Connection, embedding: &[f32]) -> FaceId {
    let bbox = BoundingBox { top: 0, left: 0, right: 100, bottom: 100 };
    writer::insert_face(conn, 1, &bbox, Some(embedding), None).unwrap()
}

/// A tight group of `n` faces around `center`; every pair is ~0.07 apart.
pub fn add_group(conn: &Connection, center: f32, n: usize) -> Vec<FaceId> {
    (0..n).map(|i| add_face(conn, &point(center, i % 4, 0.05))).collect()
}

pub fn label(conn: &Connection, face_id: FaceId) -> Option<PersonLabel> {
    query::get_face(conn, face_id).unwrap().unwrap().label
}

pub fn person_of(conn: &Connection, face_id: FaceId) -> Option<PersonId> {
    label(conn, face_id).map(|l| l.person_id)
}

pub fn source_of(conn: &Connection, face_id: FaceId) -> Option<PersonSource> {
    label(conn, face_id).map(|l| l.source)
}

pub fn name_of(conn: &Connection, person_id: PersonId) -> Option<String> {
    query::get_person(conn, person_id).unwrap().unwrap().name
}

/// Label a face manually, reusing a person with the same name.
pub fn set_manual(conn: &Connection, face_id: FaceId, name: &str) -> PersonId {
    let person_id = match query::find_person_by_name(conn, name).unwrap() {
        Some(p) => p.id,
        None => writer::insert_person(conn, Some(name)).unwrap(),
    };
    writer::set_face_person(conn, face_id, Some(PersonLabel::manual(person_id))).unwrap();
    person_id
}

/// Every face's raw (id, person_id, person_source) row.
pub fn snapshot(conn: &Connection) -> Vec<(FaceId, Option<i64>, Option<String>)> {
    let mut stmt = conn
        .prepare("SELECT id, person_id, person_source FROM faces ORDER BY id")
        .unwrap();
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows
}

pub fn count_persons(conn: &Connection) -> usize {
    query::all_person_ids(conn).unwrap().len()
}

/// Checks that must hold after any completed run: labels are whole and no
/// person is left without a visible face.
pub fn assert_invariants(conn: &Connection) {
    let half_labeled: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM faces WHERE (person_id IS NULL) != (person_source IS NULL)",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(half_labeled, 0, "person_id and person_source disagree");

    for person_id in query::all_person_ids(conn).unwrap() {
        assert!(
            query::count_visible_faces_of_person(conn, person_id).unwrap() > 0,
            "person {person_id} has no visible faces"
        );
    }
}
