use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gallery_identity::db::{self, writer};
use gallery_identity::identity::cluster::{dbscan, ClusterParams};
use gallery_identity::identity::IdentityEngine;
use gallery_identity::models::face::BoundingBox;
use tempfile::tempdir;

const DIM: usize = 128;

/// `people` well separated centers with `per_person` jittered faces each.
fn synthetic_embeddings(people: usize, per_person: usize) -> Vec<Vec<f32>> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 40) as f32 / (1u64 << 24) as f32 - 0.5
    };
    let mut out = Vec::with_capacity(people * per_person);
    for p in 0..people {
        let center: Vec<f32> = (0..DIM).map(|d| if d == p % DIM { 4.0 * (1 + p / DIM) as f32 } else { 0.0 }).collect();
        for _ in 0..per_person {
            out.push(center.iter().map(|c| c + next() * 0.05).collect());
        }
    }
    out
}

fn bench_dbscan(c: &mut Criterion) {
    let points = synthetic_embeddings(50, 20);
    let params = ClusterParams::default();
    c.bench_function("dbscan_1000_faces", |b| {
        b.iter(|| black_box(dbscan(&points, &params)));
    });
}

fn bench_resolve(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let conn = db::open_or_create(dir.path().join("bench.db")).unwrap();
    let bbox = BoundingBox { top: 0, left: 0, right: 100, bottom: 100 };
    for e in synthetic_embeddings(25, 20) {
        writer::insert_face(&conn, 1, &bbox, Some(&e), None).unwrap();
    }
    let engine = IdentityEngine::default();
    engine.resolve_identities(&conn).unwrap();
    // Steady state: every later run finds nothing to change.
    c.bench_function("resolve_500_faces_stable", |b| {
        b.iter(|| black_box(engine.resolve_identities(&conn).unwrap()));
    });
}

criterion_group!(benches, bench_dbscan, bench_resolve);
criterion_main!(benches);
