//! Per-cluster reconciliation.
//!
//! A cluster is resolved in priority order:
//!
//! 1. If any member is manually labeled, every other member moves to the
//!    person of its nearest manual face, provided that face is within `eps`.
//! 2. Otherwise, if any member is automatically labeled, unlabeled members
//!    move to the person of their nearest automatic face, same cutoff.
//! 3. Otherwise the whole cluster becomes one new anonymous person.
//!
//! Planning is pure; [`apply_plan`] performs the writes for one cluster inside
//! a single transaction.

use std::collections::{HashMap, HashSet};
use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;
use crate::db::writer;
use crate::identity::nearest::ReferenceIndex;
use crate::models::face::{FaceId, PersonId, PersonLabel, PersonSource};

/// A face taking part in a run, with the label it had when the run started.
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
    pub face_id: FaceId,
    pub embedding: &'a [f32],
    pub label: Option<PersonLabel>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub face_id: FaceId,
    pub person_id: PersonId,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterPlan {
    /// Point these faces at existing persons. May be empty.
    Propagate(Vec<Assignment>),
    /// Nobody in the cluster is labeled: anchor all of it to a new person.
    NewAnonymous(Vec<FaceId>),
}

impl ClusterPlan {
    pub fn is_noop(&self) -> bool {
        match self {
            ClusterPlan::Propagate(a) => a.is_empty(),
            ClusterPlan::NewAnonymous(f) => f.is_empty(),
        }
    }
}

/// Outcome of applying one plan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub assigned: usize,
    pub persons_created: usize,
}

fn propagate(
    members: &[Member<'_>],
    reference_source: PersonSource,
    eps: f32,
    exclusions: &HashMap<FaceId, HashSet<PersonId>>,
) -> Vec<Assignment> {
    let mut index = ReferenceIndex::new();
    for m in members {
        if let Some(label) = m.label.filter(|l| l.source == reference_source) {
            index.add(m.face_id, label.person_id, m.embedding);
        }
    }

    let mut out = Vec::new();
    for m in members {
        let is_target = match (reference_source, m.label) {
            // Manual faces are never targets.
            (_, Some(l)) if l.source == PersonSource::Manual => false,
            (PersonSource::Manual, _) => true,
            // With automatic references only unlabeled faces move.
            (PersonSource::Automatic, label) => label.is_none(),
        };
        if !is_target {
            continue;
        }
        let Some(hit) = index.nearest(m.face_id, m.embedding, eps, exclusions.get(&m.face_id)) else {
            continue;
        };
        if m.label == Some(PersonLabel::automatic(hit.person_id)) {
            continue;
        }
        out.push(Assignment { face_id: m.face_id, person_id: hit.person_id, distance: hit.distance });
    }
    out
}

/// Decide what should change in one cluster. Faces already carrying the
/// label they would be given produce no assignment.
pub fn plan_cluster(
    members: &[Member<'_>],
    eps: f32,
    exclusions: &HashMap<FaceId, HashSet<PersonId>>,
) -> ClusterPlan {
    let has = |source: PersonSource| members.iter().any(|m| m.label.map(|l| l.source) == Some(source));

    if has(PersonSource::Manual) {
        ClusterPlan::Propagate(propagate(members, PersonSource::Manual, eps, exclusions))
    } else if has(PersonSource::Automatic) {
        ClusterPlan::Propagate(propagate(members, PersonSource::Automatic, eps, exclusions))
    } else {
        ClusterPlan::NewAnonymous(members.iter().map(|m| m.face_id).collect())
    }
}

/// Write one cluster's plan. All writes land or none do.
pub fn apply_plan(conn: &Connection, plan: &ClusterPlan) -> Result<Applied> {
    if plan.is_noop() {
        return Ok(Applied::default());
    }
    let tx = conn.unchecked_transaction()?;
    let mut applied = Applied::default();
    match plan {
        ClusterPlan::Propagate(assignments) => {
            for a in assignments {
                debug!("face {} -> person {} (distance {:.3})", a.face_id, a.person_id, a.distance);
                if writer::set_face_person(&tx, a.face_id, Some(PersonLabel::automatic(a.person_id)))? {
                    applied.assigned += 1;
                }
            }
        }
        ClusterPlan::NewAnonymous(faces) => {
            let person_id = writer::insert_person(&tx, None)?;
            applied.persons_created += 1;
            debug!("new anonymous person {} for {} faces", person_id, faces.len());
            for &face_id in faces {
                if writer::set_face_person(&tx, face_id, Some(PersonLabel::automatic(person_id)))? {
                    applied.assigned += 1;
                }
            }
        }
    }
    tx.commit()?;
    Ok(applied)
}
