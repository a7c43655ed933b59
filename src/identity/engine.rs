use std::collections::BTreeMap;
use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};
use crate::db::{query, writer};
use crate::identity::cluster::{self, ClusterLabel, ClusterParams};
use crate::identity::error::IdentityError;
use crate::identity::{gc, noise, reconcile};
use crate::models::face::{Face, FaceId, HiddenReason, PersonId, PersonLabel, PersonSource};

/// Summary of one `resolve_identities` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    pub faces_considered: usize,
    pub clusters: usize,
    pub noise: usize,
    pub assigned: usize,
    pub persons_created: usize,
    pub persons_deleted: usize,
    pub unchanged: usize,
}

impl ResolveReport {
    /// True when the run wrote nothing.
    pub fn is_stable(&self) -> bool {
        self.assigned == 0 && self.persons_created == 0 && self.persons_deleted == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelOutcome {
    pub person_id: PersonId,
    pub created_person: bool,
    pub report: ResolveReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RenameOutcome {
    Renamed,
    MergedInto { person_id: PersonId, report: ResolveReport },
}

/// The identity resolution engine.
///
/// Owns the clustering parameters and serializes runs: only one resolution
/// (or entry point that ends in one) executes at a time per engine.
pub struct IdentityEngine {
    params: ClusterParams,
    run_lock: Mutex<()>,
}

fn require_face(conn: &Connection, face_id: FaceId) -> Result<Face> {
    query::get_face(conn, face_id)?.ok_or_else(|| IdentityError::FaceNotFound(face_id).into())
}

fn require_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(IdentityError::EmptyName.into());
    }
    Ok(name)
}

/// Manually labeled faces are visible faces. A hidden face is unhidden when
/// it gets a label.
fn unhide_for_label(conn: &Connection, face: &Face) -> Result<()> {
    if face.hidden {
        writer::set_face_hidden(conn, face.id, None)?;
        info!("face {} unhidden by manual label", face.id);
    }
    Ok(())
}

impl IdentityEngine {
    pub fn new(params: ClusterParams) -> Self {
        Self { params, run_lock: Mutex::new(()) }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// Recluster every visible embedded face and reconcile the result with the
    /// stored labels, then drop persons left without faces.
    ///
    /// Safe to call at any time; a second call with no data change in between
    /// writes nothing.
    pub fn resolve_identities(&self, conn: &Connection) -> Result<ResolveReport> {
        let _guard = self.run_lock.lock();
        self.resolve_locked(conn)
    }

    fn resolve_locked(&self, conn: &Connection) -> Result<ResolveReport> {
        let repair = writer::normalize_sources(conn)?;
        if repair.dangling_sources > 0 || repair.missing_sources > 0 {
            warn!(
                "repaired inconsistent face labels: {} sources without person, {} persons without source",
                repair.dangling_sources, repair.missing_sources
            );
        }

        let embeddings = query::all_embeddings(conn, false)?;
        let mut report = ResolveReport { faces_considered: embeddings.len(), ..Default::default() };

        if !embeddings.is_empty() {
            let ids: Vec<FaceId> = embeddings.iter().map(|(id, _)| *id).collect();
            let faces = query::get_faces(conn, &ids)?;
            let exclusions = query::all_exclusions(conn)?;

            // A lone face has nothing to cluster with; it goes straight to noise handling.
            let labels = if embeddings.len() < 2 {
                vec![ClusterLabel::Noise; embeddings.len()]
            } else {
                let points: Vec<&[f32]> = embeddings.iter().map(|(_, e)| e.as_slice()).collect();
                cluster::dbscan(&points, &self.params)
            };

            let mut clusters: BTreeMap<usize, Vec<reconcile::Member<'_>>> = BTreeMap::new();
            let mut noise_members = Vec::new();
            for ((face_id, embedding), label) in embeddings.iter().zip(labels) {
                let member = reconcile::Member {
                    face_id: *face_id,
                    embedding: embedding.as_slice(),
                    label: faces.get(face_id).and_then(|f| f.label),
                };
                match label {
                    ClusterLabel::Cluster(c) => clusters.entry(c).or_default().push(member),
                    ClusterLabel::Noise => noise_members.push(member),
                }
            }
            report.clusters = clusters.len();
            report.noise = noise_members.len();
            info!("clustered {} faces into {} clusters, {} noise", embeddings.len(), clusters.len(), noise_members.len());

            for (cluster_id, members) in &clusters {
                let plan = reconcile::plan_cluster(members, self.params.eps, &exclusions);
                let applied = reconcile::apply_plan(conn, &plan).map_err(|e| {
                    e.context(format!("reconciling cluster {cluster_id} ({} faces)", members.len()))
                })?;
                report.assigned += applied.assigned;
                report.persons_created += applied.persons_created;
            }

            for member in &noise_members {
                if noise::resolve_noise_face(conn, member.face_id, member.label)?.is_some() {
                    report.assigned += 1;
                    report.persons_created += 1;
                }
            }
        }

        report.persons_deleted = gc::collect(conn)?.len();
        report.unchanged = report.faces_considered.saturating_sub(report.assigned);
        info!(
            "identity resolution: {} faces, {} clusters, {} noise, {} assigned, {} persons created, {} deleted",
            report.faces_considered, report.clusters, report.noise, report.assigned, report.persons_created, report.persons_deleted
        );
        Ok(report)
    }

    /// Name a face. Reuses the person that already has this exact name;
    /// otherwise names the face's anonymous person; otherwise creates a
    /// person. The face becomes a manual label and the rest re-converges.
    pub fn label_face(&self, conn: &Connection, face_id: FaceId, name: &str) -> Result<LabelOutcome> {
        let name = require_name(name)?;
        let _guard = self.run_lock.lock();
        let face = require_face(conn, face_id)?;

        let tx = conn.unchecked_transaction()?;
        let (person_id, created_person) = if let Some(existing) = query::find_person_by_name(&tx, name)? {
            (existing.id, false)
        } else {
            let current = match face.person_id() {
                Some(pid) => query::get_person(&tx, pid)?,
                None => None,
            };
            match current {
                Some(p) if p.is_anonymous() => {
                    writer::rename_person(&tx, p.id, Some(name))?;
                    info!("named anonymous person {} as {:?}", p.id, name);
                    (p.id, false)
                }
                _ => (writer::insert_person(&tx, Some(name))?, true),
            }
        };
        writer::set_face_person(&tx, face_id, Some(PersonLabel::manual(person_id)))?;
        writer::clear_exclusion(&tx, face_id, person_id)?;
        unhide_for_label(&tx, &face)?;
        tx.commit()?;
        info!("labeled face {} as person {} ({:?})", face_id, person_id, name);

        let report = self.resolve_locked(conn)?;
        Ok(LabelOutcome { person_id, created_person, report })
    }

    /// Manually assign a face to an existing person.
    pub fn assign_face(&self, conn: &Connection, face_id: FaceId, person_id: PersonId) -> Result<ResolveReport> {
        let _guard = self.run_lock.lock();
        let face = require_face(conn, face_id)?;
        if query::get_person(conn, person_id)?.is_none() {
            return Err(IdentityError::PersonNotFound(person_id).into());
        }
        let tx = conn.unchecked_transaction()?;
        writer::set_face_person(&tx, face_id, Some(PersonLabel::manual(person_id)))?;
        writer::clear_exclusion(&tx, face_id, person_id)?;
        unhide_for_label(&tx, &face)?;
        tx.commit()?;
        self.resolve_locked(conn)
    }

    /// Accept an automatic label as correct, promoting it to manual.
    pub fn confirm_face(&self, conn: &Connection, face_id: FaceId) -> Result<ResolveReport> {
        let _guard = self.run_lock.lock();
        let face = require_face(conn, face_id)?;
        let label = face.label.ok_or(IdentityError::NotLabeled(face_id))?;
        if label.source != PersonSource::Manual {
            writer::set_face_person(conn, face_id, Some(PersonLabel::manual(label.person_id)))?;
        }
        self.resolve_locked(conn)
    }

    /// "This is not them": remember the rejection, clear the label, and let
    /// the face find another identity.
    pub fn reject_face(&self, conn: &Connection, face_id: FaceId) -> Result<ResolveReport> {
        let _guard = self.run_lock.lock();
        let face = require_face(conn, face_id)?;
        let label = face.label.ok_or(IdentityError::NotLabeled(face_id))?;
        let tx = conn.unchecked_transaction()?;
        writer::exclude_person_for_face(&tx, face_id, label.person_id)?;
        writer::set_face_person(&tx, face_id, None)?;
        tx.commit()?;
        info!("face {} rejected person {}", face_id, label.person_id);
        self.resolve_locked(conn)
    }

    pub fn hide_face(&self, conn: &Connection, face_id: FaceId) -> Result<ResolveReport> {
        let _guard = self.run_lock.lock();
        require_face(conn, face_id)?;
        writer::set_face_hidden(conn, face_id, Some(HiddenReason::Manual))?;
        self.resolve_locked(conn)
    }

    pub fn unhide_face(&self, conn: &Connection, face_id: FaceId) -> Result<ResolveReport> {
        let _guard = self.run_lock.lock();
        require_face(conn, face_id)?;
        writer::set_face_hidden(conn, face_id, None)?;
        self.resolve_locked(conn)
    }

    /// Give a face that was detected earlier its embedding, making it
    /// eligible for clustering.
    pub fn attach_embedding(&self, conn: &Connection, face_id: FaceId, embedding: &[f32]) -> Result<ResolveReport> {
        let _guard = self.run_lock.lock();
        require_face(conn, face_id)?;
        writer::set_face_embedding(conn, face_id, embedding)?;
        self.resolve_locked(conn)
    }

    /// Move every face of `source` to `target` and delete `source`. An
    /// anonymous target inherits the source's name.
    pub fn merge_persons(&self, conn: &Connection, source: PersonId, target: PersonId) -> Result<ResolveReport> {
        let _guard = self.run_lock.lock();
        self.merge_locked(conn, source, target)
    }

    fn merge_locked(&self, conn: &Connection, source: PersonId, target: PersonId) -> Result<ResolveReport> {
        if source == target {
            return Err(IdentityError::SelfMerge.into());
        }
        let source_person = query::get_person(conn, source)?.ok_or(IdentityError::PersonNotFound(source))?;
        let target_person = query::get_person(conn, target)?.ok_or(IdentityError::PersonNotFound(target))?;

        let merged = writer::merge_persons(conn, source, target)?;
        if target_person.is_anonymous() && !source_person.is_anonymous() {
            writer::rename_person(conn, target, source_person.name.as_deref())?;
        }
        info!("merged person {} into {} ({} faces)", source, target, merged.faces_updated);
        self.resolve_locked(conn)
    }

    /// Rename a person. Taking a name another person already has merges the
    /// two.
    pub fn rename_person(&self, conn: &Connection, person_id: PersonId, name: &str) -> Result<RenameOutcome> {
        let name = require_name(name)?;
        let _guard = self.run_lock.lock();
        if query::get_person(conn, person_id)?.is_none() {
            return Err(IdentityError::PersonNotFound(person_id).into());
        }
        match query::find_person_by_name(conn, name)? {
            Some(existing) if existing.id != person_id => {
                let report = self.merge_locked(conn, person_id, existing.id)?;
                Ok(RenameOutcome::MergedInto { person_id: existing.id, report })
            }
            _ => {
                writer::rename_person(conn, person_id, Some(name))?;
                Ok(RenameOutcome::Renamed)
            }
        }
    }

    /// Explicit deletion. The person's faces become unlabeled and are picked
    /// up again by the next run.
    pub fn delete_person(&self, conn: &Connection, person_id: PersonId) -> Result<()> {
        let _guard = self.run_lock.lock();
        if !writer::delete_person(conn, person_id)? {
            return Err(IdentityError::PersonNotFound(person_id).into());
        }
        info!("deleted person {}", person_id);
        Ok(())
    }

    /// Throw away every automatic label and resolve from scratch. Manual
    /// labels survive.
    pub fn recluster(&self, conn: &Connection) -> Result<ResolveReport> {
        let _guard = self.run_lock.lock();
        let cleared = writer::clear_automatic_labels(conn)?;
        let deleted = gc::collect(conn)?.len();
        info!("recluster: cleared {} automatic labels, removed {} persons", cleared, deleted);
        let mut report = self.resolve_locked(conn)?;
        report.persons_deleted += deleted;
        Ok(report)
    }
}

impl Default for IdentityEngine {
    fn default() -> Self {
        Self::new(ClusterParams::default())
    }
}
