use std::path::Path;
use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;
use crate::db::writer;
use crate::identity::engine::{IdentityEngine, ResolveReport};
use crate::models::face::{BoundingBox, Detection, HiddenReason};

/// Faces narrower or shorter than this fraction of the image are hidden on
/// arrival.
pub const SMALL_FACE_FRACTION: f64 = 0.04;

/// Finds faces in an image and embeds each of them. Detection models live
/// behind this trait; the engine only consumes their output.
pub trait Embedder {
    fn detect_and_embed(&self, image_path: &Path) -> Result<Vec<Detection>>;
}

#[derive(Debug, Clone, Copy)]
pub struct ImageRef<'a> {
    pub id: i64,
    pub path: &'a Path,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub faces_added: usize,
    pub hidden_small: usize,
    pub resolve: ResolveReport,
}

pub fn is_small_face(bbox: &BoundingBox, width: u32, height: u32) -> bool {
    if width == 0 || height == 0 {
        return true;
    }
    (bbox.height() as f64) / (height as f64) < SMALL_FACE_FRACTION
        || (bbox.width() as f64) / (width as f64) < SMALL_FACE_FRACTION
}

/// Detect and store the faces of a newly added image, then resolve
/// identities so the new faces join (or found) persons.
pub fn ingest_image<E: Embedder + ?Sized>(
    engine: &IdentityEngine,
    conn: &Connection,
    embedder: &E,
    image: &ImageRef<'_>,
) -> Result<IngestReport> {
    let detections = embedder
        .detect_and_embed(image.path)
        .with_context(|| format!("detecting faces in image {} ({})", image.id, image.path.display()))?;

    let mut report = IngestReport::default();
    let tx = conn.unchecked_transaction()?;
    for d in &detections {
        let hidden = is_small_face(&d.bbox, image.width, image.height).then_some(HiddenReason::Small);
        if hidden.is_some() {
            report.hidden_small += 1;
        }
        writer::insert_face(&tx, image.id, &d.bbox, Some(&d.embedding), hidden)?;
        report.faces_added += 1;
    }
    tx.commit()?;
    info!("image {}: stored {} faces ({} hidden as small)", image.id, report.faces_added, report.hidden_small);

    if report.faces_added > 0 {
        report.resolve = engine.resolve_identities(conn)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_face_threshold() {
        let bbox = BoundingBox { top: 0, left: 0, right: 50, bottom: 50 };
        assert!(!is_small_face(&bbox, 1000, 1000));
        assert!(is_small_face(&bbox, 2000, 1000));
        assert!(is_small_face(&bbox, 0, 0));
    }
}
