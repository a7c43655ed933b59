// Face clustering
// ---------------
//
// Plain DBSCAN over Euclidean distance. Every call recomputes from scratch over
// the embeddings it is given and keeps no state between calls.
//
// Neighbourhoods are computed up front with a brute-force pairwise pass, so a
// run is O(n²) in the number of faces. That is fine for personal galleries;
// a much larger collection would want a spatial index here.

use rayon::prelude::*;

/// Density parameters for the clusterer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Neighbourhood radius. Also the cutoff for automatic assignment.
    pub eps: f32,
    /// Points (including the point itself) needed within `eps` to form a core.
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self { eps: 0.44, min_samples: 3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterLabel {
    Cluster(usize),
    /// Could not be grouped with anything at the configured density.
    Noise,
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

fn neighbourhoods<E: AsRef<[f32]> + Sync>(points: &[E], eps: f32) -> Vec<Vec<usize>> {
    (0..points.len())
        .into_par_iter()
        .map(|i| {
            let p = points[i].as_ref();
            points
                .iter()
                .enumerate()
                .filter(|(_, q)| euclidean_distance(p, q.as_ref()) <= eps)
                .map(|(j, _)| j)
                .collect()
        })
        .collect()
}

/// Label every point with a cluster or noise. Output is index-aligned with
/// `points`; cluster numbers are assigned in order of the lowest index that
/// seeds them, so identical input always yields identical labels.
pub fn dbscan<E: AsRef<[f32]> + Sync>(points: &[E], params: &ClusterParams) -> Vec<ClusterLabel> {
    let n = points.len();
    if n == 0 {
        return vec![];
    }
    let min_samples = params.min_samples.max(1);
    let neighbours = neighbourhoods(points, params.eps);

    let mut labels: Vec<Option<ClusterLabel>> = vec![None; n];
    let mut next_cluster = 0usize;

    for i in 0..n {
        if labels[i].is_some() {
            continue;
        }
        if neighbours[i].len() < min_samples {
            labels[i] = Some(ClusterLabel::Noise);
            continue;
        }

        let cluster = ClusterLabel::Cluster(next_cluster);
        next_cluster += 1;
        labels[i] = Some(cluster);

        let mut queue: std::collections::VecDeque<usize> = neighbours[i].iter().copied().collect();
        while let Some(j) = queue.pop_front() {
            match labels[j] {
                // A point first seen as noise is a border point of this cluster.
                Some(ClusterLabel::Noise) => labels[j] = Some(cluster),
                Some(ClusterLabel::Cluster(_)) => continue,
                None => {
                    labels[j] = Some(cluster);
                    if neighbours[j].len() >= min_samples {
                        queue.extend(neighbours[j].iter().copied().filter(|&k| !matches!(labels[k], Some(ClusterLabel::Cluster(_)))));
                    }
                }
            }
        }
    }

    labels.into_iter().map(|l| l.unwrap_or(ClusterLabel::Noise)).collect()
}
