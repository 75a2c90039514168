/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task clustering by a scalar stall metric, via Lloyd's algorithm with
//! optional k selection driven by a cluster-quality index.
//!
//! Points are a per-interval scratch buffer owned by the caller (the control
//! loop); a [`Cluster`] holds member ids rather than point references, which
//! sidesteps the reference-graph the original virtual-dispatch hierarchy
//! needed shared pointers for.

use std::collections::HashMap;

use rand::Rng;

use crate::error::ClusterError;

/// One task's position in metric space, keyed by the task's own id.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: u64,
    pub coords: Vec<f64>,
}

impl Point {
    pub fn new(id: u64, coords: Vec<f64>) -> Self {
        Point { id, coords }
    }
}

/// A group of points sharing a centroid. Holds member ids only — the points
/// themselves live in the caller's scratch buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: usize,
    pub centroid: Vec<f64>,
    pub members: Vec<u64>,
}

impl Cluster {
    pub fn dim(&self) -> usize {
        self.centroid.len()
    }

    pub fn contains(&self, point_id: u64) -> bool {
        self.members.contains(&point_id)
    }

    /// Recompute the centroid as the arithmetic mean of current members.
    /// A cluster with no members gets a `NAN` centroid (matching the
    /// reference behavior of an unreseeded empty cluster).
    pub fn update_means(&mut self, points: &HashMap<u64, &Point>) -> Result<(), ClusterError> {
        let dim = self.centroid.len();
        if self.members.is_empty() {
            self.centroid.iter_mut().for_each(|c| *c = f64::NAN);
            return Ok(());
        }
        let mut sums = vec![0.0; dim];
        for id in &self.members {
            let p = points
                .get(id)
                .expect("cluster member id must exist in the scratch buffer");
            if p.coords.len() != dim {
                return Err(ClusterError::DimensionMismatch {
                    point_dim: p.coords.len(),
                    cluster_dim: dim,
                });
            }
            for (s, c) in sums.iter_mut().zip(p.coords.iter()) {
                *s += c;
            }
        }
        let n = self.members.len() as f64;
        for (c, s) in self.centroid.iter_mut().zip(sums.iter()) {
            *c = s / n;
        }
        Ok(())
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn point_index(points: &[Point]) -> HashMap<u64, &Point> {
    points.iter().map(|p| (p.id, p)).collect()
}

/// `0` if `a` and `b` share any member, else the minimum pairwise distance
/// between a point of `a` and a point of `b`.
pub fn closest_points_distance(a: &Cluster, b: &Cluster, points: &HashMap<u64, &Point>) -> f64 {
    if a.members.iter().any(|id| b.members.contains(id)) {
        return 0.0;
    }
    let mut min = f64::INFINITY;
    for pa in &a.members {
        for pb in &b.members {
            let d = euclidean(&points[pa].coords, &points[pb].coords);
            if d < min {
                min = d;
            }
        }
    }
    min
}

/// Maximum pairwise distance between any two members of the same cluster;
/// `0` for clusters with fewer than two members.
pub fn intra_cluster_diameter(c: &Cluster, points: &HashMap<u64, &Point>) -> f64 {
    if c.members.len() < 2 {
        return 0.0;
    }
    let mut max = 0.0f64;
    for i in 0..c.members.len() {
        for j in (i + 1)..c.members.len() {
            let d = euclidean(&points[&c.members[i]].coords, &points[&c.members[j]].coords);
            if d > max {
                max = d;
            }
        }
    }
    max
}

fn mean_distance_point_to_cluster(
    p: &Point,
    c: &Cluster,
    points: &HashMap<u64, &Point>,
    exclude_self: bool,
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for id in &c.members {
        if exclude_self && *id == p.id {
            continue;
        }
        sum += euclidean(&p.coords, &points[id].coords);
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Dunn index, negated so "higher is better" applies uniformly:
/// `-(min inter-cluster closest-points distance) / (max intra-cluster diameter)`.
/// Degenerate (all-zero diameter) clusterings score `0.0`, mirroring
/// Silhouette's `max(a,b) == 0 -> s = 0` convention.
pub fn dunn_index(clusters: &[Cluster], points: &[Point]) -> f64 {
    let index = point_index(points);
    let max_intra = clusters
        .iter()
        .map(|c| intra_cluster_diameter(c, &index))
        .fold(0.0f64, f64::max);

    if max_intra == 0.0 {
        return 0.0;
    }

    let mut min_inter = f64::INFINITY;
    for i in 0..clusters.len() {
        for j in (i + 1)..clusters.len() {
            let d = closest_points_distance(&clusters[i], &clusters[j], &index);
            if d < min_inter {
                min_inter = d;
            }
        }
    }
    if !min_inter.is_finite() {
        return 0.0;
    }
    -(min_inter / max_intra)
}

/// Silhouette index: mean over clusters of the per-cluster mean of `s(p)`,
/// where `s(p) = (b - a) / max(a, b)`, `a` is the mean intra-cluster
/// distance and `b` the smallest mean distance to another cluster.
pub fn silhouette_index(clusters: &[Cluster], points: &[Point]) -> f64 {
    let index = point_index(points);
    let mut total = 0.0;
    let mut cluster_count = 0usize;

    for a_cluster in clusters {
        if a_cluster.members.is_empty() {
            continue;
        }
        let mut cluster_sum = 0.0;
        for id in &a_cluster.members {
            let p = index[id];
            let a = mean_distance_point_to_cluster(p, a_cluster, &index, true);
            let b = clusters
                .iter()
                .filter(|c| c.id != a_cluster.id && !c.members.is_empty())
                .map(|c| mean_distance_point_to_cluster(p, c, &index, false))
                .fold(f64::INFINITY, f64::min);

            let s = if !b.is_finite() {
                0.0
            } else if a.max(b) == 0.0 {
                0.0
            } else {
                (b - a) / a.max(b)
            };
            cluster_sum += s;
        }
        total += cluster_sum / a_cluster.members.len() as f64;
        cluster_count += 1;
    }

    if cluster_count == 0 {
        0.0
    } else {
        total / cluster_count as f64
    }
}

/// Cluster quality index used to pick `k` in adaptive clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIndex {
    Dunn,
    Silhouette,
}

impl QualityIndex {
    pub fn score(&self, clusters: &[Cluster], points: &[Point]) -> f64 {
        match self {
            QualityIndex::Dunn => dunn_index(clusters, points),
            QualityIndex::Silhouette => silhouette_index(clusters, points),
        }
    }

    pub fn parse(name: &str) -> Result<Self, ClusterError> {
        match name {
            "dunn" => Ok(QualityIndex::Dunn),
            "silhouette" => Ok(QualityIndex::Silhouette),
            other => Err(ClusterError::InvalidConfig(other.to_string())),
        }
    }
}

/// Runs Lloyd's algorithm to completion: assign-nearest, recompute means,
/// repeat until no assignment changes or `max_iter` passes elapse. Ties in
/// the nearest-centroid assignment prefer the lower cluster id. An empty
/// cluster is reseeded from a uniformly random point and the pass is marked
/// not converged.
fn lloyd(points: &[Point], k: usize, rng: &mut impl Rng, max_iter: usize) -> Result<Vec<Cluster>, ClusterError> {
    if points.is_empty() {
        return Err(ClusterError::EmptyInput);
    }
    let k = k.min(points.len()).max(1);
    let dim = points[0].coords.len();
    let index = point_index(points);

    // Evenly-spaced initial centroids, per the reference initClusters rule.
    let mut clusters: Vec<Cluster> = (0..k)
        .map(|i| {
            let pos = ((points.len() as f64 / k as f64) * i as f64).round() as usize;
            let pos = pos.min(points.len() - 1);
            Cluster {
                id: i,
                centroid: points[pos].coords.clone(),
                members: Vec::new(),
            }
        })
        .collect();

    let mut assignment: HashMap<u64, usize> = HashMap::new();

    for _ in 0..max_iter {
        let mut changed = false;

        for c in &mut clusters {
            c.members.clear();
        }
        for p in points {
            let mut best = 0usize;
            let mut best_dist = f64::INFINITY;
            for c in &clusters {
                let d = euclidean(&p.coords, &c.centroid);
                if d < best_dist {
                    best_dist = d;
                    best = c.id;
                }
            }
            clusters[best].members.push(p.id);
            if assignment.get(&p.id) != Some(&best) {
                changed = true;
            }
            assignment.insert(p.id, best);
        }

        let mut reseeded = false;
        for c in &mut clusters {
            if c.members.is_empty() {
                let random_point = &points[rng.gen_range(0..points.len())];
                c.centroid = random_point.coords.clone();
                reseeded = true;
            } else {
                c.update_means(&index)?;
            }
        }

        if !changed && !reseeded {
            break;
        }
        if dim != clusters[0].dim() {
            unreachable!("centroid dimension must track point dimension");
        }
    }

    // Sort descending by the (single) metric coordinate and reassign ids
    // to match sort order.
    clusters.sort_by(|a, b| b.centroid[0].partial_cmp(&a.centroid[0]).unwrap());
    for (new_id, c) in clusters.iter_mut().enumerate() {
        c.id = new_id;
    }
    Ok(clusters)
}

/// Fixed-`k` clustering: always produces exactly `min(k, |points|)` clusters.
pub struct FixedK {
    pub k: usize,
    pub ascending: bool,
    pub max_iter: usize,
}

impl FixedK {
    pub fn new(k: usize) -> Self {
        FixedK {
            k,
            ascending: false,
            max_iter: 100,
        }
    }

    pub fn cluster(&self, points: &[Point], rng: &mut impl Rng) -> Result<Vec<Cluster>, ClusterError> {
        let mut clusters = lloyd(points, self.k, rng, self.max_iter)?;
        if self.ascending {
            clusters.reverse();
            for (new_id, c) in clusters.iter_mut().enumerate() {
                c.id = new_id;
            }
        }
        Ok(clusters)
    }
}

/// Adaptive-`k` clustering: tries every `k` in `2..=min(max_k, |points|-1)`,
/// scores each with the configured quality index, and keeps the best
/// (ties broken toward the smaller `k`).
pub struct AdaptiveK {
    pub max_k: usize,
    pub index: QualityIndex,
    pub ascending: bool,
    pub max_iter: usize,
}

impl AdaptiveK {
    pub fn new(max_k: usize, index: QualityIndex) -> Self {
        AdaptiveK {
            max_k,
            index,
            ascending: false,
            max_iter: 100,
        }
    }

    pub fn cluster(&self, points: &[Point], rng: &mut impl Rng) -> Result<Vec<Cluster>, ClusterError> {
        if points.is_empty() {
            return Err(ClusterError::EmptyInput);
        }
        let upper = self.max_k.min(points.len().saturating_sub(1)).max(2);
        let lower = 2usize;

        if points.len() <= lower {
            let mut clusters = lloyd(points, points.len(), rng, self.max_iter)?;
            if self.ascending {
                clusters.reverse();
                for (new_id, c) in clusters.iter_mut().enumerate() {
                    c.id = new_id;
                }
            }
            return Ok(clusters);
        }

        let mut best: Option<(f64, Vec<Cluster>)> = None;
        for k in lower..=upper {
            let candidate = lloyd(points, k, rng, self.max_iter)?;
            let score = self.index.score(&candidate, points);
            let better = match &best {
                None => true,
                Some((best_score, _)) => score > *best_score,
            };
            if better {
                best = Some((score, candidate));
            }
        }

        let mut clusters = best.expect("loop runs at least once").1;
        if self.ascending {
            clusters.reverse();
            for (new_id, c) in clusters.iter_mut().enumerate() {
                c.id = new_id;
            }
        }
        Ok(clusters)
    }
}
