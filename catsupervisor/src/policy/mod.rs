/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Glue tying clustering, way-distribution, and the cache driver together.

use rand::Rng;
use tracing::info;

use crate::cache::CacheDriver;
use crate::clustering::{AdaptiveK, Cluster, FixedK, Point};
use crate::distributor::WayDistributor;
use crate::error::{LoopError, SchedulerError};
use crate::task::Task;

/// Which clustering strategy a [`Policy`] drives.
pub enum ClusteringKind {
    Fixed(FixedK),
    Adaptive(AdaptiveK),
}

impl ClusteringKind {
    fn cluster(&self, points: &[Point], rng: &mut impl Rng) -> Result<Vec<Cluster>, crate::error::ClusterError> {
        match self {
            ClusteringKind::Fixed(f) => f.cluster(points, rng),
            ClusteringKind::Adaptive(a) => a.cluster(points, rng),
        }
    }
}

/// Every `every` control-loop intervals, clusters non-completed tasks by a
/// configured metric and commits the resulting way masks and task↔COS
/// assignments to the cache driver.
pub struct Policy {
    pub clustering: ClusteringKind,
    pub distributor: WayDistributor,
    pub metric: String,
    pub every: u32,
}

impl Policy {
    /// Runs one policy decision if `interval` is due (`interval % every == 0`);
    /// otherwise a no-op. Returns the clusters committed, if any, for logging.
    pub fn apply(
        &self,
        driver: &mut dyn CacheDriver,
        tasks: &mut [Task],
        interval: u64,
        rng: &mut impl Rng,
    ) -> Result<Option<Vec<Cluster>>, LoopError> {
        if self.every == 0 || interval % self.every as u64 != 0 {
            return Ok(None);
        }

        let mut points = Vec::new();
        for task in tasks.iter() {
            if !task.is_runnable() {
                continue;
            }
            let Some(value) = task.stats_interval.event(&self.metric) else {
                if task.stats_total.cycles == 0 {
                    // No counter window has landed for this task yet (first
                    // interval); not an error, just nothing to cluster on.
                    continue;
                }
                return Err(SchedulerError::MetricMissing(self.metric.clone()).into());
            };
            points.push(Point::new(task.id, vec![value as f64]));
        }

        if points.is_empty() {
            return Ok(None);
        }

        let info = driver.info()?;

        if points.len() == 1 {
            let pid = tasks
                .iter()
                .find(|t| t.id == points[0].id)
                .and_then(|t| t.pid);
            driver.set_ways(0, info.cbm_mask)?;
            if let Some(pid) = pid {
                driver.assign_task(0, pid)?;
            }
            if let Some(task) = tasks.iter_mut().find(|t| t.id == points[0].id) {
                task.cos = 0;
            }
            let singleton = Cluster {
                id: 0,
                centroid: points[0].coords.clone(),
                members: vec![points[0].id],
            };
            return Ok(Some(vec![singleton]));
        }

        let clusters = self.clustering.cluster(&points, rng)?;
        let masks = self.distributor.distribute(&clusters, &info)?;

        for (i, mask) in masks.iter().enumerate() {
            driver.set_ways(i, *mask)?;
        }
        for cluster in &clusters {
            for &member_id in &cluster.members {
                let pid = tasks.iter().find(|t| t.id == member_id).and_then(|t| t.pid);
                if let Some(pid) = pid {
                    driver.assign_task(cluster.id, pid)?;
                }
                if let Some(task) = tasks.iter_mut().find(|t| t.id == member_id) {
                    task.cos = cluster.id;
                }
            }
        }

        info!(interval, clusters = clusters.len(), "policy committed");
        Ok(Some(clusters))
    }
}
