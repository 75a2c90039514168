/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-interval task selection and CPU-affinity commitment.

use std::collections::{HashMap, VecDeque};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::clustering::{AdaptiveK, Point, QualityIndex};
use crate::error::SchedulerError;
use crate::task::{AllowedCpus, Task};

const FAIRNESS_WEIGHTS: [u32; 4] = [1, 2, 4, 8];
const FAIRNESS_WINDOW: usize = 5;

/// Result of one scheduler invocation: which tasks run this interval and
/// the CPU-affinity mask each (scheduled or not) is bound to.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub selected: Vec<u64>,
    pub affinities: HashMap<u64, AllowedCpus>,
}

/// Rolling per-task fairness bookkeeping, carried across intervals.
#[derive(Debug, Default)]
pub struct FairnessState {
    history: HashMap<u64, VecDeque<f64>>,
    scheduled_last: HashMap<u64, bool>,
}

impl FairnessState {
    fn credit(&mut self, task: &Task, stall_metric: &str) -> f64 {
        let was_scheduled = self.scheduled_last.get(&task.id).copied().unwrap_or(false);
        let sample = if was_scheduled {
            task.stats_interval
                .event(stall_metric)
                .map(|v| v as f64)
                .unwrap_or(0.0)
        } else {
            task.stats_interval.cycles as f64
        };

        let window = self.history.entry(task.id).or_default();
        window.push_back(sample);
        while window.len() > FAIRNESS_WINDOW {
            window.pop_front();
        }
        window.iter().sum::<f64>() / window.len() as f64
    }
}

/// Chooses which tasks run this interval. Three variants, selected at
/// construction.
pub enum Scheduler {
    PassThrough,
    UniformRandom,
    Fairness {
        stall_metric: String,
        state: FairnessState,
    },
}

impl Scheduler {
    pub fn fairness(stall_metric: impl Into<String>) -> Self {
        Scheduler::Fairness {
            stall_metric: stall_metric.into(),
            state: FairnessState::default(),
        }
    }

    /// Choose the subset of `tasks` to run this interval and the
    /// CPU-affinity mask for every task (scheduled or not).
    pub fn apply(
        &mut self,
        tasks: &[Task],
        num_cpus: usize,
        supervisor_cpus: AllowedCpus,
        rng: &mut impl Rng,
    ) -> Result<Schedule, SchedulerError> {
        let mut affinities = HashMap::with_capacity(tasks.len());
        for task in tasks {
            let affinity = task.allowed_cpus.intersect(&supervisor_cpus);
            if affinity.is_empty() {
                return Err(SchedulerError::EmptyAffinity { task: task.id });
            }
            affinities.insert(task.id, affinity);
        }

        let selected = match self {
            Scheduler::PassThrough => tasks.iter().map(|t| t.id).collect(),
            Scheduler::UniformRandom => {
                if tasks.len() <= num_cpus {
                    tasks.iter().map(|t| t.id).collect()
                } else {
                    let mut ids: Vec<u64> = tasks.iter().map(|t| t.id).collect();
                    ids.shuffle(rng);
                    ids.truncate(num_cpus);
                    ids
                }
            }
            Scheduler::Fairness {
                stall_metric,
                state,
            } => {
                if tasks.len() <= num_cpus {
                    tasks.iter().map(|t| t.id).collect()
                } else {
                    let credits: Vec<(u64, f64)> = tasks
                        .iter()
                        .map(|t| (t.id, state.credit(t, stall_metric)))
                        .collect();

                    let points: Vec<Point> = credits
                        .iter()
                        .map(|(id, credit)| Point::new(*id, vec![*credit]))
                        .collect();

                    let clustering = AdaptiveK::new(FAIRNESS_WEIGHTS.len(), QualityIndex::Dunn);
                    let clusters = clustering.cluster(&points, rng)?;
                    let n = clusters.len();

                    let mut ballot: Vec<u64> = Vec::new();
                    for (i, cluster) in clusters.iter().enumerate() {
                        // clusters are sorted descending by badness; rank in
                        // ascending-badness order picks the weight.
                        let rank = n - 1 - i;
                        let weight = FAIRNESS_WEIGHTS[rank];
                        for _ in 0..weight {
                            ballot.extend(cluster.members.iter().copied());
                        }
                    }

                    draw_without_replacement(&mut ballot, num_cpus.min(tasks.len()), rng)
                }
            }
        };

        if let Scheduler::Fairness { state, .. } = self {
            for task in tasks {
                state
                    .scheduled_last
                    .insert(task.id, selected.contains(&task.id));
            }
        }

        Ok(Schedule {
            selected,
            affinities,
        })
    }
}

/// Draw `count` distinct ids from a weighted ballot without replacement: a
/// single draw picks a uniformly random ballot entry, then every remaining
/// entry for that id is removed before the next draw.
fn draw_without_replacement(ballot: &mut Vec<u64>, count: usize, rng: &mut impl Rng) -> Vec<u64> {
    let mut drawn = Vec::with_capacity(count);
    while !ballot.is_empty() && drawn.len() < count {
        let idx = rng.gen_range(0..ballot.len());
        let id = ballot[idx];
        drawn.push(id);
        ballot.retain(|x| *x != id);
    }
    drawn
}
