/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Workload task representation.
//!
//! A [`Task`] carries an immutable identity (assigned once at construction)
//! plus the mutable runtime state the control loop updates every interval:
//! process id, assigned CPU, current class-of-service, and accumulated
//! statistics. A task is owned by exactly one [`crate::control_loop::ControlLoop`]
//! for its lifetime.

use crate::stats::Stats;

/// CPU affinity constraint expressed as a bitmask, bit N meaning CPU N is
/// allowed.
///
/// `Any` stands for "every CPU the supervisor itself is allowed to use" and
/// intersects with a concrete mask as the identity element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedCpus {
    Any,
    Mask(u64),
}

impl Default for AllowedCpus {
    fn default() -> Self {
        AllowedCpus::Any
    }
}

impl AllowedCpus {
    pub fn allows_cpu(&self, cpu: u32) -> bool {
        match self {
            AllowedCpus::Any => true,
            AllowedCpus::Mask(mask) => cpu < 64 && (mask >> cpu) & 1 == 1,
        }
    }

    /// Intersection of two affinity constraints, per the Schedule invariant
    /// `task.allowed_cpus ∩ supervisor.allowed_cpus`.
    pub fn intersect(&self, other: &AllowedCpus) -> AllowedCpus {
        match (self, other) {
            (AllowedCpus::Any, x) | (x, AllowedCpus::Any) => *x,
            (AllowedCpus::Mask(a), AllowedCpus::Mask(b)) => AllowedCpus::Mask(a & b),
        }
    }

    /// `true` when the affinity admits no CPU at all — the fatal configuration
    /// error the Schedule invariant calls out.
    pub fn is_empty(&self) -> bool {
        matches!(self, AllowedCpus::Mask(0))
    }
}

/// A single workload under supervision.
///
/// Identity fields (`id`, `cmd`, `executable`) are set at construction and
/// never change. Everything else is mutated in place by the control loop's
/// Sample/Commit phases.
#[derive(Debug, Clone)]
pub struct Task {
    /// Monotonically assigned, unique within one supervisor run.
    pub id: u64,
    /// Full launch command as given in configuration.
    pub cmd: String,
    /// Basename of the command's executable, used for logging.
    pub executable: String,

    /// Process id once launched. `None` before Init completes for this task.
    pub pid: Option<i32>,
    /// CPU the scheduler most recently bound this task to.
    pub assigned_cpu: Option<u32>,
    /// Class-of-service the policy most recently assigned this task to.
    /// Starts at 0 (the default COS) until the first policy application.
    pub cos: usize,

    /// CPU affinity as configured (independent of what the scheduler picks
    /// each interval — this is the ceiling the scheduler intersects against).
    pub allowed_cpus: AllowedCpus,

    /// Statistics accumulated since the last policy reset (cleared whenever
    /// the policy recomputes clusters against "fresh" data).
    pub stats_interval: Stats,
    /// Lifetime statistics, never cleared.
    pub stats_total: Stats,

    /// Batch tasks are excluded from the Stop phase's completion check.
    pub batch: bool,
    /// Remaining instruction budget; `None` means unbounded.
    pub max_instructions: Option<u64>,
    /// Set once `max_instructions` (if any) has been exhausted.
    pub instruction_limit_reached: bool,
    /// Set once the task has exited, whether cleanly or via `TaskGone`.
    pub completed: bool,
}

impl Task {
    pub fn new(id: u64, cmd: impl Into<String>) -> Self {
        let cmd = cmd.into();
        let executable = cmd
            .split_whitespace()
            .next()
            .and_then(|first| first.rsplit('/').next())
            .unwrap_or(&cmd)
            .to_string();
        Task {
            id,
            cmd,
            executable,
            pid: None,
            assigned_cpu: None,
            cos: 0,
            allowed_cpus: AllowedCpus::Any,
            stats_interval: Stats::default(),
            stats_total: Stats::default(),
            batch: false,
            max_instructions: None,
            instruction_limit_reached: false,
            completed: false,
        }
    }

    /// Non-batch tasks that have either completed or exhausted their
    /// instruction budget no longer participate in clustering or scheduling.
    pub fn is_runnable(&self) -> bool {
        !self.completed && !(self.instruction_limit_reached && !self.batch)
    }

    /// Merge a freshly sampled window into both the interval and lifetime
    /// statistics, per [`Stats`]'s aggregation rules.
    pub fn record_sample(&mut self, sample: &Stats) {
        self.stats_interval.merge(sample);
        self.stats_total.merge(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_extracts_executable_basename() {
        let t = Task::new(1, "/usr/bin/stress-ng --cpu 1");
        assert_eq!(t.executable, "stress-ng");
    }

    #[test]
    fn new_falls_back_to_full_cmd_when_no_slash() {
        let t = Task::new(1, "yes");
        assert_eq!(t.executable, "yes");
    }

    #[test]
    fn allowed_cpus_any_intersect_mask_yields_mask() {
        let a = AllowedCpus::Any;
        let b = AllowedCpus::Mask(0b0110);
        assert_eq!(a.intersect(&b), AllowedCpus::Mask(0b0110));
        assert_eq!(b.intersect(&a), AllowedCpus::Mask(0b0110));
    }

    #[test]
    fn allowed_cpus_mask_intersect_mask_is_bitwise_and() {
        let a = AllowedCpus::Mask(0b1100);
        let b = AllowedCpus::Mask(0b0110);
        assert_eq!(a.intersect(&b), AllowedCpus::Mask(0b0100));
    }

    #[test]
    fn allowed_cpus_disjoint_masks_intersect_to_empty() {
        let a = AllowedCpus::Mask(0b0001);
        let b = AllowedCpus::Mask(0b0010);
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn is_runnable_excludes_completed_tasks() {
        let mut t = Task::new(1, "cmd");
        assert!(t.is_runnable());
        t.completed = true;
        assert!(!t.is_runnable());
    }

    #[test]
    fn is_runnable_batch_task_ignores_instruction_limit() {
        let mut t = Task::new(1, "cmd");
        t.batch = true;
        t.instruction_limit_reached = true;
        assert!(t.is_runnable());
    }

    #[test]
    fn is_runnable_non_batch_task_stops_at_instruction_limit() {
        let mut t = Task::new(1, "cmd");
        t.instruction_limit_reached = true;
        assert!(!t.is_runnable());
    }
}
