/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The supervisor's main state machine:
//! `Init -> (Sample -> Decide -> Commit -> Run -> Stop)* -> Teardown`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::cache::CacheDriver;
use crate::counters::CounterBackend;
use crate::error::LoopError;
use crate::launcher::ProcessLauncher;
use crate::policy::Policy;
use crate::scheduler::Scheduler;
use crate::task::{AllowedCpus, Task};

/// One full pass through Sample/Decide/Commit/Run/Stop.
pub struct StepReport {
    pub interval: u64,
    pub selected: Vec<u64>,
    pub clusters: usize,
    pub all_done: bool,
}

/// Owns every collaborator for one supervisor run and drives them through
/// the interval state machine.
pub struct ControlLoop<D, L, C> {
    pub driver: D,
    pub launcher: L,
    pub counters: C,
    pub policy: Policy,
    pub scheduler: Scheduler,
    pub tasks: Vec<Task>,
    pub num_cpus: usize,
    pub supervisor_cpus: AllowedCpus,
    pub interval_secs: f64,
    rng: StdRng,
    interval: u64,
    cancelled: Arc<AtomicBool>,
}

impl<D: CacheDriver, L: ProcessLauncher, C: CounterBackend> ControlLoop<D, L, C> {
    pub fn new(
        driver: D,
        launcher: L,
        counters: C,
        policy: Policy,
        scheduler: Scheduler,
        tasks: Vec<Task>,
        num_cpus: usize,
        supervisor_cpus: AllowedCpus,
        interval_secs: f64,
        seed: u64,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        ControlLoop {
            driver,
            launcher,
            counters,
            policy,
            scheduler,
            tasks,
            num_cpus,
            supervisor_cpus,
            interval_secs,
            rng: StdRng::seed_from_u64(seed),
            interval: 0,
            cancelled,
        }
    }

    /// Initializes the cache driver and launches every task, wiring up its
    /// counters. A task that fails to launch aborts the whole run.
    pub fn init(&mut self) -> Result<(), LoopError> {
        self.driver.init()?;
        let metric = self.policy.metric.clone();
        for task in &mut self.tasks {
            let pid = self
                .launcher
                .launch(task)
                .map_err(|e| LoopError::TaskLaunchFailed {
                    task: task.id,
                    reason: e.to_string(),
                })?;
            self.counters.setup_events(pid, std::slice::from_ref(&metric))?;
            self.counters.enable(pid)?;
            self.launcher.pause(pid)?;
            task.pid = Some(pid);
            debug!(task = task.id, pid, "task launched");
        }
        Ok(())
    }

    /// Runs intervals until every non-batch task has completed or
    /// cancellation is requested, sleeping `interval_secs` between passes.
    pub fn run(&mut self) -> Result<(), LoopError> {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("control loop cancelled");
                break;
            }
            let report = self.step()?;
            if report.all_done {
                info!("every task completed, stopping");
                break;
            }
        }
        self.teardown();
        Ok(())
    }

    /// One Sample -> Decide -> Commit -> Run -> Stop pass.
    pub fn step(&mut self) -> Result<StepReport, LoopError> {
        self.sample()?;
        let clusters = self
            .policy
            .apply(&mut self.driver, &mut self.tasks, self.interval, &mut self.rng)?
            .map(|c| c.len())
            .unwrap_or(0);
        let selected = self.commit_and_run()?;
        if self.interval_secs > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(self.interval_secs));
        }
        self.pause_all()?;

        let all_done = self
            .tasks
            .iter()
            .all(|t| t.batch || t.completed || t.instruction_limit_reached);

        let report = StepReport {
            interval: self.interval,
            selected,
            clusters,
            all_done,
        };
        self.interval += 1;
        Ok(report)
    }

    /// Pauses every still-running task, ending the Run phase so the next
    /// interval's Sample and Decide see a quiesced workload.
    fn pause_all(&mut self) -> Result<(), LoopError> {
        for task in &self.tasks {
            if task.completed {
                continue;
            }
            if let Some(pid) = task.pid {
                self.launcher.pause(pid)?;
            }
        }
        Ok(())
    }

    fn sample(&mut self) -> Result<(), LoopError> {
        for task in &mut self.tasks {
            if task.completed {
                continue;
            }
            let Some(pid) = task.pid else { continue };
            if self.launcher.poll_exited(pid)? {
                task.completed = true;
                let _ = self.counters.teardown(pid);
                info!(task = task.id, pid, "task exited");
                continue;
            }
            match self.counters.read(pid) {
                Ok(stats) => {
                    if !stats.is_plausible() {
                        warn!(task = task.id, pid, "implausible stats sample");
                    }
                    task.record_sample(&stats);
                    if let Some(limit) = task.max_instructions {
                        if task.stats_total.instructions >= limit {
                            task.instruction_limit_reached = true;
                        }
                    }
                }
                Err(LoopError::TaskGone { pid: gone_pid }) => {
                    task.completed = true;
                    let _ = self.counters.teardown(gone_pid);
                    warn!(task = task.id, pid = gone_pid, "task gone mid-sample");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn commit_and_run(&mut self) -> Result<Vec<u64>, LoopError> {
        let runnable: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.is_runnable())
            .cloned()
            .collect();
        if runnable.is_empty() {
            return Ok(Vec::new());
        }

        let schedule = self
            .scheduler
            .apply(&runnable, self.num_cpus, self.supervisor_cpus, &mut self.rng)?;

        let mut used_cpus: Vec<u32> = Vec::new();
        for id in &schedule.selected {
            let affinity = schedule.affinities.get(id).copied().unwrap_or(AllowedCpus::Any);
            let cpu = (0..self.num_cpus as u32)
                .find(|c| affinity.allows_cpu(*c) && !used_cpus.contains(c));
            if let Some(cpu) = cpu {
                used_cpus.push(cpu);
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == *id) {
                    task.assigned_cpu = Some(cpu);
                    let cos = task.cos;
                    if let Some(pid) = task.pid {
                        self.launcher.set_affinity(pid, cpu)?;
                        self.launcher.resume(pid)?;
                    }
                    self.driver.assign_cpu(cos, cpu)?;
                }
            }
        }

        for task in &mut self.tasks {
            if task.is_runnable() && !schedule.selected.contains(&task.id) {
                if let Some(pid) = task.pid {
                    self.launcher.pause(pid)?;
                }
            }
        }

        Ok(schedule.selected)
    }

    /// Best-effort cleanup: kill every task still alive and tear down its
    /// counters. Errors are logged, never propagated — teardown always
    /// completes.
    pub fn teardown(&mut self) {
        for task in &self.tasks {
            if let Some(pid) = task.pid {
                if let Err(e) = self.counters.teardown(pid) {
                    warn!(pid, error = %e, "counter teardown failed");
                }
                if !task.completed {
                    if let Err(e) = self.launcher.kill(pid) {
                        warn!(pid, error = %e, "failed to kill task during teardown");
                    }
                }
            }
        }
        if let Err(e) = self.driver.reset() {
            warn!(error = %e, "cache driver reset failed during teardown");
        }
    }
}
