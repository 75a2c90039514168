/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Hardware performance counter access.
//!
//! No production implementation ships in this crate — reading PMU events
//! (via `perf_event_open` or a vendor library) is hardware- and
//! kernel-version-specific and is left to the integrator.
//! [`CounterBackend`] is the seam the control loop samples through each
//! interval.

use crate::error::LoopError;
use crate::stats::Stats;

/// Contract the control loop uses to set up and sample per-task counters.
pub trait CounterBackend {
    /// Program the named events for `pid`. Called once, right after launch.
    fn setup_events(&mut self, pid: i32, events: &[String]) -> Result<(), LoopError>;

    /// Start counting.
    fn enable(&mut self, pid: i32) -> Result<(), LoopError>;

    /// Stop counting without discarding accumulated counts.
    fn disable(&mut self, pid: i32) -> Result<(), LoopError>;

    /// Read and reset the interval window for `pid`. Returns
    /// [`LoopError::TaskGone`] if the process has already exited.
    fn read(&mut self, pid: i32) -> Result<Stats, LoopError>;

    /// Release any resources held for `pid` (called from Teardown, and
    /// best-effort when a task is discovered gone).
    fn teardown(&mut self, pid: i32) -> Result<(), LoopError>;
}
