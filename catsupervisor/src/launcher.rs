/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Process lifecycle control: launching, pausing, and affinity-pinning the
//! supervised workloads.
//!
//! No production implementation ships in this crate — spawning and
//! controlling arbitrary user commands is host-environment-specific and is
//! left to the integrator. [`ProcessLauncher`] is the seam the control loop
//! is written against; a real implementation would shell out via
//! [`std::process::Command`] and reach for the `nix` crate's
//! `nix::sys::signal`/`nix::sched` wrappers for pause/resume/affinity,
//! the way this crate's other OS-facing code favors an ecosystem crate
//! over hand-rolled `libc` calls. Neither `nix` nor `libc` is a dependency
//! of this crate itself, since no code here calls them.

use crate::error::LoopError;
use crate::task::Task;

/// Contract the control loop uses to launch and control supervised processes.
pub trait ProcessLauncher {
    /// Spawn `task.cmd` and return its pid.
    fn launch(&mut self, task: &Task) -> Result<i32, LoopError>;

    /// Stop scheduling a process without killing it (`SIGSTOP` on Linux).
    fn pause(&mut self, pid: i32) -> Result<(), LoopError>;

    /// Resume a previously paused process (`SIGCONT` on Linux).
    fn resume(&mut self, pid: i32) -> Result<(), LoopError>;

    /// Pin a process to a single CPU (`sched_setaffinity` on Linux).
    fn set_affinity(&mut self, pid: i32, cpu: u32) -> Result<(), LoopError>;

    /// Terminate a process unconditionally (`SIGKILL` on Linux).
    fn kill(&mut self, pid: i32) -> Result<(), LoopError>;

    /// Non-blocking check for whether `pid` has already exited.
    fn poll_exited(&mut self, pid: i32) -> Result<bool, LoopError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::{HashMap, HashSet};

    /// In-memory [`ProcessLauncher`] for tests: hands out sequential fake
    /// pids and lets the test script which ones have "exited".
    #[derive(Default)]
    pub struct FakeLauncher {
        pub next_pid: i32,
        pub paused: HashSet<i32>,
        pub affinity: HashMap<i32, u32>,
        pub exited: HashSet<i32>,
        pub killed: HashSet<i32>,
    }

    impl FakeLauncher {
        pub fn new() -> Self {
            FakeLauncher {
                next_pid: 100,
                ..Default::default()
            }
        }
    }

    impl ProcessLauncher for FakeLauncher {
        fn launch(&mut self, _task: &Task) -> Result<i32, LoopError> {
            let pid = self.next_pid;
            self.next_pid += 1;
            Ok(pid)
        }

        fn pause(&mut self, pid: i32) -> Result<(), LoopError> {
            self.paused.insert(pid);
            Ok(())
        }

        fn resume(&mut self, pid: i32) -> Result<(), LoopError> {
            self.paused.remove(&pid);
            Ok(())
        }

        fn set_affinity(&mut self, pid: i32, cpu: u32) -> Result<(), LoopError> {
            self.affinity.insert(pid, cpu);
            Ok(())
        }

        fn kill(&mut self, pid: i32) -> Result<(), LoopError> {
            self.killed.insert(pid);
            Ok(())
        }

        fn poll_exited(&mut self, pid: i32) -> Result<bool, LoopError> {
            Ok(self.exited.contains(&pid))
        }
    }

    #[test]
    fn fake_launcher_issues_sequential_pids() {
        let mut l = FakeLauncher::new();
        let t = Task::new(1, "cmd");
        let p1 = l.launch(&t).unwrap();
        let p2 = l.launch(&t).unwrap();
        assert_eq!(p2, p1 + 1);
    }

    #[test]
    fn fake_launcher_tracks_pause_and_resume() {
        let mut l = FakeLauncher::new();
        l.pause(5).unwrap();
        assert!(l.paused.contains(&5));
        l.resume(5).unwrap();
        assert!(!l.paused.contains(&5));
    }
}
