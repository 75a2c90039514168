/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Crate-wide typed error kinds.
//!
//! Each component boundary gets its own `thiserror` enum rather than one flat
//! error type, so callers can match on the variants relevant to the API they
//! called instead of a catch-all. `main` is the only place that reaches for
//! `anyhow` to attach a final human-readable message before exiting non-zero.

use std::path::PathBuf;

/// Errors raised by the cache-allocation driver (`cache` module).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache driver not initialized")]
    NotInitialized,

    #[error("driver I/O failure at {path}: {source}")]
    DriverIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid ways mask {mask:#x} for cos {cos}: {reason}")]
    InvalidMask {
        cos: usize,
        mask: u64,
        reason: &'static str,
    },

    #[error("cos index {cos} is out of range (max_cos = {max_cos})")]
    CosOutOfRange { cos: usize, max_cos: usize },
}

/// Errors raised by the clustering component.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("clustering called with an empty task list")]
    EmptyInput,

    #[error("point dimension {point_dim} does not match cluster dimension {cluster_dim}")]
    DimensionMismatch {
        point_dim: usize,
        cluster_dim: usize,
    },

    #[error("unknown cluster quality index {0:?}")]
    InvalidConfig(String),
}

/// Errors raised by the way-distributor component.
#[derive(Debug, thiserror::Error)]
pub enum DistributorError {
    #[error("unknown way-distribution model {0:?}")]
    InvalidConfig(String),

    #[error("cluster count {clusters} exceeds max_cos {max_cos}")]
    TooManyClusters { clusters: usize, max_cos: usize },
}

/// Errors raised by the scheduler component.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("required metric {0:?} missing from task stats")]
    MetricMissing(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("cpu affinity intersection for task {task} is empty")]
    EmptyAffinity { task: u64 },
}

/// Errors raised by the control loop and its external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Distributor(#[from] DistributorError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("failed to launch task {task}: {reason}")]
    TaskLaunchFailed { task: u64, reason: String },

    #[error("task {pid} exited unexpectedly")]
    TaskGone { pid: i32 },
}

/// Errors raised while loading and validating the YAML configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cos 0 (the default class of service) must not declare a cpus mask")]
    DefaultCosHasCpuMask,

    #[error("task {task_index} references unknown cos {cos}")]
    UnknownCos { task_index: usize, cos: usize },

    #[error("unknown cat_policy.kind {0:?}")]
    UnknownPolicyKind(String),

    #[error("unknown clustering.kind {0:?}")]
    UnknownClusteringKind(String),

    #[error("unknown way-distribution model {0:?}")]
    UnknownModel(String),

    #[error("unknown sched.kind {0:?}")]
    UnknownSchedKind(String),

    #[error("unknown eval_index {0:?}")]
    UnknownEvalIndex(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_error_display_includes_path_and_source() {
        let err = CacheError::DriverIo {
            path: PathBuf::from("/sys/fs/resctrl/1/schemata"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("schemata"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn config_error_display_names_the_offending_cos() {
        let err = ConfigError::UnknownCos {
            task_index: 2,
            cos: 7,
        };
        assert_eq!(err.to_string(), "task 2 references unknown cos 7");
    }

    #[test]
    fn loop_error_wraps_cache_error_transparently() {
        let cache_err = CacheError::NotInitialized;
        let loop_err: LoopError = cache_err.into();
        assert_eq!(loop_err.to_string(), "cache driver not initialized");
    }

    #[test]
    fn cluster_error_display_names_the_dimension_mismatch() {
        let err = ClusterError::DimensionMismatch {
            point_dim: 2,
            cluster_dim: 1,
        };
        assert_eq!(
            err.to_string(),
            "point dimension 2 does not match cluster dimension 1"
        );
    }

    #[test]
    fn distributor_error_display_names_the_overflow() {
        let err = DistributorError::TooManyClusters {
            clusters: 5,
            max_cos: 4,
        };
        assert_eq!(err.to_string(), "cluster count 5 exceeds max_cos 4");
    }

    #[test]
    fn scheduler_error_display_names_the_empty_affinity_task() {
        let err = SchedulerError::EmptyAffinity { task: 7 };
        assert_eq!(err.to_string(), "cpu affinity intersection for task 7 is empty");
    }
}
