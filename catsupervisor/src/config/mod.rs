/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! YAML configuration loading and validation.
//!
//! The expected YAML structure is:
//! ```yaml
//! cos:
//!   - schemata: 0xFFFFF        # cos 0, the default — must not carry cpus
//!   - schemata: 0x0000F
//!     cpus: 0x3
//! tasks:
//!   - cmd: "stress-ng --cpu 1"
//!     cpus: [2, 3]
//!     cos: 1
//!     batch: false
//!     max_instructions: 2000000000
//! cat_policy:
//!   every: 4
//!   clustering:
//!     kind: adaptive
//!     max_k: 4
//!     metric: cycle_activity.stalls_total
//!     eval_index: dunn
//!     ascending: false
//!   kind: parametric
//!   model: linear
//!   alternate_sides: false
//! sched:
//!   kind: fair
//!   seed: 42
//!   stall_metric: cycle_activity.stalls_total
//! ```

use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::clustering::{AdaptiveK, FixedK, QualityIndex};
use crate::distributor::{ParametricModel, WayDistributor};
use crate::error::ConfigError;
use crate::policy::{ClusteringKind, Policy};
use crate::scheduler::Scheduler;
use crate::task::{AllowedCpus, Task};

/// A mask or count accepted as either a YAML integer or a `"0x..."` string.
#[derive(Debug, Clone, Copy)]
struct HexOrDec(u64);

impl<'de> Deserialize<'de> for HexOrDec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(u64),
            Str(String),
        }
        let value = match Repr::deserialize(deserializer)? {
            Repr::Int(n) => n,
            Repr::Str(s) => {
                let trimmed = s.trim();
                if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                    u64::from_str_radix(hex, 16).map_err(serde::de::Error::custom)?
                } else {
                    trimmed.parse::<u64>().map_err(serde::de::Error::custom)?
                }
            }
        };
        Ok(HexOrDec(value))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CosEntry {
    schemata: HexOrDec,
    cpus: Option<HexOrDec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskEntry {
    cmd: String,
    cpus: Option<Vec<u32>>,
    cos: Option<usize>,
    #[serde(default)]
    batch: bool,
    max_instructions: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClusteringEntry {
    kind: String,
    k: Option<usize>,
    max_k: Option<usize>,
    metric: String,
    eval_index: Option<String>,
    #[serde(default)]
    ascending: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatPolicyEntry {
    kind: String,
    every: u32,
    clustering: ClusteringEntry,
    model: Option<String>,
    #[serde(default)]
    alternate_sides: bool,
    masks: Option<Vec<HexOrDec>>,
    n: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchedEntry {
    kind: String,
    seed: Option<u64>,
    stall_metric: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    cos: Vec<CosEntry>,
    tasks: Vec<TaskEntry>,
    cat_policy: CatPolicyEntry,
    sched: SchedEntry,
}

/// One entry of the `cos` configuration list after validation.
#[derive(Debug, Clone)]
pub struct CosConfig {
    pub schemata: u64,
    pub cpus: Option<u64>,
}

/// One entry of the `tasks` configuration list after validation.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub cmd: String,
    pub cpus: Option<Vec<u32>>,
    pub cos: Option<usize>,
    pub batch: bool,
    pub max_instructions: Option<u64>,
}

/// Parsed, validated clustering configuration.
#[derive(Debug, Clone)]
pub enum ClusteringConfig {
    Fixed {
        k: usize,
        metric: String,
        ascending: bool,
    },
    Adaptive {
        max_k: usize,
        index: QualityIndex,
        metric: String,
        ascending: bool,
    },
}

impl ClusteringConfig {
    pub fn metric(&self) -> &str {
        match self {
            ClusteringConfig::Fixed { metric, .. } => metric,
            ClusteringConfig::Adaptive { metric, .. } => metric,
        }
    }
}

/// Parsed, validated way-distribution configuration.
#[derive(Debug, Clone)]
pub enum DistributorConfig {
    Static { masks: Vec<u64> },
    DivideN { n: usize },
    Parametric { model: ParametricModel, alternate_sides: bool },
}

/// Parsed, validated `cat_policy` block.
#[derive(Debug, Clone)]
pub struct CatPolicyConfig {
    pub every: u32,
    pub clustering: ClusteringConfig,
    pub distributor: DistributorConfig,
}

/// Parsed, validated `sched` block.
#[derive(Debug, Clone)]
pub struct SchedConfig {
    pub kind: SchedKind,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub enum SchedKind {
    Pass,
    Random,
    Fair { stall_metric: String },
}

/// Fully parsed and cross-validated supervisor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub cos: Vec<CosConfig>,
    pub tasks: Vec<TaskConfig>,
    pub cat_policy: CatPolicyConfig,
    pub sched: SchedConfig,
}

impl Config {
    /// Load, parse, and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        if let Some(first) = file.cos.first() {
            if first.cpus.is_some() {
                return Err(ConfigError::DefaultCosHasCpuMask);
            }
        }
        let cos: Vec<CosConfig> = file
            .cos
            .iter()
            .map(|c| CosConfig {
                schemata: c.schemata.0,
                cpus: c.cpus.map(|m| m.0),
            })
            .collect();

        for (task_index, task) in file.tasks.iter().enumerate() {
            if let Some(c) = task.cos {
                if c >= cos.len() {
                    return Err(ConfigError::UnknownCos {
                        task_index,
                        cos: c,
                    });
                }
            }
        }
        let tasks: Vec<TaskConfig> = file
            .tasks
            .into_iter()
            .map(|t| TaskConfig {
                cmd: t.cmd,
                cpus: t.cpus,
                cos: t.cos,
                batch: t.batch,
                max_instructions: t.max_instructions,
            })
            .collect();

        let clustering_kind = file.cat_policy.clustering.kind.as_str();
        let clustering = match clustering_kind {
            "fixed" => ClusteringConfig::Fixed {
                k: file.cat_policy.clustering.k.unwrap_or(2),
                metric: file.cat_policy.clustering.metric.clone(),
                ascending: file.cat_policy.clustering.ascending,
            },
            "adaptive" => {
                let eval_name = file
                    .cat_policy
                    .clustering
                    .eval_index
                    .as_deref()
                    .unwrap_or("dunn");
                let index = QualityIndex::parse(eval_name)
                    .map_err(|_| ConfigError::UnknownEvalIndex(eval_name.to_string()))?;
                ClusteringConfig::Adaptive {
                    max_k: file.cat_policy.clustering.max_k.unwrap_or(4),
                    index,
                    metric: file.cat_policy.clustering.metric.clone(),
                    ascending: file.cat_policy.clustering.ascending,
                }
            }
            other => return Err(ConfigError::UnknownClusteringKind(other.to_string())),
        };

        let distributor = match file.cat_policy.kind.as_str() {
            "static" => DistributorConfig::Static {
                masks: file
                    .cat_policy
                    .masks
                    .unwrap_or_default()
                    .into_iter()
                    .map(|m| m.0)
                    .collect(),
            },
            "divide_n" => DistributorConfig::DivideN {
                n: file.cat_policy.n.unwrap_or(1),
            },
            "parametric" => {
                let model_name = file.cat_policy.model.as_deref().unwrap_or("linear");
                let model = ParametricModel::parse(model_name)
                    .map_err(|_| ConfigError::UnknownModel(model_name.to_string()))?;
                DistributorConfig::Parametric {
                    model,
                    alternate_sides: file.cat_policy.alternate_sides,
                }
            }
            other => return Err(ConfigError::UnknownPolicyKind(other.to_string())),
        };

        let cat_policy = CatPolicyConfig {
            every: file.cat_policy.every,
            clustering,
            distributor,
        };

        let sched_kind = match file.sched.kind.as_str() {
            "pass" => SchedKind::Pass,
            "random" => SchedKind::Random,
            "fair" => SchedKind::Fair {
                stall_metric: file
                    .sched
                    .stall_metric
                    .clone()
                    .unwrap_or_else(|| cat_policy.clustering.metric().to_string()),
            },
            other => return Err(ConfigError::UnknownSchedKind(other.to_string())),
        };
        let sched = SchedConfig {
            kind: sched_kind,
            seed: file.sched.seed.unwrap_or(0),
        };

        Ok(Config {
            cos,
            tasks,
            cat_policy,
            sched,
        })
    }

    /// Build the runtime [`Policy`] this configuration describes.
    pub fn build_policy(&self) -> Policy {
        let clustering = match &self.cat_policy.clustering {
            ClusteringConfig::Fixed { k, ascending, .. } => ClusteringKind::Fixed(FixedK {
                k: *k,
                ascending: *ascending,
                max_iter: 100,
            }),
            ClusteringConfig::Adaptive {
                max_k,
                index,
                ascending,
                ..
            } => ClusteringKind::Adaptive(AdaptiveK {
                max_k: *max_k,
                index: *index,
                ascending: *ascending,
                max_iter: 100,
            }),
        };
        let distributor = match &self.cat_policy.distributor {
            DistributorConfig::Static { masks } => WayDistributor::Static {
                masks: masks.clone(),
            },
            DistributorConfig::DivideN { n } => WayDistributor::DivideN { n: *n },
            DistributorConfig::Parametric {
                model,
                alternate_sides,
            } => WayDistributor::Parametric {
                model: *model,
                alternate_sides: *alternate_sides,
            },
        };
        Policy {
            clustering,
            distributor,
            metric: self.cat_policy.clustering.metric().to_string(),
            every: self.cat_policy.every,
        }
    }

    /// Build the runtime [`Scheduler`] this configuration describes.
    pub fn build_scheduler(&self) -> Scheduler {
        match &self.sched.kind {
            SchedKind::Pass => Scheduler::PassThrough,
            SchedKind::Random => Scheduler::UniformRandom,
            SchedKind::Fair { stall_metric } => Scheduler::fairness(stall_metric.clone()),
        }
    }

    /// Build the task set this configuration describes, in declaration order.
    pub fn build_tasks(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut task = Task::new(i as u64, t.cmd.clone());
                if let Some(cpus) = &t.cpus {
                    let mask = cpus.iter().fold(0u64, |acc, cpu| acc | (1u64 << cpu));
                    task.allowed_cpus = AllowedCpus::Mask(mask);
                }
                task.cos = t.cos.unwrap_or(0);
                task.batch = t.batch;
                task.max_instructions = t.max_instructions;
                task
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn sample_yaml() -> &'static str {
        r#"
cos:
  - schemata: 0xFFFFF
  - schemata: 0x0000F
    cpus: 0x3
tasks:
  - cmd: "stress-ng --cpu 1"
    cpus: [2, 3]
    cos: 1
  - cmd: "yes"
    batch: true
    max_instructions: 2000000000
cat_policy:
  kind: parametric
  every: 4
  clustering:
    kind: adaptive
    max_k: 4
    metric: cycle_activity.stalls_total
    eval_index: dunn
    ascending: false
  model: linear
  alternate_sides: false
sched:
  kind: fair
  seed: 42
  stall_metric: cycle_activity.stalls_total
"#
    }

    #[test]
    fn loads_and_validates_a_full_example() {
        let f = yaml_tempfile(sample_yaml());
        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.cos.len(), 2);
        assert_eq!(cfg.cos[0].schemata, 0xFFFFF);
        assert!(cfg.cos[0].cpus.is_none());
        assert_eq!(cfg.cos[1].cpus, Some(0x3));
        assert_eq!(cfg.tasks.len(), 2);
        assert_eq!(cfg.tasks[1].max_instructions, Some(2_000_000_000));
        assert_eq!(cfg.sched.seed, 42);
    }

    #[test]
    fn hex_and_decimal_masks_both_parse() {
        let yaml = r#"
cos:
  - schemata: 1048575
  - schemata: 15
tasks: []
cat_policy:
  kind: static
  every: 1
  clustering:
    kind: fixed
    k: 1
    metric: m
  masks: [0xFFFFF, 15]
sched:
  kind: pass
"#;
        let f = yaml_tempfile(yaml);
        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.cos[0].schemata, 0xFFFFF);
        assert_eq!(cfg.cos[1].schemata, 15);
        match cfg.cat_policy.distributor {
            DistributorConfig::Static { ref masks } => {
                assert_eq!(masks[0], 0xFFFFF);
                assert_eq!(masks[1], 15);
            }
            _ => panic!("expected static distributor"),
        }
    }

    #[test]
    fn default_cos_with_a_cpu_mask_is_rejected() {
        let yaml = r#"
cos:
  - schemata: 0xFFFFF
    cpus: 0x1
tasks: []
cat_policy:
  kind: static
  every: 1
  clustering:
    kind: fixed
    k: 1
    metric: m
  masks: []
sched:
  kind: pass
"#;
        let f = yaml_tempfile(yaml);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultCosHasCpuMask));
    }

    #[test]
    fn task_referencing_unknown_cos_is_rejected() {
        let yaml = r#"
cos:
  - schemata: 0xFFFFF
tasks:
  - cmd: "yes"
    cos: 5
cat_policy:
  kind: static
  every: 1
  clustering:
    kind: fixed
    k: 1
    metric: m
  masks: []
sched:
  kind: pass
"#;
        let f = yaml_tempfile(yaml);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownCos {
                task_index: 0,
                cos: 5
            }
        ));
    }

    #[test]
    fn unknown_policy_kind_is_rejected() {
        let yaml = r#"
cos:
  - schemata: 0xFFFFF
tasks: []
cat_policy:
  kind: bogus
  every: 1
  clustering:
    kind: fixed
    k: 1
    metric: m
sched:
  kind: pass
"#;
        let f = yaml_tempfile(yaml);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPolicyKind(_)));
    }

    #[test]
    fn unknown_clustering_kind_is_rejected() {
        let yaml = r#"
cos:
  - schemata: 0xFFFFF
tasks: []
cat_policy:
  kind: static
  every: 1
  clustering:
    kind: bogus
    metric: m
  masks: []
sched:
  kind: pass
"#;
        let f = yaml_tempfile(yaml);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownClusteringKind(_)));
    }

    #[test]
    fn unknown_model_is_rejected() {
        let yaml = r#"
cos:
  - schemata: 0xFFFFF
tasks: []
cat_policy:
  kind: parametric
  every: 1
  clustering:
    kind: fixed
    k: 1
    metric: m
  model: bogus
sched:
  kind: pass
"#;
        let f = yaml_tempfile(yaml);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownModel(_)));
    }

    #[test]
    fn unknown_sched_kind_is_rejected() {
        let yaml = r#"
cos:
  - schemata: 0xFFFFF
tasks: []
cat_policy:
  kind: static
  every: 1
  clustering:
    kind: fixed
    k: 1
    metric: m
  masks: []
sched:
  kind: bogus
"#;
        let f = yaml_tempfile(yaml);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSchedKind(_)));
    }

    #[test]
    fn unknown_eval_index_is_rejected() {
        let yaml = r#"
cos:
  - schemata: 0xFFFFF
tasks: []
cat_policy:
  kind: static
  every: 1
  clustering:
    kind: adaptive
    max_k: 4
    metric: m
    eval_index: bogus
  masks: []
sched:
  kind: pass
"#;
        let f = yaml_tempfile(yaml);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEvalIndex(_)));
    }

    #[test]
    fn missing_file_returns_read_error() {
        let err = Config::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_yaml_returns_parse_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let yaml = format!("{}\nbogus_key: 1\n", sample_yaml());
        let f = yaml_tempfile(&yaml);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unknown_task_entry_key_is_rejected() {
        let yaml = r#"
cos:
  - schemata: 0xFFFFF
tasks:
  - cmd: "yes"
    typo_field: true
cat_policy:
  kind: parametric
  every: 1
  clustering:
    kind: fixed
    k: 2
    metric: cycle_activity.stalls_total
  model: linear
sched:
  kind: pass
"#;
        let f = yaml_tempfile(yaml);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn build_tasks_applies_cpu_mask_and_cos() {
        let f = yaml_tempfile(sample_yaml());
        let cfg = Config::load(f.path()).unwrap();
        let tasks = cfg.build_tasks();
        assert_eq!(tasks[0].allowed_cpus, AllowedCpus::Mask(0b1100));
        assert_eq!(tasks[0].cos, 1);
        assert!(tasks[1].batch);
        assert_eq!(tasks[1].max_instructions, Some(2_000_000_000));
    }
}
