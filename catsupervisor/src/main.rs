/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Supervisor binary: loads a YAML configuration, validates it against a
//! cache-allocation root, and reports the decisions a control loop would
//! make. Launching the configured tasks and sampling their counters needs a
//! [`catsupervisor::launcher::ProcessLauncher`] and
//! [`catsupervisor::counters::CounterBackend`] implementation; this crate
//! ships only the traits, so integrators link their own before driving
//! [`catsupervisor::control_loop::ControlLoop::run`].

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use catsupervisor::cache::{CacheDriver, FsCacheDriver};
use catsupervisor::config::Config;

/// Cache-allocation-aware co-scheduling supervisor.
#[derive(Debug, Parser)]
#[command(name = "catsupervisor", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Root of the resctrl-like pseudo-filesystem (commonly `/sys/fs/resctrl`).
    #[arg(long, default_value = "/sys/fs/resctrl")]
    resctrl_root: PathBuf,

    /// Seconds between control-loop intervals.
    #[arg(long, default_value_t = 1.0)]
    interval_secs: f64,

    /// Increase log verbosity; repeatable (`-v`, `-vv`, `-vvv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    info!(
        cos = config.cos.len(),
        tasks = config.tasks.len(),
        "configuration loaded"
    );

    let mut driver = FsCacheDriver::new(&cli.resctrl_root);
    driver
        .init()
        .with_context(|| format!("failed to initialize cache driver at {}", cli.resctrl_root.display()))?;
    let info_block = driver.info().context("cache driver has no info after init")?;
    info!(
        cbm_mask = format!("{:#x}", info_block.cbm_mask),
        min_cbm_bits = info_block.min_cbm_bits,
        num_closids = info_block.num_closids,
        "cache driver ready"
    );

    let policy = config.build_policy();
    let _scheduler = config.build_scheduler();
    let tasks = config.build_tasks();
    info!(
        every = policy.every,
        tasks = tasks.len(),
        interval_secs = cli.interval_secs,
        "policy and scheduler constructed; launch an integrator-supplied \
         ProcessLauncher and CounterBackend to drive the control loop"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_config_flag_with_defaults() {
        let cli = Cli::try_parse_from(["catsupervisor", "--config", "cfg.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("cfg.yaml"));
        assert_eq!(cli.resctrl_root, PathBuf::from("/sys/fs/resctrl"));
        assert_eq!(cli.interval_secs, 1.0);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn repeated_verbose_flag_increments_count() {
        let cli = Cli::try_parse_from(["catsupervisor", "--config", "cfg.yaml", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn overrides_resctrl_root_and_interval() {
        let cli = Cli::try_parse_from([
            "catsupervisor",
            "--config",
            "cfg.yaml",
            "--resctrl-root",
            "/tmp/resctrl",
            "--interval-secs",
            "0.5",
        ])
        .unwrap();
        assert_eq!(cli.resctrl_root, PathBuf::from("/tmp/resctrl"));
        assert_eq!(cli.interval_secs, 0.5);
    }

    #[test]
    fn missing_required_config_flag_is_rejected() {
        assert!(Cli::try_parse_from(["catsupervisor"]).is_err());
    }
}
