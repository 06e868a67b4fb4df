/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use replica_sched::config::ClusterConfigManager;
use replica_sched::scheduler::Scheduler;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Compute node assignments and the action plan for a cluster scenario.
///
/// Example:
///   replica-sched --config scenario.yaml --output plan.yaml
#[derive(Debug, Parser)]
#[command(
    name = "replica-sched",
    about = "Clone/bundle instance placement and ordering propagation",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML cluster scenario.
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Write the plan here instead of stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Only print mandatory, runnable actions.
    #[arg(short = 'r', long = "required-only", default_value_t = false)]
    required_only: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(config = %cli.config.display(), output = ?cli.output, "replica-sched starting");

    // ── Load scenario ─────────────────────────────────────────────────────────
    let mut config_manager = ClusterConfigManager::new();
    if let Err(e) = config_manager.load_from_file(&cli.config) {
        error!("Failed to load cluster scenario: {:#}", e);
        process::exit(1);
    }

    // ── Schedule ──────────────────────────────────────────────────────────────
    let scheduler = Scheduler::new(Arc::new(config_manager));
    let mut plan = match scheduler.schedule() {
        Ok(plan) => plan,
        Err(e) => {
            error!("Scheduling failed: {}", e);
            process::exit(1);
        }
    };

    for (resource, node) in &plan.assignments {
        info!(
            "  [{resource}]  → {node}",
            node = node.as_deref().unwrap_or("(stopped)")
        );
    }

    if cli.required_only {
        plan.actions.retain(|a| !a.optional && a.runnable);
    }

    // ── Emit plan ─────────────────────────────────────────────────────────────
    let text = match serde_yaml::to_string(&plan) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialise plan: {}", e);
            process::exit(1);
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = fs::write(path, text) {
                error!("Failed to write plan to {}: {}", path.display(), e);
                process::exit(1);
            }
            info!("Plan written to {}", path.display());
        }
        None => print!("{text}"),
    }
}
