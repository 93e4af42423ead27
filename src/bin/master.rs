// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the swarmtrace master.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! The render coordinator: assigns treelets, introduces peers, collects
//! finished samples, and writes the output film.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use swarmtrace::master::assign::Assignment;
use swarmtrace::master::{Master, MasterConfig};

#[derive(Debug, Parser)]
#[command(name = "swarm-master", version, about = "Swarmtrace render coordinator")]
struct Cli {
    /// Output directory for the film and run artifacts.
    #[arg(short = 's', long)]
    scene_path: PathBuf,

    /// Port to listen on for worker control connections and datagrams.
    #[arg(short = 'p', long)]
    port: u16,

    /// Public IP of this machine, advertised to workers.
    #[arg(short = 'i', long)]
    ip: String,

    /// Storage backend URI, e.g. file:///path/to/scene.
    #[arg(short = 'b', long)]
    storage_backend: String,

    /// How many workers the launcher will start.
    #[arg(short = 'w', long)]
    workers: u32,

    /// Region the launcher starts workers in.
    #[arg(short = 'r', long)]
    aws_region: String,

    /// Treelet placement policy.
    #[arg(short = 'a', long, value_enum, default_value_t = Assignment::Uniform)]
    assignment: Assignment,

    /// Show per-treelet demand on the status tick.
    #[arg(short = 't', long)]
    treelet_stats: bool,

    /// Show per-worker queue stats on the status tick.
    #[arg(long)]
    worker_stats: bool,

    /// Collect a diagnostics round from every worker before exiting.
    #[arg(short = 'd', long)]
    diagnostics: bool,

    /// Eagerly build a complete peer topology.
    #[arg(short = 'k', long)]
    complete: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let cfg = MasterConfig {
        scene_path: cli.scene_path,
        listen_port: cli.port,
        public_ip: cli.ip,
        storage_uri: cli.storage_backend,
        num_workers: cli.workers,
        aws_region: cli.aws_region,
        assignment: cli.assignment,
        treelet_stats: cli.treelet_stats,
        worker_stats: cli.worker_stats,
        collect_diagnostics: cli.diagnostics,
        complete_topology: cli.complete,
        seed: None,
    };

    let master = Master::bind(cfg).await?;
    let summary = master.run().await?;
    println!("{summary}");
    Ok(())
}
