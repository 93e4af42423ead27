// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for a swarmtrace worker.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! A render worker: fetches its assigned treelets, traces the rays that
//! land in them, and forwards the rest to peers.

use std::net::{IpAddr, SocketAddr};

use anyhow::Result;
use clap::Parser;

use swarmtrace::worker::{Worker, WorkerConfig, LOG_STREAM_ENVAR};

#[derive(Debug, Parser)]
#[command(name = "swarm-worker", version, about = "Swarmtrace render worker")]
struct Cli {
    /// IP of the coordinator.
    #[arg(short = 'i', long)]
    ip: IpAddr,

    /// Port of the coordinator.
    #[arg(short = 'p', long)]
    port: u16,

    /// Storage backend URI, e.g. file:///path/to/scene.
    #[arg(short = 's', long)]
    storage_backend: String,

    /// Send ray packets reliably.
    #[arg(short = 'R', long)]
    reliable_udp: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let scratch_dir = std::env::temp_dir().join(format!("swarm-worker-{}", std::process::id()));
    let cfg = WorkerConfig {
        coordinator: SocketAddr::new(cli.ip, cli.port),
        storage_uri: cli.storage_backend,
        send_reliably: cli.reliable_udp,
        scratch_dir,
        log_stream: std::env::var(LOG_STREAM_ENVAR).unwrap_or_default(),
        seed: None,
    };

    let worker = Worker::connect(cfg).await?;
    worker.run().await
}
