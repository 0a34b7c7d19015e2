/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Server binary: load the configuration, bring up the event loop with the
//! simulator kernel, and run until interrupted.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use schedd::config::RuntimeConfig;
use schedd::kernel::sim::SimKernel;
use schedd::sched::{Policy, Scheduler};
use schedd::server;

#[derive(Debug, Parser)]
#[command(name = "schedd", about = "Userspace process scheduler server")]
struct Args {
    /// Path to the YAML runtime configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the boot scheduling policy (mlfq, lottery, edf)
    #[arg(long)]
    policy: Option<Policy>,

    /// Override the lottery RNG seed
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::load_from_file(path)?,
        None => RuntimeConfig::default_config(),
    };
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }

    let kernel = SimKernel::new(config.hz);
    let rng: Box<dyn RngCore + Send> = match config.seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(StdRng::from_entropy()),
    };
    let scheduler = Scheduler::new(kernel, config.machine, config.policy, rng);

    let (requests, inbox) = mpsc::channel(64);
    let server = tokio::spawn(server::run(scheduler, inbox));

    info!("schedd running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    // closing the request channel lets the loop drain and exit
    drop(requests);
    server.await?;
    Ok(())
}
