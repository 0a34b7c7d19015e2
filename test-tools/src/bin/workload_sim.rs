//! Scripted workload driver for schedd.
//!
//! Boots a full server instance (simulator kernel + event loop), starts a
//! handful of processes the way the process manager would, applies
//! per-policy nice values and then fires quantum-exhaustion rounds so the
//! active policy's picks show up in the logs. Everything is deterministic
//! for a given `--seed`.
//!
//! ```text
//! RUST_LOG=debug cargo run -p test-tools --bin workload-sim -- \
//!     --policy lottery --procs 4 --rounds 8 --dead-cpu 1
//! ```

use anyhow::{anyhow, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use schedd::config::Machine;
use schedd::kernel::sim::SimKernel;
use schedd::proc::{Endpoint, PM_PROC_NR, PRIO_MAX, PRIO_MIN};
use schedd::sched::{Message, Policy, Reply, Request, SchedError, Scheduler};
use schedd::server::{self, Envelope};

#[derive(Debug, Parser)]
#[command(
    name = "workload-sim",
    about = "Drive a schedd instance through a scripted workload"
)]
struct Args {
    /// Scheduling policy to run the workload under
    #[arg(long, default_value = "lottery")]
    policy: Policy,

    /// Number of user processes to start
    #[arg(long, default_value_t = 4)]
    procs: u32,

    /// Quantum-exhaustion rounds to fire
    #[arg(long, default_value_t = 8)]
    rounds: u32,

    /// Processors on the simulated machine
    #[arg(long, default_value_t = 2)]
    cpus: u32,

    /// Pretend this CPU is broken so dead-CPU handling becomes visible
    #[arg(long)]
    dead_cpu: Option<u32>,

    /// RNG seed for reproducible lottery draws
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Clock frequency of the simulated kernel
    #[arg(long, default_value_t = 100)]
    hz: u32,

    /// Switch to the next policy halfway through the rounds
    #[arg(long)]
    switch_midway: bool,
}

/// Thin client over the server's request channel.
struct Client {
    requests: mpsc::Sender<Envelope>,
}

impl Client {
    async fn call(
        &self,
        source: Endpoint,
        request: Request,
    ) -> Result<Result<Reply, SchedError>> {
        let (envelope, reply) = Envelope::call(Message { source, request });
        self.requests
            .send(envelope)
            .await
            .map_err(|_| anyhow!("server is gone"))?;
        Ok(reply.await?)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(?args, "starting workload");

    let machine = Machine {
        processors_count: args.cpus,
        bsp_id: 0,
    };
    let mut kernel = SimKernel::new(args.hz);
    if let Some(cpu) = args.dead_cpu {
        kernel = kernel.with_dead_cpu(cpu);
    }
    let scheduler = Scheduler::seeded(kernel, machine, args.policy, args.seed);

    let (requests, inbox) = mpsc::channel(64);
    let server = tokio::spawn(server::run(scheduler, inbox));
    let client = Client { requests };

    // Boot: init is its own parent, everything else forks off it.
    let init = Endpoint(100);
    client
        .call(
            PM_PROC_NR,
            Request::Start {
                endpoint: init,
                parent: init,
                max_prio: 0,
                quantum: 200,
            },
        )
        .await??;

    let mut procs = vec![init];
    for i in 1..args.procs {
        let endpoint = Endpoint(100 + i as i32);
        client
            .call(
                PM_PROC_NR,
                Request::Inherit {
                    endpoint,
                    parent: init,
                    max_prio: 0,
                },
            )
            .await??;
        procs.push(endpoint);
    }

    // Per-policy nice spread: queue ladder, ticket weights, deadline ladder.
    for (i, &endpoint) in procs.iter().enumerate() {
        let value = match args.policy {
            Policy::Mlfq => ((i as i32) * 5 - 10).clamp(PRIO_MIN, PRIO_MAX),
            Policy::Lottery => (i as i32 + 1) * 2,
            Policy::Edf => (i as i32 + 1) * 50,
        };
        client
            .call(PM_PROC_NR, Request::Nice { endpoint, nice: value })
            .await??;
    }

    // Quantum-exhaustion rounds, round-robin over the processes.
    for round in 0..args.rounds {
        if args.switch_midway && round == args.rounds / 2 {
            info!("switching policy midway through the workload");
            client.call(PM_PROC_NR, Request::SwitchPolicy).await??;
        }
        let endpoint = procs[round as usize % procs.len()];
        if let Err(error) = client.call(endpoint, Request::NoQuantum).await? {
            info!(%endpoint, %error, "noquantum rejected");
        }
    }

    // Tear down in reverse order; the last stop leaves an empty table.
    for &endpoint in procs.iter().rev() {
        client.call(PM_PROC_NR, Request::Stop { endpoint }).await??;
    }

    drop(client);
    server.await?;
    info!("workload complete");
    Ok(())
}
