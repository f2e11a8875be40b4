//! neutralsync CLI
//!
//! Reference scheduler and one-shot driver commands for executors built on
//! neutralsync-core.
//!
//! ## Usage
//!
//! ```bash
//! # Run a scheduler for an executor whose control server is on port 5000
//! neutralsync scheduler --listen 127.0.0.1:6000 --executor 127.0.0.1:5000 \
//!     --load Clock,Poller --drive --log-dir ./logs
//!
//! # Poke an executor by hand
//! neutralsync load --executor 127.0.0.1:5000 Clock Poller
//! neutralsync execute --executor 127.0.0.1:5000 Clock
//! neutralsync start --executor 127.0.0.1:5000
//!
//! # Merged executor + scheduler log
//! neutralsync timeline --log-dir ./logs
//! ```

mod scheduler;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neutralsync_core::logging::{self, LoggingBuilder, Role};
use neutralsync_core::rpc::{self, RpcClientConfig};
use neutralsync_core::{SchedulerEndpoint, TestControlClient};
use tokio_util::sync::CancellationToken;

use crate::scheduler::{ReferenceScheduler, SchedulerPlan};

/// Executor/scheduler synchronization tools
#[derive(Parser)]
#[command(name = "neutralsync")]
#[command(version = "0.1.0")]
#[command(about = "Executor/scheduler synchronization tools")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a reference scheduler until Ctrl+C (or --max-sites)
    Scheduler {
        /// Address to listen on for scheduler.* calls
        #[arg(short, long, default_value = "127.0.0.1:6000")]
        listen: SocketAddr,

        /// Executor control server address
        #[arg(short, long)]
        executor: SocketAddr,

        /// Components to load before start (comma separated)
        #[arg(long, value_delimiter = ',')]
        load: Vec<String>,

        /// Delay between ready and start, in milliseconds
        #[arg(long, default_value_t = 0)]
        start_delay_ms: u64,

        /// Execute the active components at every injection site
        #[arg(long)]
        drive: bool,

        /// Exit after this many injection sites
        #[arg(long)]
        max_sites: Option<usize>,

        /// Write JSONL run logs to this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Send start to an executor
    Start {
        #[command(flatten)]
        target: Target,
    },

    /// Replace an executor's component set
    Load {
        #[command(flatten)]
        target: Target,

        /// Component names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Execute components on an executor
    Execute {
        #[command(flatten)]
        target: Target,

        /// Component names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Print merged run logs in timestamp order
    Timeline {
        /// Directory holding raw/*.jsonl
        #[arg(long)]
        log_dir: PathBuf,

        /// Only files from this date (YYYY-MM-DD)
        #[arg(long, conflicts_with = "today")]
        date: Option<String>,

        /// Only today's files
        #[arg(long)]
        today: bool,
    },
}

#[derive(clap::Args)]
struct Target {
    /// Executor control server address
    #[arg(short, long)]
    executor: SocketAddr,

    /// Connect timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,
}

impl Target {
    fn client(&self) -> TestControlClient {
        TestControlClient::new(
            self.executor,
            RpcClientConfig {
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                response_timeout: None,
            },
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scheduler {
            listen,
            executor,
            load,
            start_delay_ms,
            drive,
            max_sites,
            log_dir,
        } => {
            // Injection sites are logged at info
            setup_logging(
                cli.verbose.saturating_add(1),
                Role::Scheduler,
                &listen.port().to_string(),
                log_dir.as_deref(),
            )?;

            let plan = SchedulerPlan {
                load,
                start_delay: Duration::from_millis(start_delay_ms),
                drive,
                max_sites,
            };
            run_scheduler(listen, executor, plan).await?;
        }

        Commands::Start { target } => {
            setup_logging(cli.verbose, Role::Scheduler, "cli", None)?;
            target
                .client()
                .start()
                .await
                .with_context(|| format!("start failed for {}", target.executor))?;
            println!("started {}", target.executor);
        }

        Commands::Load { target, names } => {
            setup_logging(cli.verbose, Role::Scheduler, "cli", None)?;
            target
                .client()
                .load_neutral_components(&names)
                .await
                .with_context(|| format!("loadNeutralComponents failed for {}", target.executor))?;
            println!("loaded {}", names.join(","));
        }

        Commands::Execute { target, names } => {
            setup_logging(cli.verbose, Role::Scheduler, "cli", None)?;
            target
                .client()
                .execute_neutral_components(&names)
                .await
                .with_context(|| format!("executeNeutralComponents failed for {}", target.executor))?;
            println!("executed {}", names.join(","));
        }

        Commands::Timeline {
            log_dir,
            date,
            today,
        } => {
            let date = if today {
                Some(chrono::Local::now().format("%Y-%m-%d").to_string())
            } else {
                date
            };
            let records = match &date {
                Some(date) => logging::read_records_for_date(&log_dir, date),
                None => logging::read_all_records(&log_dir),
            }
            .with_context(|| format!("reading {}", log_dir.display()))?;

            if records.is_empty() {
                println!("No log records in {}", log_dir.display());
            } else {
                print!("{}", logging::format_timeline(&records));
            }
        }
    }

    Ok(())
}

async fn run_scheduler(listen: SocketAddr, executor: SocketAddr, plan: SchedulerPlan) -> Result<()> {
    let done = CancellationToken::new();
    let scheduler = Arc::new(ReferenceScheduler::new(
        TestControlClient::new(executor, RpcClientConfig::default()),
        plan,
        done.clone(),
    ));

    let server = rpc::spawn(
        listen,
        Arc::new(SchedulerEndpoint::new(scheduler.clone())),
        done.clone(),
    )
    .await
    .with_context(|| format!("cannot listen on {}", listen))?;

    println!("Scheduler listening on {}", server.local_addr());
    println!("Executor control server: {}", executor);
    println!();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Received shutdown signal...");
        }
        _ = done.cancelled() => {}
    }

    server.shutdown();
    server.join().await;
    println!("Injection sites: {}", scheduler.sites());
    Ok(())
}

fn setup_logging(verbosity: u8, role: Role, instance: &str, log_dir: Option<&Path>) -> Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let mut builder = LoggingBuilder::new(role, instance);
    if std::env::var_os("RUST_LOG").is_none() {
        builder = builder.with_filter(level);
    }
    if let Some(dir) = log_dir {
        builder = builder.with_log_dir(dir);
    }

    if let Some(path) = builder.init()? {
        tracing::info!(path = %path.display(), "Run log enabled");
    }
    Ok(())
}
