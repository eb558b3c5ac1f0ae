//! stagehand - demo runner for stagehand actors.
//!
//! ## Scenarios
//!
//! - **ping-pong**: a pinger sends requests with a timeout to a ponger that
//!   ignores some of them; answered and timed-out rounds are tallied.
//! - **crash**: a foreman supervises a worker that fails on some jobs; the
//!   worker is restarted until its restart budget runs out.
//!
//! Runtime settings come from `STAGEHAND_*` environment variables.

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use stagehand_runtime::{ActorSystem, RuntimeConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod demo;

/// Run stagehand actor demos.
#[derive(Debug, Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, env = "STAGEHAND_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Request/reply with timeouts.
    PingPong {
        /// Number of pings to send.
        #[arg(long, default_value_t = 10)]
        rounds: u32,

        /// The ponger ignores every n-th ping (0 answers all).
        #[arg(long, default_value_t = 3)]
        drop_every: u32,

        /// How long each ping waits for its pong.
        #[arg(long, default_value_t = 500)]
        timeout_ms: u64,
    },

    /// A supervised worker that keeps failing.
    Crash {
        /// Number of jobs to hand out.
        #[arg(long, default_value_t = 12)]
        jobs: u32,
    },
}

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = RuntimeConfig::from_env()?;
    init_tracing(cli.log_format, &config.log_level);
    info!(
        mailbox_capacity = config.mailbox_capacity,
        request_timeout_ms = config.request_timeout.as_millis() as u64,
        shutdown_grace_ms = config.shutdown_grace.as_millis() as u64,
        "Configuration loaded"
    );

    let system = ActorSystem::new(config)?;

    let result = match cli.command {
        Commands::PingPong {
            rounds,
            drop_every,
            timeout_ms,
        } => demo::ping_pong(&system, rounds, drop_every, Duration::from_millis(timeout_ms))
            .await
            .map(|tally| {
                info!(
                    answered = tally.answered,
                    timed_out = tally.timed_out,
                    "Ping-pong complete"
                );
            }),
        Commands::Crash { jobs } => demo::crash(&system, jobs).await.map(|()| {
            info!(jobs, "Crash demo complete");
        }),
    };

    info!("Shutting down");
    system.shutdown().await;
    result
}
