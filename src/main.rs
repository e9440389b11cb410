//! Launchpad trading agent
//!
//! Loads `.env` and the policy file, wires every component, then runs
//! block polling or log subscription plus the trade worker, risk loop and
//! price refresher until SIGINT/SIGTERM. On shutdown it waits for
//! outstanding confirmations before exiting.

use anyhow::Result;
use clap::Parser;
use fourmeme_bot::config::{load_config, DriveMode};
use fourmeme_bot::AppContext;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// four.meme launchpad trading agent (BSC)
#[derive(Parser)]
#[command(name = "fourmeme-bot")]
struct Args {
    /// Policy file (targets, creator lists, runtime knobs)
    #[arg(short, long, env = "POLICY_PATH", default_value = "config/policy.toml")]
    config: PathBuf,

    /// Ingestion mode; overrides the policy file
    #[arg(short, long, value_enum)]
    mode: Option<DriveMode>,

    /// Sign transactions but never broadcast them
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.policy.runtime.log_level));
    if args.json_logs {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }

    let mode = args.mode.unwrap_or(config.policy.runtime.mode);

    info!("===========================================");
    info!("   four.meme Launchpad Agent (BSC)");
    info!("   Mode: {:?}{}", mode, if args.dry_run { " [DRY RUN]" } else { "" });
    info!("===========================================");
    info!("Policy: {} ({} targets)", args.config.display(), config.policy.targets.len());
    info!("Chain id: {}", config.chain.chain_id);

    let ctx = AppContext::connect(&config, mode, args.dry_run).await?;

    let mut tasks = JoinSet::new();
    ctx.spawn(mode, &mut tasks)?;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    if let Some(sig) = signals.next().await {
        info!("Received signal {}, shutting down...", sig);
    }
    handle.close();

    ctx.stop(tasks).await;
    info!("Agent stopped");
    Ok(())
}
