//! Editor Command Bridge - Loopback Host Daemon
//!
//! Runs the dispatcher against a simulated editor, ticking it on a timer
//! the way a real host would tick it from its frame loop. Useful for
//! developing and testing controllers without an editor attached.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use ecb_common::protocol::LogKind;
use ecb_common::{BridgeConfig, FileStore};
use ecbd::Dispatcher;
use ecbd::loopback::LoopbackHost;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "ecbd")]
#[command(author, version, about = "Editor Command Bridge loopback daemon")]
struct Cli {
    /// Bridge directory (defaults to ./.editor-bridge)
    #[arg(short, long, env = "ECB_DIR")]
    dir: Option<PathBuf>,

    /// Tick interval in milliseconds
    #[arg(long, default_value = "100")]
    tick_ms: u64,

    /// Processing ceiling before a wedged command is abandoned
    #[arg(long, default_value = "300s", value_parser = humantime::parse_duration)]
    ceiling: Duration,

    /// Age past which response files are swept
    #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
    response_ttl: Duration,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = match cli.dir {
        Some(dir) => BridgeConfig::default().with_dir(dir),
        None => BridgeConfig::default(),
    };

    let store = FileStore::new(config.dir.clone());
    if store.ensure_dir()? {
        info!(dir = %config.dir.display(), "created bridge directory");
    }

    let host = LoopbackHost::new();
    host.console().push(
        LogKind::Log,
        format!("ecbd {} loopback host started", env!("CARGO_PKG_VERSION")),
        "",
    );

    let dispatcher = Dispatcher::new(store, host.registry(), host.probe())
        .with_ceiling(cli.ceiling);
    dispatcher.startup_sweep(cli.response_ttl);

    info!(
        dir = %config.dir.display(),
        tick_ms = cli.tick_ms,
        "ticking dispatcher; press Ctrl-C to stop"
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(cli.tick_ms.max(1)));
    // Periodic TTL sweep so long-running sessions do not accumulate
    // orphaned responses.
    let mut sweeper = tokio::time::interval(Duration::from_secs(300));
    sweeper.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => dispatcher.tick(),
            _ = sweeper.tick() => {
                let swept = dispatcher.store().sweep(cli.response_ttl);
                if swept > 0 {
                    info!(count = swept, "swept stale response files");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
