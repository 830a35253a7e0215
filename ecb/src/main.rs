//! Editor Command Bridge - Controller CLI
//!
//! One invocation, one command: write it, wait for the response, render
//! it, exit 0/1/2 for success/failure/timeout.

#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use ecb::{BridgeClient, ClientError, EXIT_FAILURE, EXIT_SUCCESS, EXIT_TIMEOUT, format_response};
use ecb_common::config::{MAX_LOG_LIMIT, MIN_LOG_LIMIT};
use ecb_common::protocol::Status;
use ecb_common::BridgeConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "ecb")]
#[command(author, version, about = "Editor Command Bridge controller")]
struct Cli {
    /// Bridge directory (defaults to ./.editor-bridge)
    #[arg(short, long, env = "ECB_DIR")]
    dir: Option<PathBuf>,

    /// Response deadline (must be positive)
    #[arg(short, long, default_value = "30s", value_parser = parse_timeout)]
    timeout: Duration,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Accepted for compatibility; stale-file cleanup always runs
    #[arg(long, hide = true)]
    cleanup: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host's test suite
    RunTests {
        /// Test mode, e.g. EditMode or PlayMode
        #[arg(long)]
        mode: Option<String>,
        /// Substring filter selecting tests to run
        #[arg(long)]
        filter: Option<String>,
    },
    /// Trigger script compilation
    Compile,
    /// Refresh the host's asset database
    Refresh,
    /// Report editor status flags
    GetStatus,
    /// Fetch recent console log entries
    GetConsoleLogs {
        /// Maximum entries to return (1-1000)
        #[arg(long)]
        limit: Option<u32>,
        /// Only entries of this kind: log, warning, or error
        #[arg(long)]
        filter: Option<String>,
    },
    /// Toggle play mode
    Play,
    /// Toggle pause while in play mode
    Pause,
    /// Step one frame while paused
    Step,
    /// Verify the bridge is set up and the host responds
    HealthCheck,
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let timeout = humantime::parse_duration(raw).map_err(|e| e.to_string())?;
    if timeout.is_zero() {
        return Err("timeout must be positive".to_string());
    }
    Ok(timeout)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if cli.cleanup {
        tracing::debug!("--cleanup is implied; stale-file sweeps always run");
    }

    let config = match cli.dir {
        Some(dir) => BridgeConfig::default().with_dir(dir),
        None => BridgeConfig::default(),
    };
    let client = BridgeClient::new(config);

    let code = match run(&client, &cli.command, cli.timeout, cli.verbose) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("✗ {err}");
            err.exit_code()
        }
    };
    ExitCode::from(code as u8)
}

fn run(
    client: &BridgeClient,
    command: &Commands,
    timeout: Duration,
    verbose: bool,
) -> Result<i32, ClientError> {
    if let Commands::HealthCheck = command {
        return health_check(client, timeout);
    }

    let (action, params) = match command {
        Commands::RunTests { mode, filter } => {
            let mut params = BTreeMap::new();
            if let Some(mode) = mode {
                params.insert("testMode".to_string(), mode.clone());
            }
            if let Some(filter) = filter {
                params.insert("filter".to_string(), filter.clone());
            }
            ("run-tests", params)
        }
        Commands::Compile => ("compile", BTreeMap::new()),
        Commands::Refresh => ("refresh", BTreeMap::new()),
        Commands::GetStatus => ("get-status", BTreeMap::new()),
        Commands::GetConsoleLogs { limit, filter } => {
            let mut params = BTreeMap::new();
            if let Some(limit) = limit {
                if !(MIN_LOG_LIMIT..=MAX_LOG_LIMIT).contains(limit) {
                    eprintln!("✗ --limit must be between {MIN_LOG_LIMIT} and {MAX_LOG_LIMIT}");
                    return Ok(EXIT_FAILURE);
                }
                params.insert("limit".to_string(), limit.to_string());
            }
            if let Some(filter) = filter {
                params.insert("filter".to_string(), filter.clone());
            }
            ("get-console-logs", params)
        }
        Commands::Play => ("play", BTreeMap::new()),
        Commands::Pause => ("pause", BTreeMap::new()),
        Commands::Step => ("step", BTreeMap::new()),
        Commands::HealthCheck => unreachable!("handled above"),
    };

    let resp = client.submit_with_progress(action, params, timeout, |progress| {
        if verbose {
            if progress.total > 0 {
                eprintln!(
                    "Tests in progress: {}/{} {}",
                    progress.current, progress.total, progress.current_test
                );
            } else {
                eprintln!("Command running...");
            }
        }
    })?;

    println!("{}", format_response(action, &resp));
    Ok(match resp.status {
        Status::Success => EXIT_SUCCESS,
        _ => EXIT_FAILURE,
    })
}

fn health_check(client: &BridgeClient, timeout: Duration) -> Result<i32, ClientError> {
    println!("Checking bridge setup...");

    let dir = client.store().dir();
    if !dir.exists() {
        println!("✗ Bridge not detected");
        println!("  Directory not found: {}", dir.display());
        println!("  Is the host open with the bridge enabled?");
        return Ok(EXIT_FAILURE);
    }
    println!("✓ Bridge directory exists: {}", dir.display());

    let started = Instant::now();
    match client.health_check(timeout) {
        Ok(_) => {
            println!("✓ Host is responding ({} ms)", started.elapsed().as_millis());
            Ok(EXIT_SUCCESS)
        }
        Err(ClientError::Timeout { .. }) => {
            println!("✗ Host timed out");
            Ok(EXIT_TIMEOUT)
        }
        Err(ClientError::HostNotRunning { .. }) => {
            println!("✗ Host not responding");
            println!("  Ensure the editor is open and the project is loaded");
            Ok(EXIT_FAILURE)
        }
        Err(err) => Err(err),
    }
}
