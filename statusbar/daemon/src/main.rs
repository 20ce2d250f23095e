//! swaybar-status - Status Command for swaybar / i3bar
//!
//! Runs the built-in producers under the lifecycle supervisor and speaks the
//! i3bar protocol on stdin/stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # In the sway config
//! bar {
//!     status_command swaybar-status
//! }
//!
//! # Custom config file
//! swaybar-status --config ~/.config/swaybar-status/laptop.toml
//!
//! # Print the effective configuration and exit
//! swaybar-status --check-config
//!
//! # Verbose logging
//! RUST_LOG=debug swaybar-status 2>/tmp/bar.log
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown, the block stream is closed
//!
//! # Exit status
//!
//! `0` after a clean shutdown (signal or end of stdin), `1` when a task failed
//! or the configuration is invalid.

mod producers;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use statusbar_core::{
    default_config_path, load_config_from_path, ConfigOverrides, ShutdownHandle, StatusConfig,
    Supervisor, SupervisorConfig,
};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

/// swaybar-status - Block aggregator and click router for swaybar / i3bar
#[derive(Parser, Debug)]
#[command(name = "swaybar-status")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "SWAYBAR_STATUS_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SWAYBAR_STATUS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Do not ask the bar for click events
    #[arg(long)]
    no_click_events: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    check_config: bool,
}

/// Initialize logging on stderr; stdout belongs to the bar
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "swaybar_status={level},statusbar_core={level}"
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .try_init();
}

/// Resolve the configuration from file, environment and flags
fn resolve_config(args: &Args) -> Result<StatusConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if args.no_click_events {
        overrides = overrides.with_click_events(false);
    }
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Trigger a graceful shutdown on SIGTERM or SIGINT
async fn watch_signals(shutdown: ShutdownHandle) {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
    }
    shutdown.shutdown();
}

/// Run the bar until shutdown or a fatal error
async fn serve(config: StatusConfig) -> Result<()> {
    let mut supervisor = Supervisor::new(SupervisorConfig::from(&config));
    for producer in producers::build_producers(&config) {
        supervisor.add_boxed_producer(producer);
    }
    if supervisor.producer_count() == 0 {
        warn!("No producers enabled, the bar will stay empty");
    }

    tokio::spawn(watch_signals(supervisor.shutdown_handle()));

    supervisor
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = format!("{e:#}"), "Configuration rejected");
            return ExitCode::FAILURE;
        }
    };

    if args.check_config {
        return match config.to_toml() {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Failed to render configuration");
                ExitCode::FAILURE
            }
        };
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        source = %config.source(),
        click_events = config.bar.click_events,
        "swaybar-status starting"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("swaybar-status")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let grace = config.runtime.shutdown_grace();
    let result = runtime.block_on(serve(config));
    // A blocked stdin read must not keep the process alive
    runtime.shutdown_timeout(grace);

    match result {
        Ok(()) => {
            info!("swaybar-status stopped cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = format!("{e:#}"), "swaybar-status stopped with error");
            ExitCode::FAILURE
        }
    }
}
