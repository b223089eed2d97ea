//! ShowBox - MIDI cue controller and jukebox
//!
//! Listens on a MIDI input for cue selection and transport pads, watches the
//! control document for admin commands, and supervises the player process.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use showbox::control::{run_control_watcher, ControlChannel, CONTROL_POLL_INTERVAL};
use showbox::midi::{self, MidiListener};
use showbox::paths::ShowPaths;
use showbox::player::{SystemLauncher, Tooling};
use showbox::Controller;

/// Delay added per consecutive failed MIDI session
const RESTART_STEP: Duration = Duration::from_secs(2);
const MAX_RESTART_DELAY: Duration = Duration::from_secs(10);
/// A session that lasted this long resets the backoff
const STABLE_SESSION: Duration = Duration::from_secs(60);

/// ShowBox - fire show cues from a MIDI controller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Show data directory (defaults to ~/showbox)
    #[arg(short, long, env = "SHOWBOX_DIR")]
    base_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write daily rolling log files under <base>/logs
    #[arg(long)]
    log_file: bool,

    /// Emit console logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log every received MIDI message
    #[arg(
        long,
        env = "MIDI_DEBUG",
        value_parser = parse_flag,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        action = clap::ArgAction::Set
    )]
    midi_debug: bool,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Report which external players are installed
    #[arg(long)]
    check_tools: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if args.list_ports {
        midi::print_ports();
        return Ok(());
    }

    let tooling = Tooling::detect();
    if args.check_tools {
        tooling.print_summary();
        return Ok(());
    }

    let paths = ShowPaths::new(args.base_dir.clone().unwrap_or_else(ShowPaths::default_base));
    let _log_guard = init_logging(&args, &paths)?;

    info!("Starting ShowBox v{}...", env!("CARGO_PKG_VERSION"));
    info!("Show directory: {}", paths.base.display());
    paths.ensure_directories()?;
    tooling.log_summary();

    let controller = Controller::new(paths.clone(), Arc::new(SystemLauncher::new(tooling)));
    let cfg = controller.prepare_startup().await;
    info!("Startup mode: {} (MIDI out {})", cfg.mode, cfg.midi_out_port);

    // Outlives MIDI session restarts
    let control_watcher = tokio::spawn(run_control_watcher(
        controller.clone(),
        ControlChannel::new(&paths.control),
        CONTROL_POLL_INTERVAL,
    ));

    tokio::select! {
        _ = run_sessions(controller.clone(), args.midi_debug) => {}
        _ = shutdown_signal() => {}
    }

    info!("Shutting down...");
    control_watcher.abort();
    controller.shutdown().await;
    info!("ShowBox shutdown complete");
    Ok(())
}

/// Keep a MIDI session running, restarting with backoff after any failure
async fn run_sessions(controller: Arc<Controller>, midi_debug: bool) {
    let mut attempt: u32 = 0;
    loop {
        let started = Instant::now();
        match run_session(&controller, midi_debug).await {
            Ok(()) => warn!("MIDI input closed"),
            Err(e) => error!("MIDI session failed: {:#}", e),
        }

        let (next_attempt, delay) = restart_delay(attempt, started.elapsed());
        attempt = next_attempt;
        info!("Restarting MIDI session (attempt #{}) in {:?}", attempt, delay);
        tokio::time::sleep(delay).await;
    }
}

/// Next attempt number and wait after a session that ran for `last_session`.
/// Linear 2 s steps capped at 10 s; a stable session starts over at 1.
fn restart_delay(attempt: u32, last_session: Duration) -> (u32, Duration) {
    let attempt = if last_session >= STABLE_SESSION { 1 } else { attempt.saturating_add(1) };
    let delay = std::cmp::min(MAX_RESTART_DELAY, RESTART_STEP.saturating_mul(attempt));
    (attempt, delay)
}

/// One listen-dispatch cycle; returns when the input goes away
async fn run_session(controller: &Arc<Controller>, midi_debug: bool) -> Result<()> {
    let cfg = controller.config().load().await;
    let mut listener =
        MidiListener::open(&cfg.midi_in_port, midi_debug).context("Failed to open MIDI input")?;
    info!("Ready! Listening on {} ({} mode)", listener.port_name(), cfg.mode);

    while let Some(event) = listener.next_event().await? {
        controller.handle_event(event).await;
    }
    Ok(())
}

fn init_logging(args: &Args, paths: &ShowPaths) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    let (json_layer, console_layer) = if args.json_logs {
        (Some(tracing_subscriber::fmt::layer().json().with_target(false)), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            ),
        )
    };

    let (file_layer, guard) = if args.log_file {
        paths.ensure_logs_dir()?;
        let appender = tracing_appender::rolling::daily(&paths.logs_dir, "showbox.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Accepts 1/true/yes/on and 0/false/no/off
fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected 1/true/yes/on or 0/false/no/off, got '{}'", other)),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
