//! Proctor-0 CLI
//!
//! Usage:
//!   proctor0 --frames-dir ./frames                  # Interactive terminal session
//!   proctor0 --frames-dir ./frames --serve          # HTTP + WebSocket API
//!   proctor0 --frames-dir ./frames --json           # JSON snapshot lines

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proctor0::config::{ControllerConfig, Facing};
use proctor0::core::{run_server, FrameDirSource, HttpDetectionService, SessionController, SessionHandle};
use proctor0::types::{Intent, SessionSnapshot};
use proctor0::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "proctor0",
    version = VERSION,
    about = "Proctor-0 - Session controller for remote exam monitoring",
    long_about = "Proctor-0 owns the camera, walks the candidate through calibration\n\
                  against the detection service and then streams frames for analysis.\n\n\
                  Modes:\n  \
                  (default)  Interactive terminal session\n  \
                  --serve    HTTP + WebSocket API\n\n\
                  Commands (interactive):\n  \
                  start   - Start or restart calibration\n  \
                  next    - Capture the current calibration frame\n  \
                  skip    - Skip to monitoring (server already calibrated)\n  \
                  pause   - Pause monitoring\n  \
                  resume  - Resume monitoring\n  \
                  status  - Print the current snapshot\n  \
                  quit    - End the session"
)]
struct Args {
    /// Detection service base URL (env: PROCTOR_SERVICE_URL)
    #[arg(long)]
    service_url: Option<String>,

    /// Directory of JPEG/PNG frames replayed as the camera (env: PROCTOR_FRAMES_DIR)
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Ideal capture width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Ideal capture height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Camera facing preference
    #[arg(long, value_enum, default_value_t = Facing::User)]
    facing: Facing,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Output snapshots as JSON lines
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

impl Args {
    fn controller_config(&self) -> anyhow::Result<ControllerConfig> {
        let mut config = ControllerConfig::default();
        if let Some(url) = &self.service_url {
            config.service_url = url.clone();
        }
        if let Some(dir) = &self.frames_dir {
            config.frames_dir = Some(dir.clone());
        }
        config.capture.width = self.width;
        config.capture.height = self.height;
        config.capture.facing = self.facing;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "proctor0=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let config = args.controller_config()?;
    let Some(frames_dir) = config.frames_dir.clone() else {
        bail!("no camera source: pass --frames-dir or set PROCTOR_FRAMES_DIR");
    };

    let service = HttpDetectionService::new(&config.service_url, config.timings.request_timeout)
        .context("building detection service client")?;
    info!(
        version = VERSION,
        service_url = %config.service_url,
        frames_dir = %frames_dir.display(),
        "Starting Proctor-0"
    );

    let (handle, task) = SessionController::spawn(
        config,
        Arc::new(service),
        Arc::new(FrameDirSource::new(frames_dir)),
    );

    let result = if args.serve {
        run_serve(&args, handle.clone()).await
    } else {
        run_interactive(&args, handle.clone()).await
    };

    handle.shutdown();
    if let Err(e) = task.await {
        error!(error = %e, "Controller task failed");
    }
    result
}

/// Run the HTTP API until interrupted
async fn run_serve(args: &Args, handle: SessionHandle) -> anyhow::Result<()> {
    println!();
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║  👁 Proctor-0 API Server                                   ║");
    println!("║  Version: {}                                           ║", VERSION);
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();

    tokio::select! {
        r = run_server(&args.addr, handle) => r.context("API server")?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }
    Ok(())
}

/// Interactive terminal session: commands on stdin, snapshots on stdout
async fn run_interactive(args: &Args, handle: SessionHandle) -> anyhow::Result<()> {
    print_header(args.no_color);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut snapshots = handle.subscribe();
    let mut last_rendered = String::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let cmd = line.trim();
                if cmd.is_empty() {
                    continue;
                }
                if cmd.eq_ignore_ascii_case("quit") || cmd.eq_ignore_ascii_case("exit") {
                    break;
                }
                if cmd.eq_ignore_ascii_case("status") {
                    print_snapshot(&handle.snapshot(), args);
                    continue;
                }
                match Intent::from_command(cmd) {
                    Some(intent) => handle.send(intent).await?,
                    None => println!("Unknown command '{}'. Try: start, next, skip, pause, resume, status, quit", cmd),
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                // every publish carries a new timestamp; only print visible changes
                let key = snapshot.to_parseable_string();
                if key != last_rendered {
                    print_snapshot(&snapshot, args);
                    last_rendered = key;
                }
            }
        }
    }

    let snapshot = handle.snapshot();
    println!(
        "\nSession ended. State: {} | Messages: {}",
        snapshot.session_state, snapshot.message_total
    );
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot, args: &Args) {
    if args.json {
        match serde_json::to_string(snapshot) {
            Ok(json) => println!("{}", json),
            Err(e) => error!(error = %e, "Snapshot serialization failed"),
        }
    } else if args.no_color {
        println!("{}", snapshot.to_parseable_string());
    } else {
        println!("{}", snapshot.to_terminal_string());
    }
}

/// Print header
fn print_header(no_color: bool) {
    if no_color {
        println!("========================================");
        println!("  Proctor-0 v{}", VERSION);
        println!("========================================");
    } else {
        println!("\x1b[1m╔═══════════════════════════════════════════════════════════╗\x1b[0m");
        println!("\x1b[1m║           Proctor-0 v{}                                 ║\x1b[0m", VERSION);
        println!("\x1b[1m╚═══════════════════════════════════════════════════════════╝\x1b[0m");
    }
    println!("Commands: start, next, skip, pause, resume, status, quit");
    println!();
}
