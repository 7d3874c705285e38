//! Command-line entry point of the `gpuwatchd` binary.
//!
//! # Usage
//!
//! ```bash
//! # Start the bot (foreground)
//! gpuwatchd start
//!
//! # Start the bot in the background
//! gpuwatchd --config /etc/gpuwatch.toml start -d
//!
//! # Stop the daemon
//! gpuwatchd stop
//!
//! # Check daemon status
//! gpuwatchd status
//!
//! # Enable debug logging
//! RUST_LOG=gpuwatchd=debug gpuwatchd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: stop polling and listening, then exit

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::broadcast::Broadcaster;
use crate::config::{resolve_config_path, Config};
use crate::device::{open_devices, DeviceQuery};
use crate::interval::IntervalHandle;
use crate::poller::{spawn_poller, Poller};
use crate::reservation::spawn_default_reservations;
use crate::router::CommandRouter;
use crate::transport::{Messenger, TelegramTransport};

/// How long `stop` waits for the daemon to exit.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// gpuwatchd - GPU occupancy notifications over Telegram
#[derive(Parser, Debug)]
#[command(name = "gpuwatchd", version, about)]
struct Args {
    /// Config file (default: $GPUWATCH_CONFIG, then ./config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the bot
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// PID and log files of the background daemon.
struct StateFiles {
    dir: PathBuf,
}

impl StateFiles {
    /// `$XDG_STATE_HOME/gpuwatch`, or `/tmp/gpuwatch` without a state dir.
    fn locate() -> Self {
        let base = dirs::state_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self {
            dir: base.join("gpuwatch"),
        }
    }

    fn pid_path(&self) -> PathBuf {
        self.dir.join("gpuwatchd.pid")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("gpuwatchd.log")
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))
    }

    fn record_pid(&self) -> Result<()> {
        self.ensure_dir()?;
        fs::write(self.pid_path(), process::id().to_string()).context("Failed to write PID file")
    }

    fn clear_pid(&self) {
        let _ = fs::remove_file(self.pid_path());
    }

    /// PID of a live daemon. A PID file naming a dead process is removed.
    fn live_pid(&self) -> Option<u32> {
        let pid: u32 = fs::read_to_string(self.pid_path()).ok()?.trim().parse().ok()?;
        if process_alive(pid) {
            Some(pid)
        } else {
            self.clear_pid();
            None
        }
    }
}

fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<()> {
    let raw = i32::try_from(pid).with_context(|| format!("Invalid PID {pid}"))?;
    // SAFETY: kill(2) takes no pointers.
    if unsafe { libc::kill(raw, libc::SIGTERM) } != 0 {
        bail!("Failed to send SIGTERM to process {pid}");
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> Result<()> {
    bail!("Stop command is only supported on Unix systems")
}

/// Parses the command line and runs the selected subcommand.
pub fn run() -> Result<()> {
    let args = Args::parse();
    let files = StateFiles::locate();

    match args.command.unwrap_or(Command::Start { daemon: false }) {
        Command::Start { daemon } => start(&files, args.config, daemon),
        Command::Stop => stop(&files),
        Command::Status => status(&files),
    }
}

fn start(files: &StateFiles, config: Option<PathBuf>, daemon: bool) -> Result<()> {
    if let Some(pid) = files.live_pid() {
        bail!("gpuwatchd is already running (PID {pid}); run 'gpuwatchd stop' first");
    }

    // Load before daemonizing: a bad config must fail in the
    // foreground, and daemonize changes the working directory.
    let path = resolve_config_path(config);
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if daemon {
        detach(files)?;
    }

    files.record_pid()?;
    let result = run_daemon(config);
    files.clear_pid();
    result
}

fn stop(files: &StateFiles) -> Result<()> {
    let Some(pid) = files.live_pid() else {
        println!("gpuwatchd is not running.");
        return Ok(());
    };

    println!("Stopping gpuwatchd (PID {pid})...");
    send_sigterm(pid)?;

    let deadline = Instant::now() + STOP_GRACE;
    while Instant::now() < deadline {
        if !process_alive(pid) {
            println!("gpuwatchd stopped.");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    bail!("gpuwatchd (PID {pid}) did not exit within {}s", STOP_GRACE.as_secs())
}

fn status(files: &StateFiles) -> Result<()> {
    match files.live_pid() {
        Some(pid) => {
            println!("gpuwatchd is running (PID {pid})");
            println!("Log: {}", files.log_path().display());
            Ok(())
        }
        None => {
            println!("gpuwatchd is not running.");
            process::exit(1);
        }
    }
}

/// Forks into the background, sending stdout and stderr to the log file.
fn detach(files: &StateFiles) -> Result<()> {
    files.ensure_dir()?;
    let log = File::create(files.log_path()).context("Failed to create log file")?;
    let log_err = log.try_clone().context("Failed to duplicate log file handle")?;

    daemonize::Daemonize::new()
        .working_directory("/")
        .stdout(log)
        .stderr(log_err)
        .start()
        .context("Failed to daemonize")
}

/// Runs the bot until a shutdown signal arrives.
#[tokio::main]
async fn run_daemon(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gpuwatchd=info".parse()?)
                .add_directive("gpuwatch_core=info".parse()?)
                .add_directive("gpuwatch_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        subscribers = config.whitelist.len(),
        interval = %config.poll_interval,
        "gpuwatchd starting"
    );
    if config.whitelist.is_empty() {
        warn!("Whitelist is empty; nobody will receive notifications");
    }

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let devices = open_devices().context("Failed to open GPU devices")?;
    let device_count = devices.device_count().context("Failed to count GPU devices")?;
    info!(devices = device_count, "GPU devices opened");

    let transport = Arc::new(
        TelegramTransport::new(&config.api_url, &config.token)
            .context("Failed to create Telegram client")?,
    );
    let messenger: Arc<dyn Messenger> = transport.clone();
    let whitelist = Arc::new(config.whitelist);

    let reservations = spawn_default_reservations(Arc::clone(&devices));
    let interval = IntervalHandle::new(config.poll_interval);

    let broadcaster = Broadcaster::new(Arc::clone(&messenger), Arc::clone(&whitelist));
    let poller = Poller::new(Arc::clone(&devices), broadcaster, interval.clone());
    let poller_handle = spawn_poller(poller, cancel_token.clone());

    let router = CommandRouter::new(whitelist, devices, reservations, interval, messenger);
    let mut commands = transport.spawn_update_listener(cancel_token.clone());

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => break,

            event = commands.recv() => {
                let Some(event) = event else {
                    warn!("Update listener stopped");
                    break;
                };
                let router = router.clone();
                tokio::spawn(async move { router.handle(event).await });
            }
        }
    }

    cancel_token.cancel();
    if let Err(e) = poller_handle.await {
        error!(error = %e, "Poller task failed");
    }

    info!("gpuwatchd stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
