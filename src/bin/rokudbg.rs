//! rokudbg - Reserve a networked device and debug the channel running on it
//!
//! Reservations are coordinated through lock files in a shared directory,
//! so several people (or CI jobs) can share one pool of devices.
//!
//! # Usage
//!
//! ```bash
//! # Reserve the default device (or the first free one) and debug it
//! rokudbg debug
//!
//! # Wait until a specific device is free
//! rokudbg debug --device living-room --blocking
//!
//! # Show configured devices, liveness and lock owners
//! rokudbg devices
//!
//! # Clear a lock left behind by a crashed process
//! rokudbg unlock living-room
//! ```

use std::env;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rokudbg_core::{Config, DeviceManager, LivenessProbe, PingProbe, ReserveOptions};

/// Device reservation and remote debugging
#[derive(Parser, Debug)]
#[command(name = "rokudbg", version, about)]
struct Args {
    /// Configuration file (defaults to $ROKUDBG_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reserve a device and start an interactive debug session
    Debug {
        /// Device to debug instead of the first free one
        #[arg(short, long)]
        device: Option<String>,

        /// Wait for a device to become free
        #[arg(short, long)]
        blocking: bool,
    },
    /// List configured devices with liveness and lock owner
    Devices,
    /// Check that a device can be reserved, then release it
    Reserve {
        #[arg(short, long)]
        device: Option<String>,

        /// Only check liveness, do not take the lock
        #[arg(long)]
        no_lock: bool,

        #[arg(short, long)]
        blocking: bool,
    },
    /// Remove the lock file for a device
    Unlock {
        /// Configured device name
        name: String,
    },
}

fn config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Ok(path) = env::var("ROKUDBG_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let dir = dirs::config_dir().context("No user configuration directory")?;
    Ok(dir.join("rokudbg").join("config.toml"))
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for krate in ["rokudbg", "rokudbg_core", "rokudbg_protocol", "rokudbg_session"] {
        filter = filter.add_directive(format!("{krate}={level}").parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn reserve_options(device: Option<String>, no_lock: bool, blocking: bool) -> ReserveOptions {
    let mut options = match device {
        Some(name) => ReserveOptions::named(name),
        None => ReserveOptions::any(),
    };
    if no_lock {
        options = options.no_lock();
    }
    if blocking {
        options = options.blocking();
    }
    options
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let path = config_path(args.config)?;
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let probe = Arc::new(PingProbe::new(config.reservation.ping_timeout()));
    let manager = DeviceManager::new(config, probe.clone());

    match args.command {
        Command::Debug { device, blocking } => debug(&manager, device, blocking).await,
        Command::Devices => {
            list_devices(&manager, &*probe).await;
            Ok(())
        }
        Command::Reserve {
            device,
            no_lock,
            blocking,
        } => {
            let options = reserve_options(device, no_lock, blocking);
            let device = manager.reserve(&options).await?;
            println!("{device} is available");
            manager.release(&device);
            Ok(())
        }
        Command::Unlock { name } => {
            if manager.config().device(&name).is_none() {
                bail!("Device {name} is not configured");
            }
            manager
                .force_release(&name)
                .with_context(|| format!("Failed to remove lock for {name}"))?;
            println!("Unlocked {name}");
            Ok(())
        }
    }
}

async fn debug(manager: &DeviceManager, device: Option<String>, blocking: bool) -> Result<()> {
    let options = reserve_options(device, false, blocking);
    let device = manager.reserve(&options).await?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    let settings = manager.config().session.clone();
    let input = BufReader::new(io::stdin());
    rokudbg_session::run(manager, device, &settings, input, cancel).await?;
    Ok(())
}

async fn list_devices(manager: &DeviceManager, probe: &dyn LivenessProbe) {
    let config = manager.config();
    for device in config.candidates() {
        let alive = if probe.is_alive(device.ip()).await {
            "up"
        } else {
            "down"
        };
        let owner = match manager.locks().owner(device.name()) {
            Ok(Some(owner)) => match owner.is_running() {
                Some(false) => format!("stale lock ({})", owner.identity()),
                _ => format!("locked by {}", owner.identity()),
            },
            Ok(None) => "free".to_string(),
            Err(e) => format!("lock unreadable: {e}"),
        };
        let marker = if device.name() == config.default_device {
            " (default)"
        } else {
            ""
        };
        println!("{device}{marker}  {alive}  {owner}");
    }
}

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
