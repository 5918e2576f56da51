//! mctp-busctl: bring up kernel MCTP links on host serial devices, or
//! enumerate the endpoints behind them from user space.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Adapters (outer ring)                    │
//! │  MctpCliAdapter   SystemdService   SystemClock   LogSink  │
//! │  (LinkPort)       (ServicePort)    (Clock)    (EventSink) │
//! │  ──────────────── Port Trait Boundary ────────────────    │
//! │  ┌────────────────────────────────────────────────────┐   │
//! │  │        HostBusController (EID pool, rollback)      │   │
//! │  └────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//!
//!   discover:  TtyTransport ──▶ LinkSet ──▶ BusOwner ──▶ endpoint table
//! ```

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use mctp_pldm::adapters::clock::SystemClock;
use mctp_pldm::adapters::devices::expand_patterns;
use mctp_pldm::adapters::log_sink::LogEventSink;
use mctp_pldm::adapters::mctp_cli::MctpCliAdapter;
use mctp_pldm::adapters::systemd::SystemdService;
use mctp_pldm::adapters::tty::{DEFAULT_BAUD, TtyTransport};
use mctp_pldm::app::discovery::DISCOVERY_TIMEOUT_MS;
use mctp_pldm::app::{HostBusController, HostLink, discover};
use mctp_pldm::config::MctpConfig;

/// Manage an MCTP bus over host serial devices.
#[derive(Parser)]
#[command(name = "mctp-busctl", version)]
enum Command {
    /// Bind matching serial devices, assign EIDs and restart the daemon.
    Up {
        /// mctpd configuration file.
        #[arg(short, long, default_value = "/etc/mctpd.conf")]
        config: PathBuf,

        /// systemd unit of the MCTP daemon.
        #[arg(short, long, default_value = "mctpd.service")]
        unit: String,

        /// Run the `mctp` and `systemctl` tools without sudo.
        #[arg(long)]
        no_sudo: bool,

        /// Print the link table and events as JSON.
        #[arg(long)]
        json: bool,

        /// Keep the links up until a line is read from stdin.
        #[arg(long)]
        hold: bool,

        /// Serial device patterns, e.g. `/dev/ttyUSB?`.
        #[arg(name = "PATTERN", default_value = "/dev/ttyUSB?")]
        patterns: Vec<String>,
    },
    /// Act as bus owner on the devices directly and list the endpoints found.
    Discover {
        /// mctpd configuration file (EID range, timeouts, network id).
        #[arg(short, long, default_value = "/etc/mctpd.conf")]
        config: PathBuf,

        /// Line speed for every device.
        #[arg(short, long, default_value_t = DEFAULT_BAUD)]
        baud: u32,

        /// Give up on silent devices after this long.
        #[arg(long, default_value_t = DISCOVERY_TIMEOUT_MS)]
        timeout_ms: u64,

        /// Print the endpoint table as JSON.
        #[arg(long)]
        json: bool,

        /// Serial device patterns, e.g. `/dev/ttyUSB?`.
        #[arg(name = "PATTERN", default_value = "/dev/ttyUSB?")]
        patterns: Vec<String>,
    },
    /// Validate a configuration file and print it normalised.
    Config {
        #[arg(name = "PATH")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Command::parse() {
        Command::Up {
            config,
            unit,
            no_sudo,
            json,
            hold,
            patterns,
        } => up(&config, unit, !no_sudo, json, hold, &patterns),
        Command::Discover {
            config,
            baud,
            timeout_ms,
            json,
            patterns,
        } => discover_endpoints(&config, baud, timeout_ms, json, &patterns),
        Command::Config { path } => {
            let config = MctpConfig::load(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<MctpConfig> {
    if path.exists() {
        MctpConfig::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        warn!("{} not found, using defaults", path.display());
        Ok(MctpConfig::default())
    }
}

fn up(
    config_path: &Path,
    unit: String,
    sudo: bool,
    json: bool,
    hold: bool,
    patterns: &[String],
) -> Result<()> {
    let config = load_config(config_path)?;
    let devices = expand_patterns(patterns);
    if devices.is_empty() {
        bail!("no serial devices match {}", patterns.join(" "));
    }
    info!("found {} device(s): {}", devices.len(), devices.join(", "));

    let sink = if json { LogEventSink::json() } else { LogEventSink::new() };
    let mut controller = HostBusController::start(
        &config,
        devices,
        MctpCliAdapter::new(sudo),
        SystemdService::new(unit, sudo),
        SystemClock::new(),
        sink,
    )
    .context("bringing up MCTP links")?;

    let links: Vec<&HostLink> = controller.links().collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&links)?);
    } else {
        println!("{:<5} {:<16} DEVICE", "EID", "INTERFACE");
        for l in &links {
            println!("{:<5} {:<16} {}", l.eid.0, l.interface, l.device);
        }
    }

    if hold {
        info!("links up; press Enter to tear down");
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
    }

    controller.close().context("tearing down MCTP links")?;
    Ok(())
}

fn discover_endpoints(
    config_path: &Path,
    baud: u32,
    timeout_ms: u64,
    json: bool,
    patterns: &[String],
) -> Result<()> {
    let config = load_config(config_path)?;
    let devices = expand_patterns(patterns);
    if devices.is_empty() {
        bail!("no serial devices match {}", patterns.join(" "));
    }

    let mut lines = Vec::with_capacity(devices.len());
    for device in devices {
        match TtyTransport::open(&device, baud) {
            Ok(tty) => lines.push((device, tty)),
            Err(e) => warn!("serial[{}]: cannot open: {}", device, e),
        }
    }

    let mut sink = if json { LogEventSink::json() } else { LogEventSink::new() };
    let found = discover(&config, lines, &mut SystemClock::new(), &mut sink, timeout_ms)
        .context("discovering endpoints")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        println!("{:<5} {:<5} {:<16} TYPES", "EID", "NET", "DEVICE");
        for ep in &found {
            let types: Vec<String> = ep.message_types.iter().map(|t| format!("{t:#04x}")).collect();
            println!("{:<5} {:<5} {:<16} {}", ep.eid.0, ep.network_id, ep.device, types.join(","));
            if let Some(pool) = ep.downstream {
                println!("      bridges {} EIDs from {}", pool.count, pool.first.0);
            }
        }
    }
    Ok(())
}
