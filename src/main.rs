//! uplinkd - telemetry uplink daemon
//!
//! Reads telemetry records as JSON lines on stdin and delivers them through
//! whichever publish path the device is configured for: the local link and
//! broker managers (`direct`) or a companion chip on a serial port (`relay`).

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{error, info, warn};
use uplink::config::{DeviceMode, UplinkConfig};
use uplink::observability::{init_default_logging, tick_span};
use uplink::provisioning::ControlOutcome;
use uplink::relay::{open_serial, RelayBridge};
use uplink::storage::{FileStore, SharedStore};
use uplink::transport::{HostRadio, MqttBrokerClient};
use uplink::uplink::{DirectUplink, DirectUplinkBuilder, Uplink};
use uplink::{ConnectionStatus, JsonRecord, PublishResult, SystemClock};

/// Telemetry uplink daemon
#[derive(Parser)]
#[command(name = "uplinkd")]
#[command(about = "Deliver telemetry records to a broker over an unreliable link")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "UPLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the periodic driver, publishing JSON records read from stdin
    Run,
    /// Apply provisioning writes to the persistent store
    Provision {
        /// Network credentials as `identity|secret`
        #[arg(long)]
        credentials: Option<String>,
        /// Broker settings as `host:port|username|password`
        #[arg(long)]
        broker: Option<String>,
        /// Control opcode, decimal or 0x-prefixed hex (repeatable)
        #[arg(long, value_parser = parse_opcode)]
        control: Vec<u8>,
        /// Print the status blob afterwards
        #[arg(long)]
        status: bool,
    },
    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

type DaemonUplink = DirectUplink<HostRadio, MqttBrokerClient, SystemClock>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting uplinkd v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run(config).await,
        Commands::Provision {
            credentials,
            broker,
            control,
            status,
        } => provision(config, credentials, broker, control, status),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(path: Option<&Path>) -> Result<UplinkConfig, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        info!("Loading configuration from: {}", path.display());
        return Ok(UplinkConfig::load_from_file(path)?);
    }

    for candidate in ["uplink.toml", "config/uplink.toml"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(UplinkConfig::load_from_file(&path)?);
        }
    }

    info!("No configuration file found, using defaults");
    Ok(UplinkConfig::default())
}

fn parse_opcode(raw: &str) -> Result<u8, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid opcode '{raw}': {e}"))
}

fn open_store(config: &UplinkConfig) -> Result<SharedStore, Box<dyn std::error::Error>> {
    let store = FileStore::open(&config.device.store_path)?;
    Ok(Arc::new(store))
}

fn build_direct(config: &UplinkConfig) -> Result<DaemonUplink, Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let uplink = DirectUplinkBuilder::new(
        config.clone(),
        HostRadio::new(),
        MqttBrokerClient::new(Handle::current()),
        store,
        SystemClock::new(),
    )
    .with_link_observer(Box::new(|status: ConnectionStatus| {
        info!("Link status: {}", status)
    }))
    .with_broker_observer(Box::new(|status: ConnectionStatus| {
        info!("Broker status: {}", status)
    }))
    .with_publish_observer(Box::new(|id: u32, result: PublishResult| {
        info!("Record {}: {}", id, result)
    }))
    .init();
    Ok(uplink)
}

async fn run(config: UplinkConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Device {} running in {:?} mode",
        config.device.id, config.device.mode
    );
    let tick = Duration::from_millis(config.device.tick_interval_ms);

    match config.device.mode {
        DeviceMode::Direct => {
            let uplink = build_direct(&config)?;
            drive(uplink, &config.device.id, tick).await
        }
        DeviceMode::Relay => {
            let transport = open_serial(&config.relay.port, config.relay.baud_rate)?;
            let mut bridge = RelayBridge::new(
                transport,
                SystemClock::new(),
                &config.relay,
                config.broker.max_payload_bytes,
            );
            bridge.init();
            drive(bridge, &config.device.id, tick).await
        }
    }
}

/// Tick the uplink on a fixed period and publish records from stdin until a
/// shutdown signal arrives
async fn drive<U: Uplink>(
    mut uplink: U,
    device_id: &str,
    period: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Uplink running, reading records from stdin");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let span = tick_span!(device = device_id);
                let _guard = span.enter();
                uplink.tick();
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => publish_line(&mut uplink, &line),
                Ok(None) => {
                    info!("stdin closed, continuing without new records");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    stdin_open = false;
                }
            },
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
        }
    }

    let connectivity = uplink.connectivity();
    info!(
        "Final connectivity: link={}, broker={}",
        connectivity.link_connected, connectivity.broker_connected
    );
    Ok(())
}

fn publish_line<U: Uplink>(uplink: &mut U, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let record = serde_json::from_str(line)
        .map_err(|e| e.to_string())
        .and_then(|value| JsonRecord::from_value(value).map_err(|e| e.to_string()));

    match record {
        Ok(record) => {
            let result = uplink.publish(&record);
            info!("Record accepted from stdin: {}", result);
        }
        Err(e) => warn!("Ignoring stdin line: {}", e),
    }
}

fn provision(
    config: UplinkConfig,
    credentials: Option<String>,
    broker: Option<String>,
    control: Vec<u8>,
    status: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut uplink = build_direct(&config)?;
    let mut adapter = uplink.provisioning();

    if let Some(credentials) = credentials {
        adapter.write_credentials(credentials.as_bytes())?;
        println!("Credentials stored");
    }
    if let Some(broker) = broker {
        adapter.write_broker_config(broker.as_bytes())?;
        println!("Broker settings stored");
    }
    for opcode in control {
        match adapter.control(&[opcode])? {
            ControlOutcome::Applied => println!("Control 0x{opcode:02X} applied"),
            ControlOutcome::ConnectionTest { accepted } => {
                println!("Connection test accepted: {accepted}")
            }
            ControlOutcome::Status(json) => println!("{json}"),
        }
    }
    if status {
        println!("{}", adapter.status_json()?);
    }
    Ok(())
}

fn handle_config_command(
    config: &UplinkConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
