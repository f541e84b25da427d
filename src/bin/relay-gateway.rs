//! Relay gateway - companion side of the relay path
//!
//! Owns the network link and the broker session on behalf of a main unit
//! attached over a serial port. Frames from the main unit are served every
//! tick; the configuration console reads commands from stdin.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{error, info, warn};
use uplink::config::UplinkConfig;
use uplink::observability::{init_default_logging, relay_span};
use uplink::relay::{open_serial, RelayGateway};
use uplink::storage::{FileStore, SharedStore};
use uplink::transport::{HostRadio, MqttBrokerClient};
use uplink::uplink::DirectUplinkBuilder;
use uplink::{ConnectionStatus, SystemClock};

/// Companion-chip gateway for relay-mode devices
#[derive(Parser)]
#[command(name = "relay-gateway")]
#[command(about = "Serve relay frames from a main unit and publish them to the broker")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "UPLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device attached to the main unit (overrides relay.port)
    #[arg(long)]
    port: Option<String>,

    /// Baud rate (overrides relay.baud_rate)
    #[arg(long)]
    baud: Option<u32>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_default_logging();

    if let Err(e) = run(args).await {
        error!("Gateway failed: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => UplinkConfig::load_from_file(path)?,
        None => UplinkConfig::default(),
    };
    if let Some(port) = args.port {
        config.relay.port = port;
    }
    if let Some(baud) = args.baud {
        config.relay.baud_rate = baud;
    }

    info!(
        "Starting relay gateway v{} for {} on {}",
        env!("CARGO_PKG_VERSION"),
        config.device.id,
        config.relay.port
    );

    let store: SharedStore = Arc::new(FileStore::open(&config.device.store_path)?);
    let uplink = DirectUplinkBuilder::new(
        config.clone(),
        HostRadio::new(),
        MqttBrokerClient::new(Handle::current()),
        Arc::clone(&store),
        SystemClock::new(),
    )
    .with_link_observer(Box::new(|status: ConnectionStatus| {
        info!("WiFi status: {}", status)
    }))
    .with_broker_observer(Box::new(|status: ConnectionStatus| {
        info!("MQTT status: {}", status)
    }))
    .init();

    let transport = open_serial(&config.relay.port, config.relay.baud_rate)?;
    let mut gateway = RelayGateway::new(transport, uplink, store, &config.relay);

    let mut interval = tokio::time::interval(Duration::from_millis(config.device.tick_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut console = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    println!("Relay gateway ready. Type 'help' for commands.");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let span = relay_span!(port = %config.relay.port);
                let _guard = span.enter();
                gateway.tick();
            }
            line = console.next_line(), if console_open => match line {
                Ok(Some(line)) => {
                    for output in gateway.handle_console_line(&line) {
                        println!("{output}");
                    }
                }
                Ok(None) => console_open = false,
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    console_open = false;
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

    Ok(())
}
