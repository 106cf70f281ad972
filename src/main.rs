//! midi2pico8 - Rust implementation
//!
//! Turns a MIDI controller into a PICO-8 keyboard.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midi2pico8::config::{self, DEFAULT_CONFIG_FILE};
use midi2pico8::device::{discovery, MidiDevice, PACKET_QUEUE};
use midi2pico8::inject::platform_sink;
use midi2pico8::keymap::{KeyTable, Keymap};
use midi2pico8::midi::format_hex;
use midi2pico8::router::Router;

/// How often the device is looked for, before and after connecting
const PRESENCE_POLL: Duration = Duration::from_millis(200);

/// midi2pico8 - Play PICO-8 with a MIDI controller
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Input port name (case-insensitive substring); first port if omitted
    #[arg(short, long, env = "MIDI_PORT")]
    port: Option<String>,

    /// List available MIDI input ports
    #[arg(long)]
    list_ports: bool,

    /// Log key actions instead of injecting them
    #[arg(long)]
    dry_run: bool,

    /// Echo every incoming MIDI message
    #[arg(long)]
    log_midi: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    if args.list_ports {
        discovery::print_ports()?;
        return Ok(());
    }

    info!("Starting midi2pico8 v{}...", env!("CARGO_PKG_VERSION"));

    let keys = KeyTable::builtin();
    let mut router_config = config::load_or_default(&args.config, &keys).await;
    if args.log_midi {
        router_config.log_midi_messages = true;
    }

    if args.dump_config {
        println!("{}", router_config.to_file(&keys).to_json_string()?);
        return Ok(());
    }

    let keymap = Keymap::new(keys, platform_sink(args.dry_run));
    let router = Router::new(router_config, keymap);
    info!("Router initialized");

    run_app(router, args.port.as_deref(), shutdown_signal()).await?;

    info!("midi2pico8 shutdown complete");
    Ok(())
}

async fn run_app(
    router: Router,
    pattern: Option<&str>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);

    let port_name = tokio::select! {
        name = MidiDevice::wait_for_port(pattern, PRESENCE_POLL) => name?,
        _ = &mut shutdown => return Ok(()),
    };

    let (packet_tx, mut packet_rx) = mpsc::channel(PACKET_QUEUE);
    let device = MidiDevice::connect(&port_name, packet_tx)?;
    info!("Ready to process MIDI events!");

    let mut presence = tokio::time::interval(PRESENCE_POLL);

    loop {
        tokio::select! {
            Some(packet) = packet_rx.recv() => {
                debug!(timestamp_us = packet.timestamp_us, "MIDI in: {}", format_hex(&packet.bytes));
                router.handle_bytes(&packet.bytes);
            }

            _ = presence.tick() => {
                if !device.is_present() {
                    info!("MIDI device '{}' disconnected", device.port_name());
                    break;
                }
            }

            _ = &mut shutdown => {
                break;
            }
        }
    }

    info!("Shutting down...");
    drop(device);

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
