//! Host-side companion for green nodes.
//!
//! - `crc` computes the image checksum exactly as the node does
//! - `check-secrets` validates a secrets file before it is baked into firmware
//! - `simulate` runs the connectivity bootstrap against simulated hardware

use anyhow::Context;
use clap::{Parser, Subcommand};
use green_core::config::{JsonFileSecrets, SecretsProvider};
use green_core::sim::{RecordingDelay, SimClient, SimTransport};
use green_core::{calculate_crc32, parse_crc32_hex, verify_crc32, Bootstrapper, Secrets};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "green-tool", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the CRC32 of a firmware image.
    Crc {
        file: PathBuf,

        /// Fail unless the checksum equals this value (hex, `0x` optional).
        #[arg(long)]
        expect: Option<String>,
    },

    /// Load and validate a secrets JSON file.
    CheckSecrets { file: PathBuf },

    /// Run the bootstrap against simulated WiFi and MQTT.
    Simulate {
        /// Status polls that report "not connected" before the link comes up.
        #[arg(long, default_value_t = 3)]
        link_failures: u32,

        /// Connect attempts the broker rejects before accepting.
        #[arg(long, default_value_t = 2)]
        session_failures: u32,

        #[arg(long, default_value = "green-sim-node")]
        node_id: String,

        /// Keep prior session state on the broker.
        #[arg(long)]
        dirty_session: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,green_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::Crc { file, expect } => crc(file, expect),
        Command::CheckSecrets { file } => check_secrets(file),
        Command::Simulate {
            link_failures,
            session_failures,
            node_id,
            dirty_session,
        } => simulate(link_failures, session_failures, &node_id, !dirty_session),
    }
}

fn crc(file: PathBuf, expect: Option<String>) -> anyhow::Result<()> {
    let image = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    let crc = calculate_crc32(&image);
    println!("0x{:08X}  {} ({} bytes)", crc, file.display(), image.len());

    if let Some(expected) = expect {
        verify_crc32(&image, parse_hex_u32(&expected)?)?;
        tracing::info!("Checksum matches");
    }
    Ok(())
}

fn parse_hex_u32(raw: &str) -> anyhow::Result<u32> {
    parse_crc32_hex(raw).with_context(|| format!("'{}' is not a 32-bit hex value", raw))
}

fn check_secrets(file: PathBuf) -> anyhow::Result<()> {
    let secrets = JsonFileSecrets::new(&file).load_secrets()?;
    println!(
        "OK: WiFi '{}' ({}), broker {}:{}{}",
        secrets.wifi.ssid,
        if secrets.wifi.password.is_empty() { "open" } else { "WPA2" },
        secrets.broker.host,
        secrets.broker.port,
        if secrets.broker.username.is_empty() {
            String::new()
        } else {
            format!(" as '{}'", secrets.broker.username)
        }
    );
    Ok(())
}

fn simulate(
    link_failures: u32,
    session_failures: u32,
    node_id: &str,
    clean_session: bool,
) -> anyhow::Result<()> {
    let secrets = Secrets {
        wifi: green_core::WifiCredentials {
            ssid: "sim-ap".to_string(),
            password: "sim-password".to_string(),
        },
        broker: green_core::BrokerConfig {
            host: "sim-broker".to_string(),
            ..Default::default()
        },
    };
    let mut net = SimTransport::connected_after(link_failures);
    let mut client = SimClient::accepting_after(session_failures);
    let mut boot = Bootstrapper::new(&secrets, RecordingDelay::default());

    boot.connect(&mut net, &mut client, node_id, clean_session)?;
    let delay = boot.into_delay();

    println!("status polls:     {}", net.status_polls());
    println!("connect attempts: {}", client.connect_attempts());
    println!("simulated wait:   {} ms", delay.total_ms());
    Ok(())
}
