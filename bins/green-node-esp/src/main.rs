//! Green node firmware for ESP32.
//!
//! This binary requires the ESP32 Rust toolchain.
//!
//! Boot sequence: bring up WiFi and the MQTT session (blocking until both
//! are up), sync the clock, check for a firmware update, then publish a
//! heartbeat. Credentials are baked in at compile time from `GREEN_*`
//! environment variables.

use embedded_svc::mqtt::client::QoS;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::{peripherals::Peripherals, reset};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use green_core::config::{NodeConfig, SntpConfig, UpdateServer};
use green_core::{
    set_clock, update_firmware, Bootstrapper, BrokerConfig, Delay, RetryPolicy, Secrets,
    UpdateOutcome, WifiCredentials,
};
use green_esp::{mqtt::EspMessagingClient, ota::EspUpdater, sntp::EspClock, wifi::EspTransport, FreeRtosDelay};
use log::{error, info, warn};

const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
const HEARTBEAT_MS: u32 = 60_000;

fn node_config() -> anyhow::Result<NodeConfig> {
    let port = match option_env!("GREEN_MQTT_PORT") {
        Some(raw) => raw.parse()?,
        None => green_core::config::DEFAULT_MQTT_PORT,
    };

    let config = NodeConfig {
        secrets: Secrets {
            wifi: WifiCredentials {
                ssid: option_env!("GREEN_WIFI_SSID").unwrap_or_default().to_string(),
                password: option_env!("GREEN_WIFI_PASSWORD").unwrap_or_default().to_string(),
            },
            broker: BrokerConfig {
                host: option_env!("GREEN_MQTT_HOST").unwrap_or_default().to_string(),
                port,
                username: option_env!("GREEN_MQTT_USERNAME").unwrap_or_default().to_string(),
                password: option_env!("GREEN_MQTT_PASSWORD").unwrap_or_default().to_string(),
            },
        },
        update: UpdateServer {
            url: option_env!("GREEN_UPDATE_URL").unwrap_or_default().to_string(),
        },
        sntp: SntpConfig::default(),
    };
    config.secrets.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let node_id = option_env!("GREEN_NODE_ID").unwrap_or("green-node");
    let node_type = option_env!("GREEN_NODE_TYPE").unwrap_or("generic");
    info!("Green node '{}' ({} v{}) starting", node_id, node_type, FIRMWARE_VERSION);

    let config = node_config()?;
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let mut net = EspTransport::new(peripherals.modem, sysloop, Some(nvs))?;
    let mut client = EspMessagingClient::new();
    Bootstrapper::new(&config.secrets, FreeRtosDelay).connect(&mut net, &mut client, node_id, true)?;

    let mut clock = EspClock::new();
    set_clock(&mut clock, &mut FreeRtosDelay, &config.sntp, &RetryPolicy::SNTP_POLL)?;

    if config.update.url.is_empty() {
        info!("No update server configured, skipping OTA check");
    } else {
        match update_firmware(&mut EspUpdater, &config.update, node_type, FIRMWARE_VERSION) {
            Ok(UpdateOutcome::Updated) => {
                info!("Restarting into new firmware");
                reset::restart();
            }
            Ok(UpdateOutcome::NoUpdate) => {}
            Err(e) => error!("OTA check failed: {}", e),
        }
    }

    let topic = format!("green/{}/status", node_id);
    loop {
        if let Some(mqtt) = client.client_mut() {
            let payload = format!("online v{}", FIRMWARE_VERSION);
            if let Err(e) = mqtt.enqueue(&topic, QoS::AtLeastOnce, false, payload.as_bytes()) {
                warn!("Heartbeat publish failed: {}", e);
            }
        }
        FreeRtosDelay.delay_ms(HEARTBEAT_MS);
    }
}
