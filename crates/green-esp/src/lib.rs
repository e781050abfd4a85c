//! ESP-IDF adapters for green nodes.
//!
//! This crate implements the collaborator traits of `green-core` on top of
//! `esp-idf-svc`:
//! - [`wifi::EspTransport`]: WiFi station ([`green_core::NetworkTransport`])
//! - [`mqtt::EspMessagingClient`]: MQTT session ([`green_core::MessagingClient`])
//! - [`sntp::EspClock`]: SNTP wall clock ([`green_core::SntpClock`])
//! - [`ota::EspUpdater`]: HTTP(S) OTA into the inactive app partition
//! - [`FreeRtosDelay`]: task delay ([`green_core::Delay`])
//!
//! # Example
//!
//! ```ignore
//! use green_core::Bootstrapper;
//! use green_esp::{mqtt::EspMessagingClient, wifi::EspTransport, FreeRtosDelay};
//!
//! let mut net = EspTransport::new(peripherals.modem, sysloop, Some(nvs))?;
//! let mut client = EspMessagingClient::new();
//! Bootstrapper::new(&secrets, FreeRtosDelay).connect(&mut net, &mut client, "node-1", true)?;
//! ```

pub mod mqtt;
pub mod ota;
pub mod sntp;
pub mod wifi;

use esp_idf_svc::hal::delay::FreeRtos;
use green_core::Delay;

/// Blocks the calling FreeRTOS task.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeRtosDelay;

impl Delay for FreeRtosDelay {
    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}
