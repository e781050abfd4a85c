//! # green-core
//!
//! Connectivity and firmware helpers for ESP-class sensor nodes.
//!
//! This crate provides:
//! - A blocking WiFi + MQTT bootstrap gate with fixed-interval retries
//! - The CRC32 (MPEG-2 variant) used to check firmware images
//! - SNTP clock sync and OTA update entry points
//! - Simulated collaborators for host-side tests and tooling
//!
//! This crate is intentionally runtime-agnostic and contains no async code.
//! The radio, MQTT client, SNTP and OTA machinery are reached through the
//! traits in [`link`], implemented on the device by `green-esp`.

pub mod bootstrap;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod link;
pub mod retry;
pub mod sim;
pub mod update;

pub use bootstrap::{BootstrapError, Bootstrapper};
pub use checksum::{calculate_crc32, parse_crc32_hex, verify_crc32, ChecksumMismatch, Crc32};
pub use clock::{set_clock, ClockError};
pub use config::{BrokerConfig, ConfigError, NodeConfig, Secrets, SecretsProvider, WifiCredentials};
pub use link::{FirmwareUpdater, LinkStatus, MessagingClient, NetworkTransport, SntpClock};
pub use retry::{retry_until, Delay, PollCadence, RetryError, RetryPolicy, StdDelay};
pub use update::{update_firmware, UpdateError, UpdateOutcome, UpdateRequest};
