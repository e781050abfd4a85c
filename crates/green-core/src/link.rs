//! External collaborators.
//!
//! The node never speaks WiFi, MQTT, SNTP or HTTP itself. These traits are
//! the seams: `green-esp` implements them over ESP-IDF, [`crate::sim`]
//! implements them for tests and host tooling.
//!
//! All methods are synchronous to match the blocking execution model on
//! the device.

use crate::update::{UpdateError, UpdateOutcome, UpdateRequest};
use chrono::{DateTime, Utc};
use std::fmt::Display;

/// Network link status as reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Radio idle, association not started.
    Idle,
    /// Association or DHCP in progress.
    Connecting,
    /// Associated with an IP address.
    Connected,
    /// The last association attempt failed.
    ConnectFailed,
    /// Link lost.
    Disconnected,
}

impl LinkStatus {
    pub fn is_connected(self) -> bool {
        self == LinkStatus::Connected
    }
}

/// Raw network transport (WiFi station + socket stack).
pub trait NetworkTransport {
    /// Start associating with the given network. Returns immediately.
    fn begin(&mut self, ssid: &str, password: &str);

    /// Current link status.
    fn status(&mut self) -> LinkStatus;
}

/// MQTT-like session client riding on a transport of type `N`.
pub trait MessagingClient<N: NetworkTransport + ?Sized> {
    type Error: Display;

    /// Set the broker address and the transport to use.
    fn begin(&mut self, host: &str, port: u16, transport: &mut N);

    /// Whether the broker should discard prior session state on connect.
    fn set_clean_session(&mut self, clean_session: bool);

    /// Try once to open the session.
    fn connect(&mut self, client_id: &str, username: &str, password: &str) -> Result<(), Self::Error>;
}

/// Wall clock fed by SNTP.
pub trait SntpClock {
    /// Start background synchronisation against `servers`.
    fn start_sync(&mut self, servers: &[String]);

    /// Current wall-clock time (garbage until synchronised).
    fn now(&mut self) -> DateTime<Utc>;
}

/// HTTP(S) OTA update mechanism.
pub trait FirmwareUpdater {
    /// Fetch and install the image described by `request`.
    ///
    /// `Ok(UpdateOutcome::Updated)` means a new image is staged for the next
    /// boot; the caller decides when to restart.
    fn update(&mut self, request: &UpdateRequest) -> Result<UpdateOutcome, UpdateError>;
}
