//! WiFi station transport for ESP32.

use anyhow::{bail, Result};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, peripheral},
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi},
};
use green_core::{LinkStatus, NetworkTransport, PollCadence};
use std::num::NonZeroU32;
use log::{error, info, warn};

/// Status polls between two reconnect requests while the link is down.
const RECONNECT_EVERY_POLLS: NonZeroU32 = match NonZeroU32::new(20) {
    Some(n) => n,
    None => unreachable!(),
};

/// WiFi station driven through non-blocking ESP-IDF calls so the
/// bootstrapper can own the polling loop.
pub struct EspTransport {
    wifi: Box<EspWifi<'static>>,
    /// Kept from `begin` so a failed start can be retried.
    credentials: Option<(String, String)>,
    failed: bool,
    reconnect: PollCadence,
    reported_ip: bool,
}

impl EspTransport {
    pub fn new(
        modem: impl peripheral::Peripheral<P = Modem> + 'static,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self> {
        let wifi = EspWifi::new(modem, sysloop, nvs)?;
        Ok(Self {
            wifi: Box::new(wifi),
            credentials: None,
            failed: false,
            reconnect: PollCadence::new(RECONNECT_EVERY_POLLS),
            reported_ip: false,
        })
    }

    /// Underlying driver, e.g. to read the station netif.
    pub fn wifi(&self) -> &EspWifi<'static> {
        &self.wifi
    }

    fn configure_and_start(&mut self, ssid: &str, password: &str) -> Result<()> {
        if ssid.is_empty() {
            bail!("WiFi SSID cannot be empty");
        }

        let auth_method = if password.is_empty() {
            info!("WiFi password is empty, using open network");
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("SSID too long (max 32 chars)"))?,
                password: password
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("Password too long (max 64 chars)"))?,
                auth_method,
                ..Default::default()
            }))?;

        self.wifi.start()?;
        self.wifi.connect()?;
        Ok(())
    }

    /// Configure and start the station with the credentials from `begin`.
    fn start(&mut self) {
        let Some((ssid, password)) = self.credentials.take() else {
            return;
        };
        match self.configure_and_start(&ssid, &password) {
            Ok(()) => {
                info!("Connecting to '{}'...", ssid);
                self.failed = false;
            }
            Err(e) => {
                error!("Failed to start WiFi: {}", e);
                self.failed = true;
            }
        }
        self.credentials = Some((ssid, password));
    }

    fn log_ip_info(&mut self) {
        if self.reported_ip {
            return;
        }
        match self.wifi.sta_netif().get_ip_info() {
            Ok(ip_info) => {
                info!("WiFi connected!");
                info!("  IP address: {}", ip_info.ip);
                info!("  Gateway:    {}", ip_info.subnet.gateway);
                info!("  Netmask:    {}", ip_info.subnet.mask);
                self.reported_ip = true;
            }
            Err(e) => warn!("WiFi up but no IP info: {}", e),
        }
    }
}

impl NetworkTransport for EspTransport {
    fn begin(&mut self, ssid: &str, password: &str) {
        self.credentials = Some((ssid.to_string(), password.to_string()));
        self.reported_ip = false;
        self.reconnect.reset();
        self.start();
    }

    fn status(&mut self) -> LinkStatus {
        if self.credentials.is_none() {
            return LinkStatus::Idle;
        }
        if self.failed {
            if self.reconnect.tick() {
                info!("Retrying WiFi start");
                self.start();
            }
            return if self.failed {
                LinkStatus::ConnectFailed
            } else {
                LinkStatus::Connecting
            };
        }

        // `is_up` also requires a DHCP lease.
        match (self.wifi.is_connected(), self.wifi.is_up()) {
            (Ok(true), Ok(true)) => {
                self.log_ip_info();
                LinkStatus::Connected
            }
            (Ok(true), _) => LinkStatus::Connecting,
            (Ok(false), _) => {
                if self.reconnect.tick() {
                    if let Err(e) = self.wifi.connect() {
                        warn!("WiFi reconnect request failed: {}", e);
                    }
                }
                if self.reported_ip {
                    LinkStatus::Disconnected
                } else {
                    LinkStatus::Connecting
                }
            }
            (Err(e), _) => {
                warn!("WiFi status unavailable: {}", e);
                LinkStatus::ConnectFailed
            }
        }
    }
}
