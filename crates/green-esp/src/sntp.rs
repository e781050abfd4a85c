//! SNTP-backed wall clock.

use chrono::{DateTime, Utc};
use esp_idf_svc::sntp::{EspSntp, SntpConf};
use green_core::SntpClock;
use log::{info, warn};

/// Keeps the SNTP service alive for as long as the clock exists.
#[derive(Default)]
pub struct EspClock {
    sntp: Option<EspSntp<'static>>,
}

impl EspClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SntpClock for EspClock {
    fn start_sync(&mut self, servers: &[String]) {
        let mut conf = SntpConf::default();
        if servers.len() > conf.servers.len() {
            warn!(
                "Only {} SNTP server(s) supported, ignoring {}",
                conf.servers.len(),
                servers.len() - conf.servers.len()
            );
        }
        for (slot, server) in conf.servers.iter_mut().zip(servers) {
            *slot = server.as_str();
        }

        match EspSntp::new(&conf) {
            Ok(sntp) => {
                info!("SNTP started");
                self.sntp = Some(sntp);
            }
            Err(e) => warn!("Failed to start SNTP: {}", e),
        }
    }

    fn now(&mut self) -> DateTime<Utc> {
        Utc::now()
    }
}
