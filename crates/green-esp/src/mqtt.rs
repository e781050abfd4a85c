//! MQTT session client for ESP32.
//!
//! ESP-IDF's MQTT client connects on construction, so each connect attempt
//! builds a fresh client and waits for the first connection event. Once
//! accepted, the event stream is drained on a background thread so the
//! client never stalls.

use crate::wifi::EspTransport;
use anyhow::{anyhow, Result};
use embedded_svc::mqtt::client::EventPayload;
use esp_idf_svc::mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration};
use green_core::MessagingClient;
use log::{debug, info, warn};

const EVENT_THREAD_STACK: usize = 6 * 1024;

/// MQTT client bound to a broker by [`MessagingClient::begin`].
#[derive(Default)]
pub struct EspMessagingClient {
    url: Option<String>,
    clean_session: bool,
    client: Option<EspMqttClient<'static>>,
}

impl EspMessagingClient {
    pub fn new() -> Self {
        Self {
            clean_session: true,
            ..Default::default()
        }
    }

    /// The connected client, for publishing and subscribing.
    pub fn client_mut(&mut self) -> Option<&mut EspMqttClient<'static>> {
        self.client.as_mut()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn spawn_event_pump(mut connection: EspMqttConnection) -> Result<()> {
        std::thread::Builder::new()
            .name("mqtt-events".into())
            .stack_size(EVENT_THREAD_STACK)
            .spawn(move || {
                while let Ok(event) = connection.next() {
                    debug!("MQTT event: {:?}", event.payload());
                }
                info!("MQTT connection closed");
            })?;
        Ok(())
    }
}

impl MessagingClient<EspTransport> for EspMessagingClient {
    type Error = anyhow::Error;

    fn begin(&mut self, host: &str, port: u16, _transport: &mut EspTransport) {
        // The IDF client opens its own socket over the station netif.
        self.url = Some(format!("mqtt://{}:{}", host, port));
        self.client = None;
    }

    fn set_clean_session(&mut self, clean_session: bool) {
        self.clean_session = clean_session;
    }

    fn connect(&mut self, client_id: &str, username: &str, password: &str) -> Result<()> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("MQTT client used before begin()"))?;

        // Drop the client from a failed attempt before opening a new one.
        self.client = None;

        let conf = MqttClientConfiguration {
            client_id: Some(client_id),
            username: (!username.is_empty()).then_some(username),
            password: (!password.is_empty()).then_some(password),
            disable_clean_session: !self.clean_session,
            ..Default::default()
        };

        let (client, mut connection) = EspMqttClient::new(url, &conf)?;

        loop {
            let event = connection.next()?;
            match event.payload() {
                EventPayload::Connected(session_present) => {
                    info!("MQTT connected to {} (session present: {})", url, session_present);
                    break;
                }
                EventPayload::Disconnected => {
                    return Err(anyhow!("broker {} closed the connection", url));
                }
                EventPayload::Error(e) => {
                    return Err(anyhow!("MQTT error: {:?}", e));
                }
                EventPayload::BeforeConnect => {
                    debug!("MQTT connecting to {}", url);
                }
                other => {
                    warn!("Unexpected MQTT event before connect: {:?}", other);
                }
            }
        }

        Self::spawn_event_pump(connection)?;
        self.client = Some(client);
        Ok(())
    }
}
