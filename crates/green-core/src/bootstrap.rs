//! Connectivity bootstrap.
//!
//! Brings a node from "unconnected" to "WiFi associated + MQTT session
//! open", blocking the caller until both are up. With the default policies
//! there is no failure path: a node without a link has nothing else to do,
//! so it keeps trying.

use crate::config::Secrets;
use crate::link::{MessagingClient, NetworkTransport};
use crate::retry::{retry_until, Delay, RetryError, RetryPolicy};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can only occur with bounded retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BootstrapError {
    #[error("WiFi not connected after {attempts} status polls")]
    Network { attempts: u32 },

    #[error("MQTT session not established after {attempts} connect attempts")]
    Session { attempts: u32 },
}

/// Connection gate holding the credentials and retry policies.
#[derive(Debug)]
pub struct Bootstrapper<'a, D> {
    secrets: &'a Secrets,
    delay: D,
    network_policy: RetryPolicy,
    session_policy: RetryPolicy,
}

impl<'a, D: Delay> Bootstrapper<'a, D> {
    /// Bootstrapper with the default policies: poll WiFi every 500 ms and
    /// retry MQTT every 2000 ms, both forever.
    pub fn new(secrets: &'a Secrets, delay: D) -> Self {
        Self {
            secrets,
            delay,
            network_policy: RetryPolicy::WIFI_POLL,
            session_policy: RetryPolicy::MQTT_CONNECT,
        }
    }

    pub fn with_network_policy(mut self, policy: RetryPolicy) -> Self {
        self.network_policy = policy;
        self
    }

    pub fn with_session_policy(mut self, policy: RetryPolicy) -> Self {
        self.session_policy = policy;
        self
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn into_delay(self) -> D {
        self.delay
    }

    /// Bring up the network link, then the messaging session.
    ///
    /// `node_id` and `clean_session` are handed to the client unmodified.
    /// Returns `Ok(())` once the session is open; with unbounded policies
    /// this never returns an error.
    pub fn connect<N, C>(
        &mut self,
        net: &mut N,
        client: &mut C,
        node_id: &str,
        clean_session: bool,
    ) -> Result<(), BootstrapError>
    where
        N: NetworkTransport,
        C: MessagingClient<N>,
    {
        self.connect_network(net)?;
        self.connect_session(net, client, node_id, clean_session)
    }

    /// Start WiFi association and wait until the link reports connected.
    pub fn connect_network<N: NetworkTransport>(&mut self, net: &mut N) -> Result<(), BootstrapError> {
        let secrets = self.secrets;
        let wifi = &secrets.wifi;
        info!("Connecting to WiFi '{}'...", wifi.ssid);
        net.begin(&wifi.ssid, &wifi.password);

        let attempts = retry_until(&self.network_policy, &mut self.delay, |attempt| {
            let status = net.status();
            if !status.is_connected() {
                debug!(attempt, ?status, "WiFi not connected yet");
            }
            status.is_connected()
        })
        .map_err(|RetryError::Exhausted { attempts }| {
            warn!(attempts, "Giving up on WiFi");
            BootstrapError::Network { attempts }
        })?;

        info!(attempts, "WiFi connected");
        Ok(())
    }

    /// Configure the client for the broker and connect until accepted.
    pub fn connect_session<N, C>(
        &mut self,
        net: &mut N,
        client: &mut C,
        node_id: &str,
        clean_session: bool,
    ) -> Result<(), BootstrapError>
    where
        N: NetworkTransport,
        C: MessagingClient<N>,
    {
        let secrets = self.secrets;
        let broker = &secrets.broker;
        info!(
            "Connecting to MQTT broker {}:{} as '{}' (clean session: {})",
            broker.host, broker.port, node_id, clean_session
        );
        client.begin(&broker.host, broker.port, net);
        client.set_clean_session(clean_session);

        let attempts = retry_until(&self.session_policy, &mut self.delay, |attempt| {
            match client.connect(node_id, &broker.username, &broker.password) {
                Ok(()) => true,
                Err(e) => {
                    debug!(attempt, "MQTT connect failed: {}", e);
                    false
                }
            }
        })
        .map_err(|RetryError::Exhausted { attempts }| {
            warn!(attempts, "Giving up on MQTT broker");
            BootstrapError::Session { attempts }
        })?;

        info!(attempts, "MQTT session established");
        Ok(())
    }
}
