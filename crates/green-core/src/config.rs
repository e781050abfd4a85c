//! Node configuration and secrets.
//!
//! Credentials are held in an explicit [`Secrets`] value built once at
//! startup and passed by reference to whatever needs them. Where the values
//! come from is platform-specific:
//! - Host: JSON file ([`JsonFileSecrets`]) or environment ([`EnvSecrets`])
//! - ESP32: compile-time constants in the firmware binary

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest SSID accepted by the WiFi stack.
pub const MAX_SSID_LEN: usize = 32;

/// Longest WPA passphrase accepted by the WiFi stack.
pub const MAX_WIFI_PASSWORD_LEN: usize = 64;

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value is missing.
    #[error("Configuration not found: {0}")]
    NotFound(String),

    /// Failed to read configuration.
    #[error("Read error: {0}")]
    ReadError(String),

    /// Configuration data is invalid.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// WiFi network credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    /// Network name (cannot be empty).
    pub ssid: String,

    /// Network password (empty for open networks).
    #[serde(default)]
    pub password: String,
}

/// MQTT broker address and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_MQTT_PORT,
            username: String::new(),
            password: String::new(),
        }
    }
}

/// Everything the bootstrapper needs to reach the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secrets {
    pub wifi: WifiCredentials,
    pub broker: BrokerConfig,
}

impl Secrets {
    /// Parse secrets from a JSON document and validate them.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let secrets: Secrets =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidData(e.to_string()))?;
        secrets.validate()?;
        Ok(secrets)
    }

    /// Check the limits imposed by the WiFi stack and the broker address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi.ssid.is_empty() {
            return Err(ConfigError::InvalidData("WiFi SSID cannot be empty".into()));
        }
        if self.wifi.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::InvalidData(format!(
                "SSID too long ({} bytes, max {})",
                self.wifi.ssid.len(),
                MAX_SSID_LEN
            )));
        }
        if self.wifi.password.len() > MAX_WIFI_PASSWORD_LEN {
            return Err(ConfigError::InvalidData(format!(
                "WiFi password too long ({} bytes, max {})",
                self.wifi.password.len(),
                MAX_WIFI_PASSWORD_LEN
            )));
        }
        if self.broker.host.is_empty() {
            return Err(ConfigError::InvalidData("MQTT broker host cannot be empty".into()));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidData("MQTT broker port cannot be 0".into()));
        }
        Ok(())
    }
}

/// Source of [`Secrets`].
pub trait SecretsProvider {
    /// Load and validate secrets.
    fn load_secrets(&self) -> Result<Secrets, ConfigError>;
}

impl SecretsProvider for Secrets {
    fn load_secrets(&self) -> Result<Secrets, ConfigError> {
        self.validate()?;
        Ok(self.clone())
    }
}

/// Secrets stored as a JSON file.
///
/// ```json
/// {
///   "wifi": { "ssid": "greenhouse", "password": "..." },
///   "broker": { "host": "10.0.0.2", "port": 1883, "username": "node", "password": "..." }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileSecrets {
    path: PathBuf,
}

impl JsonFileSecrets {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SecretsProvider for JsonFileSecrets {
    fn load_secrets(&self) -> Result<Secrets, ConfigError> {
        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(self.path.display().to_string())
            } else {
                ConfigError::ReadError(format!("{}: {}", self.path.display(), e))
            }
        })?;
        Secrets::from_json_str(&json)
    }
}

/// Secrets read from environment variables.
///
/// With the default prefix `GREEN` the variables are `GREEN_WIFI_SSID`,
/// `GREEN_WIFI_PASSWORD`, `GREEN_MQTT_HOST`, `GREEN_MQTT_PORT`,
/// `GREEN_MQTT_USERNAME` and `GREEN_MQTT_PASSWORD`. Passwords, username and
/// port are optional.
#[derive(Debug, Clone)]
pub struct EnvSecrets {
    prefix: String,
}

impl Default for EnvSecrets {
    fn default() -> Self {
        Self::with_prefix("GREEN")
    }
}

impl EnvSecrets {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}_{}", self.prefix, name)).ok()
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.var(name)
            .ok_or_else(|| ConfigError::NotFound(format!("{}_{}", self.prefix, name)))
    }
}

impl SecretsProvider for EnvSecrets {
    fn load_secrets(&self) -> Result<Secrets, ConfigError> {
        let port = match self.var("MQTT_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| {
                ConfigError::InvalidData(format!("{}_MQTT_PORT={}: {}", self.prefix, raw, e))
            })?,
            None => DEFAULT_MQTT_PORT,
        };

        let secrets = Secrets {
            wifi: WifiCredentials {
                ssid: self.required("WIFI_SSID")?,
                password: self.var("WIFI_PASSWORD").unwrap_or_default(),
            },
            broker: BrokerConfig {
                host: self.required("MQTT_HOST")?,
                port,
                username: self.var("MQTT_USERNAME").unwrap_or_default(),
                password: self.var("MQTT_PASSWORD").unwrap_or_default(),
            },
        };
        secrets.validate()?;
        Ok(secrets)
    }
}

/// OTA update server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateServer {
    /// Base URL; the node type is appended as the last path segment.
    pub url: String,
}

/// SNTP settings for [`crate::clock::set_clock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SntpConfig {
    #[serde(default = "default_sntp_servers")]
    pub servers: Vec<String>,

    /// The clock counts as synchronised once it reads at least this many
    /// seconds after the Unix epoch.
    #[serde(default = "default_min_valid_epoch_secs")]
    pub min_valid_epoch_secs: i64,
}

fn default_sntp_servers() -> Vec<String> {
    vec!["pool.ntp.org".to_string(), "time.nist.gov".to_string()]
}

fn default_min_valid_epoch_secs() -> i64 {
    8 * 3600 * 2
}

impl Default for SntpConfig {
    fn default() -> Self {
        Self {
            servers: default_sntp_servers(),
            min_valid_epoch_secs: default_min_valid_epoch_secs(),
        }
    }
}

/// Full node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub secrets: Secrets,

    #[serde(default)]
    pub update: UpdateServer,

    #[serde(default)]
    pub sntp: SntpConfig,
}

impl NodeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidData(e.to_string()))?;
        config.secrets.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn sample_secrets() -> Secrets {
        Secrets {
            wifi: WifiCredentials {
                ssid: "greenhouse".to_string(),
                password: "hunter22".to_string(),
            },
            broker: BrokerConfig {
                host: "broker.local".to_string(),
                port: 8883,
                username: "node".to_string(),
                password: "secret".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_secrets() {
        assert!(sample_secrets().validate().is_ok());
    }

    #[test]
    fn test_open_network_allowed() {
        let mut secrets = sample_secrets();
        secrets.wifi.password.clear();
        assert!(secrets.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_secrets() {
        let mut empty_ssid = sample_secrets();
        empty_ssid.wifi.ssid.clear();
        assert!(matches!(empty_ssid.validate(), Err(ConfigError::InvalidData(_))));

        let mut long_ssid = sample_secrets();
        long_ssid.wifi.ssid = "x".repeat(MAX_SSID_LEN + 1);
        assert!(long_ssid.validate().is_err());

        let mut long_password = sample_secrets();
        long_password.wifi.password = "x".repeat(MAX_WIFI_PASSWORD_LEN + 1);
        assert!(long_password.validate().is_err());

        let mut no_host = sample_secrets();
        no_host.broker.host.clear();
        assert!(no_host.validate().is_err());

        let mut zero_port = sample_secrets();
        zero_port.broker.port = 0;
        assert!(zero_port.validate().is_err());
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{"wifi":{"ssid":"greenhouse"},"broker":{"host":"10.0.0.2"}}"#;
        let secrets = Secrets::from_json_str(json).unwrap();

        assert_eq!(secrets.wifi.password, "");
        assert_eq!(secrets.broker.port, DEFAULT_MQTT_PORT);
        assert_eq!(secrets.broker.username, "");
    }

    #[test]
    fn test_json_invalid() {
        assert!(matches!(
            Secrets::from_json_str("{not json"),
            Err(ConfigError::InvalidData(_))
        ));
        assert!(Secrets::from_json_str(r#"{"wifi":{"ssid":""},"broker":{"host":"h"}}"#).is_err());
    }

    #[test]
    fn test_json_file_provider() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&sample_secrets()).unwrap()).unwrap();

        let loaded = JsonFileSecrets::new(file.path()).load_secrets().unwrap();
        assert_eq!(loaded, sample_secrets());
    }

    #[test]
    fn test_json_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let provider = JsonFileSecrets::new(dir.path().join("secrets.json"));
        assert!(matches!(provider.load_secrets(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_env_provider() {
        // Unique prefix so parallel tests never share variables.
        let prefix = "GREEN_TEST_ENV_PROVIDER";
        std::env::set_var(format!("{prefix}_WIFI_SSID"), "greenhouse");
        std::env::set_var(format!("{prefix}_MQTT_HOST"), "broker.local");
        std::env::set_var(format!("{prefix}_MQTT_PORT"), "8883");
        std::env::set_var(format!("{prefix}_MQTT_USERNAME"), "node");

        let secrets = EnvSecrets::with_prefix(prefix).load_secrets().unwrap();
        assert_eq!(secrets.wifi.ssid, "greenhouse");
        assert_eq!(secrets.wifi.password, "");
        assert_eq!(secrets.broker.host, "broker.local");
        assert_eq!(secrets.broker.port, 8883);
        assert_eq!(secrets.broker.username, "node");
    }

    #[test]
    fn test_env_provider_missing_and_invalid() {
        let prefix = "GREEN_TEST_ENV_MISSING";
        assert!(matches!(
            EnvSecrets::with_prefix(prefix).load_secrets(),
            Err(ConfigError::NotFound(name)) if name == "GREEN_TEST_ENV_MISSING_WIFI_SSID"
        ));

        let prefix = "GREEN_TEST_ENV_BAD_PORT";
        std::env::set_var(format!("{prefix}_WIFI_SSID"), "greenhouse");
        std::env::set_var(format!("{prefix}_MQTT_HOST"), "broker.local");
        std::env::set_var(format!("{prefix}_MQTT_PORT"), "not-a-port");
        assert!(matches!(
            EnvSecrets::with_prefix(prefix).load_secrets(),
            Err(ConfigError::InvalidData(_))
        ));
    }

    #[test]
    fn test_node_config_defaults() {
        let json = r#"{
            "secrets": {"wifi":{"ssid":"greenhouse"},"broker":{"host":"10.0.0.2"}},
            "update": {"url": "https://updates.example.org/firmware"}
        }"#;
        let config = NodeConfig::from_json_str(json).unwrap();

        assert_eq!(config.update.url, "https://updates.example.org/firmware");
        assert_eq!(config.sntp, SntpConfig::default());
        assert_eq!(config.sntp.min_valid_epoch_secs, 57_600);
        assert_eq!(config.sntp.servers, vec!["pool.ntp.org", "time.nist.gov"]);
    }
}
