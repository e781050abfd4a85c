//! Over-the-air firmware update.
//!
//! The node asks the update server for the image of its node type, sending
//! its running version so the server can answer "nothing newer". Fetching,
//! TLS and flashing belong to the [`FirmwareUpdater`] implementation.

use crate::checksum::ChecksumMismatch;
use crate::config::UpdateServer;
use crate::link::FirmwareUpdater;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// One update check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    /// Full image URL for this node type.
    pub url: String,
    pub node_type: String,
    /// Version currently running on the node.
    pub firmware_version: String,
}

impl UpdateRequest {
    /// Build the request for `node_type` against `server`.
    pub fn new(
        server: &UpdateServer,
        node_type: &str,
        firmware_version: &str,
    ) -> Result<Self, UpdateError> {
        let base = server.url.trim_end_matches('/');
        let host = base
            .strip_prefix("https://")
            .or_else(|| base.strip_prefix("http://"))
            .ok_or_else(|| {
                UpdateError::InvalidRequest(format!(
                    "update server URL must be http(s): '{}'",
                    server.url
                ))
            })?;
        if host.is_empty() {
            return Err(UpdateError::InvalidRequest("update server URL has no host".into()));
        }
        // Exactly one path segment, never "." or "..".
        if node_type.is_empty()
            || !node_type.chars().all(is_path_safe)
            || node_type.chars().all(|c| c == '.')
        {
            return Err(UpdateError::InvalidRequest(format!(
                "invalid node type '{}'",
                node_type
            )));
        }
        if firmware_version.trim().is_empty() {
            return Err(UpdateError::InvalidRequest("firmware version cannot be empty".into()));
        }
        // The version travels as an HTTP header value.
        if firmware_version.chars().any(char::is_control) {
            return Err(UpdateError::InvalidRequest(format!(
                "firmware version contains control characters: {:?}",
                firmware_version
            )));
        }

        Ok(Self {
            url: format!("{}/{}", base, node_type),
            node_type: node_type.to_string(),
            firmware_version: firmware_version.to_string(),
        })
    }

    pub fn is_tls(&self) -> bool {
        self.url.starts_with("https://")
    }
}

fn is_path_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Result of a successful update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateOutcome {
    /// A new image was written and will boot on restart.
    Updated,
    /// The server has nothing newer than the running version.
    NoUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    /// The request could not be built from the inputs.
    #[error("Invalid update request: {0}")]
    InvalidRequest(String),

    /// The updater reported a failure (HTTP status, TLS or flash error).
    #[error("Update failed ({code}): {message}")]
    Failed { code: i32, message: String },

    /// The downloaded image did not match the checksum announced by the server.
    #[error("Downloaded image rejected: {0}")]
    Checksum(#[from] ChecksumMismatch),
}

/// Check for and install a firmware update for this node.
pub fn update_firmware<U>(
    updater: &mut U,
    server: &UpdateServer,
    node_type: &str,
    firmware_version: &str,
) -> Result<UpdateOutcome, UpdateError>
where
    U: FirmwareUpdater + ?Sized,
{
    let request = UpdateRequest::new(server, node_type, firmware_version)?;
    info!(
        "Checking for firmware update: {} (running {})",
        request.url, request.firmware_version
    );

    match updater.update(&request) {
        Ok(UpdateOutcome::Updated) => {
            info!("Firmware updated, new image boots on restart");
            Ok(UpdateOutcome::Updated)
        }
        Ok(UpdateOutcome::NoUpdate) => {
            info!("Firmware is up to date");
            Ok(UpdateOutcome::NoUpdate)
        }
        Err(e) => {
            warn!("Firmware update failed: {}", e);
            Err(e)
        }
    }
}
