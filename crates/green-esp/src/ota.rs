//! HTTP(S) OTA updater for ESP32.
//!
//! Streams the image into the inactive app partition. The server answers
//! `304 Not Modified` when the running version is current. If it announces a
//! checksum in `x-firmware-crc32`, the streamed image must match it before
//! the partition is marked bootable.

use embedded_svc::http::client::Client;
use embedded_svc::http::{Headers, Method};
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
use esp_idf_svc::io::Read;
use esp_idf_svc::ota::EspOta;
use esp_idf_svc::sys::EspError;
use green_core::{parse_crc32_hex, Crc32, FirmwareUpdater, UpdateError, UpdateOutcome, UpdateRequest};
use log::{info, warn};

const CHUNK_SIZE: usize = 1024;

pub const VERSION_HEADER: &str = "x-firmware-version";
pub const NODE_TYPE_HEADER: &str = "x-node-type";
pub const CRC32_HEADER: &str = "x-firmware-crc32";

#[derive(Debug, Default, Clone, Copy)]
pub struct EspUpdater;

fn esp_failure(e: EspError) -> UpdateError {
    UpdateError::Failed {
        code: e.code(),
        message: e.to_string(),
    }
}

impl FirmwareUpdater for EspUpdater {
    fn update(&mut self, request: &UpdateRequest) -> Result<UpdateOutcome, UpdateError> {
        let connection = EspHttpConnection::new(&Configuration {
            crt_bundle_attach: if request.is_tls() {
                Some(esp_idf_svc::sys::esp_crt_bundle_attach)
            } else {
                None
            },
            ..Default::default()
        })
        .map_err(esp_failure)?;
        let mut client = Client::wrap(connection);

        let headers = [
            (VERSION_HEADER, request.firmware_version.as_str()),
            (NODE_TYPE_HEADER, request.node_type.as_str()),
        ];
        let mut response = client
            .request(Method::Get, &request.url, &headers)
            .map_err(esp_failure)?
            .submit()
            .map_err(esp_failure)?;

        let status = response.status();
        match status {
            200 => {}
            304 => return Ok(UpdateOutcome::NoUpdate),
            code => {
                return Err(UpdateError::Failed {
                    code: i32::from(code),
                    message: format!("unexpected HTTP status from {}", request.url),
                })
            }
        }

        let expected_crc = response.header(CRC32_HEADER).and_then(parse_crc32_hex);
        info!(
            "Downloading {} ({} bytes)",
            request.url,
            response
                .content_len()
                .map(|len| len.to_string())
                .unwrap_or_else(|| "unknown".into())
        );

        let mut ota = EspOta::new().map_err(esp_failure)?;
        let mut update = ota.initiate_update().map_err(esp_failure)?;
        let mut digest = Crc32::new();
        let mut buf = [0u8; CHUNK_SIZE];

        loop {
            let read = match response.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = update.abort();
                    return Err(esp_failure(e.0));
                }
            };
            digest.update(&buf[..read]);
            if let Err(e) = update.write(&buf[..read]) {
                let _ = update.abort();
                return Err(esp_failure(e));
            }
        }

        let written = digest.len();
        let checked = match expected_crc {
            Some(expected) => digest.verify(expected),
            None => Ok(digest.finalize()),
        };
        let actual = match checked {
            Ok(actual) => actual,
            Err(mismatch) => {
                warn!("Image checksum mismatch, discarding download");
                let _ = update.abort();
                return Err(mismatch.into());
            }
        };

        update.complete().map_err(esp_failure)?;
        info!("Wrote {} bytes, CRC32 0x{:08X}", written, actual);
        Ok(UpdateOutcome::Updated)
    }
}
