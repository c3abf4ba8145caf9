// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTPS client for the vendor cloud directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Client;

use crate::config::BridgeConfig;
use crate::device::{DeviceRecord, DeviceStatus};
use crate::error::{Error, ProtocolError, Result};

use super::raw::RawDevice;

/// Hard upper bound for a directory request. The underlying connection is
/// torn down when it fires.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Window inside which repeated failures are downgraded to debug logging.
const ERROR_LOG_THROTTLE: Duration = Duration::from_secs(60);

/// A device entry from the directory: the normalized record plus the status
/// snapshot the directory reported alongside it.
#[derive(Debug, Clone)]
pub struct CloudDevice {
    /// Normalized device record.
    pub record: DeviceRecord,
    /// Status reported with the listing.
    pub status: DeviceStatus,
}

/// Result of a directory listing.
///
/// An empty response object is a valid answer meaning the account has no
/// devices provisioned; it is kept distinct from a failed request so
/// callers can tear down stale accessories instead of ignoring the pass.
#[derive(Debug, Clone)]
pub enum Directory {
    /// The account has no devices provisioned.
    NoDevices,
    /// Devices keyed by MAC address.
    Devices(HashMap<String, CloudDevice>),
}

/// Client for the vendor cloud directory endpoint.
///
/// Tracks consecutive request failures so the bridge can log a single
/// "restored" notice after an outage, and throttles error-level logging to
/// avoid storms while the cloud is down.
#[derive(Debug)]
pub struct CloudDirectoryClient {
    http: Client,
    url: String,
    consecutive_errors: AtomicU32,
    last_error_log: Mutex<Option<Instant>>,
}

impl CloudDirectoryClient {
    /// Creates a directory client from the bridge configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ProtocolError::Http)?;

        let host = &config.directory_host;
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.clone()
        } else {
            format!("https://{host}")
        };
        let url = format!(
            "{base}/rest/get-my-devices?userID={}&userEmail={}&userPass={}&lang=en",
            config.user_id,
            urlencoding::encode(&config.user_email),
            urlencoding::encode(&config.user_pass),
        );

        Ok(Self {
            http,
            url,
            consecutive_errors: AtomicU32::new(0),
            last_error_log: Mutex::new(None),
        })
    }

    /// Lists all devices on the account.
    ///
    /// Transport errors, timeouts, and non-JSON bodies fail the whole pass;
    /// no partial results are returned. Entries that cannot be bound to a
    /// stable identity are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for transport failures or timeouts, and a
    /// parse error for malformed bodies.
    pub async fn list_devices(&self) -> Result<Directory> {
        let result = self.request_directory().await;
        match &result {
            Ok(_) => self.note_success(),
            Err(e) => self.note_failure(e),
        }
        result
    }

    /// Fetches the full status of a single device by MAC address.
    ///
    /// The directory has no per-device endpoint, so this re-reads the whole
    /// listing and extracts one entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] when the MAC is absent from the
    /// listing, plus any error [`list_devices`](Self::list_devices) can
    /// return.
    pub async fn fetch_device_status(&self, mac: &str) -> Result<DeviceStatus> {
        match self.list_devices().await? {
            Directory::NoDevices => Err(Error::DeviceNotFound),
            Directory::Devices(mut devices) => devices
                .remove(mac)
                .map(|d| d.status)
                .ok_or(Error::DeviceNotFound),
        }
    }

    /// Number of consecutive failed directory requests.
    #[must_use]
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Relaxed)
    }

    async fn request_directory(&self) -> Result<Directory> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(map_http_error)?;
        let body = response.text().await.map_err(map_http_error)?;

        let raw: HashMap<String, RawDevice> =
            serde_json::from_str(&body).map_err(crate::error::ParseError::Json)?;

        if raw.is_empty() {
            return Ok(Directory::NoDevices);
        }

        let mut devices = HashMap::with_capacity(raw.len());
        for (mac, entry) in raw {
            match entry.into_record(&mac) {
                Ok((record, status)) => {
                    devices.insert(mac, CloudDevice { record, status });
                }
                Err(e) => {
                    tracing::warn!(mac = %mac, error = %e, "Skipping directory entry");
                }
            }
        }

        if devices.is_empty() {
            return Ok(Directory::NoDevices);
        }
        Ok(Directory::Devices(devices))
    }

    fn note_success(&self) {
        let failures = self.consecutive_errors.swap(0, Ordering::Relaxed);
        if failures > 0 {
            tracing::info!(failures, "Cloud directory connection restored");
        }
        *self.last_error_log.lock() = None;
    }

    fn note_failure(&self, error: &Error) {
        let failures = self.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;

        let mut last_log = self.last_error_log.lock();
        let throttled = last_log.is_some_and(|at| at.elapsed() < ERROR_LOG_THROTTLE);
        if throttled {
            tracing::debug!(failures, error = %error, "Cloud directory request failed");
        } else {
            tracing::error!(failures, error = %error, "Cloud directory request failed");
            *last_log = Some(Instant::now());
        }
    }
}

/// Maps a reqwest error, surfacing timeouts and connection-level failures
/// distinctly.
fn map_http_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        // Safe: the timeout constant fits comfortably in u64 milliseconds.
        #[allow(clippy::cast_possible_truncation)]
        let millis = REQUEST_TIMEOUT.as_millis() as u64;
        Error::Protocol(ProtocolError::Timeout(millis))
    } else if e.is_connect() {
        Error::Protocol(ProtocolError::ConnectionFailed(e.to_string()))
    } else {
        Error::Protocol(ProtocolError::Http(e))
    }
}
