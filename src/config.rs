// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration.
//!
//! The host process owns config-file loading; this crate only defines the
//! configuration shape (with serde support) and validates it. Cloud account
//! credentials are required: a bridge without them cannot reach the
//! directory and refuses to start.

use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

/// Default directory polling interval.
pub const DEFAULT_PULL_INTERVAL: Duration = Duration::from_secs(60);
/// Default minimum wait between discovery attempts.
pub const DEFAULT_DISCOVERY_MIN_INTERVAL: Duration = Duration::from_secs(10);
/// Default lower bound for target temperature, in °C.
pub const DEFAULT_MIN_TEMP: f64 = 10.0;
/// Default upper bound for target temperature, in °C.
pub const DEFAULT_MAX_TEMP: f64 = 30.0;

/// Vendor cloud directory host.
const DEFAULT_DIRECTORY_HOST: &str = "ad.mytesy.com";
/// Vendor MQTT broker endpoint (MQTT over secure WebSocket).
const DEFAULT_BROKER_HOST: &str = "mqtt.tesy.com";
const DEFAULT_BROKER_PORT: u16 = 8083;
// The vendor broker uses fixed shared credentials for all clients.
const DEFAULT_BROKER_USERNAME: &str = "client1";
const DEFAULT_BROKER_PASSWORD: &str = "123";

/// Configuration for a [`HeaterBridge`](crate::manager::HeaterBridge).
///
/// # Examples
///
/// ```
/// use tesylink::BridgeConfig;
/// use std::time::Duration;
///
/// let config = BridgeConfig::new(12345, "user@example.com", "secret")
///     .with_pull_interval(Duration::from_secs(30))
///     .with_temperature_bounds(12.0, 28.0);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Cloud account user id.
    pub user_id: u32,
    /// Cloud account email.
    pub user_email: String,
    /// Cloud account password.
    pub user_pass: String,
    /// Directory polling interval.
    #[serde(with = "duration_millis")]
    pub pull_interval: Duration,
    /// Minimum wait between discovery attempts.
    #[serde(with = "duration_millis")]
    pub discovery_min_interval: Duration,
    /// Lower bound for target temperature, in °C.
    pub min_temp: f64,
    /// Upper bound for target temperature, in °C.
    pub max_temp: f64,
    /// Cloud directory host.
    pub directory_host: String,
    /// MQTT broker host.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT broker username.
    pub broker_username: String,
    /// MQTT broker password.
    pub broker_password: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            user_id: 0,
            user_email: String::new(),
            user_pass: String::new(),
            pull_interval: DEFAULT_PULL_INTERVAL,
            discovery_min_interval: DEFAULT_DISCOVERY_MIN_INTERVAL,
            min_temp: DEFAULT_MIN_TEMP,
            max_temp: DEFAULT_MAX_TEMP,
            directory_host: DEFAULT_DIRECTORY_HOST.to_string(),
            broker_host: DEFAULT_BROKER_HOST.to_string(),
            broker_port: DEFAULT_BROKER_PORT,
            broker_username: DEFAULT_BROKER_USERNAME.to_string(),
            broker_password: DEFAULT_BROKER_PASSWORD.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Creates a configuration with the required cloud credentials and
    /// defaults for everything else.
    #[must_use]
    pub fn new(user_id: u32, user_email: impl Into<String>, user_pass: impl Into<String>) -> Self {
        Self {
            user_id,
            user_email: user_email.into(),
            user_pass: user_pass.into(),
            ..Self::default()
        }
    }

    /// Sets the directory polling interval.
    #[must_use]
    pub fn with_pull_interval(mut self, interval: Duration) -> Self {
        self.pull_interval = interval;
        self
    }

    /// Sets the minimum wait between discovery attempts.
    #[must_use]
    pub fn with_discovery_min_interval(mut self, interval: Duration) -> Self {
        self.discovery_min_interval = interval;
        self
    }

    /// Sets the target temperature bounds, in °C.
    #[must_use]
    pub fn with_temperature_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_temp = min;
        self.max_temp = max;
        self
    }

    /// Sets the cloud directory host.
    #[must_use]
    pub fn with_directory_host(mut self, host: impl Into<String>) -> Self {
        self.directory_host = host.into();
        self
    }

    /// Sets the MQTT broker endpoint.
    #[must_use]
    pub fn with_broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.broker_host = host.into();
        self.broker_port = port;
        self
    }

    /// Sets the MQTT broker credentials.
    #[must_use]
    pub fn with_broker_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.broker_username = username.into();
        self.broker_password = password.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] when the required cloud
    /// credentials are missing or the temperature bounds are inverted.
    pub fn validate(&self) -> Result<(), Error> {
        if self.user_id == 0 || self.user_email.is_empty() || self.user_pass.is_empty() {
            return Err(Error::InvalidConfiguration(
                "missing required credentials (user_id, user_email, user_pass)".to_string(),
            ));
        }
        if self.min_temp >= self.max_temp {
            return Err(Error::InvalidConfiguration(format!(
                "min_temp {} must be below max_temp {}",
                self.min_temp, self.max_temp
            )));
        }
        Ok(())
    }

    /// Clamps a requested target temperature to the configured bounds.
    #[must_use]
    pub fn clamp_target(&self, temp: f64) -> f64 {
        temp.clamp(self.min_temp, self.max_temp)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
