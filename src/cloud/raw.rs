// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serde types for the raw directory response.
//!
//! The directory is lenient about types: numeric fields may arrive as JSON
//! numbers or as strings, and the device name can live in several places.
//! These types absorb that looseness and convert into the crate's typed
//! records.

use serde::Deserialize;
use serde_json::Value;

use crate::device::{DeviceId, DeviceRecord, DeviceStatus};
use crate::error::ParseError;
use crate::types::PowerState;

/// Model reported when the directory omits one.
const DEFAULT_MODEL: &str = "cn05uv";

/// One directory entry, keyed by MAC address in the response object.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDevice {
    pub token: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    #[serde(rename = "deviceName", alias = "name")]
    pub device_name: Option<String>,
    pub state: Option<RawState>,
}

/// The `state` object inside a directory entry.
#[derive(Debug, Deserialize)]
pub(crate) struct RawState {
    pub id: Option<Value>,
    pub status: Option<String>,
    pub temp: Option<Value>,
    pub current_temp: Option<Value>,
    pub heating: Option<String>,
    #[serde(rename = "deviceName", alias = "name")]
    pub device_name: Option<String>,
}

impl RawDevice {
    /// Converts a directory entry into a typed record plus its initial
    /// status.
    ///
    /// Entries without a `state.id` cannot be bound to a stable identity and
    /// are rejected; the caller skips them with a warning.
    pub(crate) fn into_record(
        self,
        mac: &str,
    ) -> Result<(DeviceRecord, DeviceStatus), ParseError> {
        let state = self
            .state
            .ok_or_else(|| ParseError::MissingField("state".to_string()))?;

        let id = state
            .id
            .as_ref()
            .and_then(value_to_string)
            .ok_or_else(|| ParseError::MissingField("state.id".to_string()))?;

        // The name may live on the state object or the outer entry; fall
        // back to a generated one so the accessory always has a label.
        let name = state
            .device_name
            .clone()
            .or(self.device_name)
            .unwrap_or_else(|| format!("Tesy Heater {id}"));

        let status = state.into_status()?;

        let record = DeviceRecord {
            id: DeviceId::new(id),
            mac: mac.to_string(),
            token: self.token.unwrap_or_default(),
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            firmware_version: self.firmware_version,
            name,
        };

        Ok((record, status))
    }
}

impl RawState {
    /// Converts the raw state into a typed status snapshot.
    pub(crate) fn into_status(self) -> Result<DeviceStatus, ParseError> {
        let power = self
            .status
            .as_deref()
            .ok_or_else(|| ParseError::MissingField("state.status".to_string()))?
            .parse::<PowerState>()?;

        let current_temp = self
            .current_temp
            .as_ref()
            .and_then(value_to_f64)
            .unwrap_or(0.0);
        let target_temp = self.temp.as_ref().and_then(value_to_f64).unwrap_or(0.0);

        let heating = match self.heating.as_deref() {
            Some(raw) => Some(raw.parse::<PowerState>()?),
            None => None,
        };

        Ok(DeviceStatus {
            power,
            current_temp,
            target_temp,
            heating,
        })
    }
}

/// Coerces a JSON number-or-string into an `f64`.
pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Coerces a JSON number-or-string into a `String`.
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
