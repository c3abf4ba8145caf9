// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Commands understood by the heaters, and the telemetry payload they push
//! back.

use serde::Deserialize;
use serde_json::Value;

use crate::cloud::raw::value_to_f64;
use crate::device::TelemetryEvent;
use crate::error::ParseError;
use crate::types::PowerState;

/// Command name of the periodic telemetry push from a device.
pub const TELEMETRY_COMMAND: &str = "setTempStatistic";

/// Operating mode accepted by the `setMode` command.
///
/// Target-temperature changes require the device to be in manual mode, so
/// the bridge always sends `setMode {mode: "manual"}` before `setTemp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterMode {
    /// Manual temperature control.
    Manual,
}

impl HeaterMode {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
        }
    }
}

/// A command publishable to a device's request topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Turn the heater on or off.
    OnOff(PowerState),
    /// Switch the operating mode.
    SetMode(HeaterMode),
    /// Set the target temperature, in °C.
    SetTemp(f64),
}

impl Command {
    /// Returns the command name used in the request topic.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OnOff(_) => "onOff",
            Self::SetMode(_) => "setMode",
            Self::SetTemp(_) => "setTemp",
        }
    }

    /// Builds the JSON payload, tagged with the per-process app id.
    #[must_use]
    pub fn payload(&self, app_id: &str) -> Value {
        match self {
            Self::OnOff(state) => serde_json::json!({
                "app_id": app_id,
                "status": state.as_str(),
            }),
            Self::SetMode(mode) => serde_json::json!({
                "app_id": app_id,
                "mode": mode.as_str(),
            }),
            Self::SetTemp(temp) => serde_json::json!({
                "app_id": app_id,
                "temp": temp,
            }),
        }
    }
}

/// Envelope of a telemetry push as it appears on the wire.
#[derive(Debug, Deserialize)]
struct RawTelemetry {
    payload: Option<RawTelemetryPayload>,
}

#[derive(Debug, Deserialize)]
struct RawTelemetryPayload {
    #[serde(rename = "currentTemp")]
    current_temp: Option<Value>,
    target: Option<Value>,
    heating: Option<String>,
}

/// Parses a telemetry push body into an event.
///
/// # Errors
///
/// Returns a parse error for malformed JSON or a missing `payload` object;
/// the session drops such messages at debug level.
pub(crate) fn parse_telemetry(mac: &str, body: &str) -> Result<TelemetryEvent, ParseError> {
    let raw: RawTelemetry = serde_json::from_str(body)?;
    let payload = raw
        .payload
        .ok_or_else(|| ParseError::MissingField("payload".to_string()))?;

    let heating = match payload.heating.as_deref() {
        Some(raw) => Some(raw.parse::<PowerState>()?),
        None => None,
    };

    Ok(TelemetryEvent {
        mac: mac.to_string(),
        current_temp: payload.current_temp.as_ref().and_then(value_to_f64),
        target: payload.target.as_ref().and_then(value_to_f64),
        heating,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_match_wire_scheme() {
        assert_eq!(Command::OnOff(PowerState::On).name(), "onOff");
        assert_eq!(Command::SetMode(HeaterMode::Manual).name(), "setMode");
        assert_eq!(Command::SetTemp(21.0).name(), "setTemp");
    }

    #[test]
    fn payloads_carry_app_id() {
        let payload = Command::OnOff(PowerState::Off).payload("app1234");
        assert_eq!(payload["app_id"], "app1234");
        assert_eq!(payload["status"], "off");

        let payload = Command::SetMode(HeaterMode::Manual).payload("app1234");
        assert_eq!(payload["mode"], "manual");

        let payload = Command::SetTemp(22.5).payload("app1234");
        assert!((payload["temp"].as_f64().unwrap() - 22.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_telemetry_full_payload() {
        let event = parse_telemetry(
            "a1b2c3",
            r#"{"payload": {"currentTemp": 22.5, "target": "20", "heating": "off"}}"#,
        )
        .unwrap();
        assert_eq!(event.mac, "a1b2c3");
        assert!((event.current_temp.unwrap() - 22.5).abs() < f64::EPSILON);
        assert!((event.target.unwrap() - 20.0).abs() < f64::EPSILON);
        assert_eq!(event.heating, Some(PowerState::Off));
    }

    #[test]
    fn parse_telemetry_partial_payload() {
        let event = parse_telemetry("a1b2c3", r#"{"payload": {"currentTemp": 19}}"#).unwrap();
        assert!(event.target.is_none());
        assert!(event.heating.is_none());
    }

    #[test]
    fn parse_telemetry_rejects_missing_payload() {
        assert!(parse_telemetry("a1b2c3", r#"{"app_id": "x"}"#).is_err());
        assert!(parse_telemetry("a1b2c3", "not json").is_err());
    }
}
