// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device identity, directory records, and status snapshots.

use std::fmt;

use crate::types::PowerState;

/// Stable device identity.
///
/// The cloud directory keys devices by MAC address, but the `id` inside the
/// state object is the identity that survives renames and re-provisioning.
/// The MAC is only the transport-routing key used to build broker topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device id from its directory representation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A device as listed by the cloud directory.
///
/// Created on first discovery and updated in place on later passes; the
/// display name, token, and model may all change between passes while the
/// [`DeviceId`] stays fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Stable identity (see [`DeviceId`]).
    pub id: DeviceId,
    /// MAC address, used to build broker topics.
    pub mac: String,
    /// Per-device authentication token for broker topics.
    pub token: String,
    /// Model name (directory default: `cn05uv`).
    pub model: String,
    /// Firmware version, when the directory reports one.
    pub firmware_version: Option<String>,
    /// Display name shown by the accessory layer.
    pub name: String,
}

/// Latest-known full status of a device.
///
/// Produced by the directory poll path. `heating` is optional because some
/// firmware revisions omit the field entirely; "absent" and "off" are
/// distinct inputs to the heating-state inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceStatus {
    /// Whether the device is powered on.
    pub power: PowerState,
    /// Measured room temperature in °C.
    pub current_temp: f64,
    /// Target temperature in °C.
    pub target_temp: f64,
    /// Explicit heating indicator, when the firmware reports one.
    pub heating: Option<PowerState>,
}

/// A partial status update pushed by a device over the broker.
///
/// Telemetry pushes carry only a subset of the status fields; in particular
/// the power field is not reliably present, which is why a heating-related
/// push triggers a secondary directory fetch rather than being applied
/// directly.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// MAC address extracted from the response topic.
    pub mac: String,
    /// Measured temperature, when present.
    pub current_temp: Option<f64>,
    /// Target temperature, when present.
    pub target: Option<f64>,
    /// Explicit heating indicator, when present.
    pub heating: Option<PowerState>,
}
