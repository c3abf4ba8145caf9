// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boundary toward the accessory bridge framework.
//!
//! The accessory layer (capability characteristics, persisted identity,
//! user-facing get/set callbacks) is an external collaborator. The bridge
//! only talks to it through this trait: register/unregister a binding,
//! rename it, and push characteristic values. Every characteristic write
//! funnels through [`AccessoryPort::update`], so tests can assert exact
//! emission counts.

use crate::device::{DeviceId, DeviceRecord};
use crate::types::HeaterState;

/// A single characteristic value pushed to the accessory layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CharacteristicUpdate {
    /// Power capability (on/off).
    Active(bool),
    /// Measured temperature, in °C.
    CurrentTemperature(f64),
    /// Target temperature, in °C.
    TargetTemperature(f64),
    /// Derived three-state heating indicator.
    HeaterState(HeaterState),
}

/// Interface the bridge uses to drive the accessory layer.
///
/// Implementations are expected to be cheap and non-blocking; the bridge
/// calls them from its reconciliation path.
pub trait AccessoryPort: Send + Sync {
    /// Creates an accessory binding for a newly discovered device.
    fn register(&self, record: &DeviceRecord);

    /// Updates the display name of an existing binding.
    fn update_name(&self, id: &DeviceId, name: &str);

    /// Removes the binding of a device that left the directory.
    fn unregister(&self, id: &DeviceId);

    /// Pushes one characteristic value to a binding.
    fn update(&self, id: &DeviceId, update: CharacteristicUpdate);
}
