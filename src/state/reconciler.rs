// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reconciler is the single merge point for device status.
//!
//! Two channels feed it: slow full snapshots from the directory poll and
//! fast partial pushes from the broker. Change detection is strict
//! inequality against the last value *emitted to the accessory layer*, not
//! against the last value seen on the same channel. When both channels
//! observe the same transition, the second write compares equal and is
//! dropped, so the accessory never sees duplicate or oscillating updates.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::accessory::{AccessoryPort, CharacteristicUpdate};
use crate::device::{DeviceId, DeviceStatus, TelemetryEvent};
use crate::types::HeaterState;

/// Last values emitted to the accessory layer for one device.
#[derive(Debug, Default, Clone, Copy)]
struct Emitted {
    active: Option<bool>,
    current_temp: Option<f64>,
    target_temp: Option<f64>,
    heater: Option<HeaterState>,
}

/// Merges poll and push status updates and forwards genuine deltas.
pub struct Reconciler {
    port: Arc<dyn AccessoryPort>,
    min_temp: f64,
    max_temp: f64,
    last: Mutex<HashMap<DeviceId, Emitted>>,
}

impl Reconciler {
    /// Creates a reconciler emitting to the given accessory port, with the
    /// configured temperature bounds.
    #[must_use]
    pub fn new(port: Arc<dyn AccessoryPort>, min_temp: f64, max_temp: f64) -> Self {
        Self {
            port,
            min_temp,
            max_temp,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Applies a full status snapshot from the poll path.
    ///
    /// All four characteristics go through change detection; values that
    /// match the last emission are dropped.
    pub fn apply_snapshot(&self, id: &DeviceId, status: &DeviceStatus) {
        let mut last = self.last.lock();
        let emitted = last.entry(id.clone()).or_default();

        let active = status.power.is_on();
        if emitted.active != Some(active) {
            emitted.active = Some(active);
            self.emit(id, CharacteristicUpdate::Active(active));
        }

        if self.in_bounds(status.current_temp) && emitted.current_temp != Some(status.current_temp)
        {
            emitted.current_temp = Some(status.current_temp);
            self.emit(id, CharacteristicUpdate::CurrentTemperature(status.current_temp));
        }

        if self.in_bounds(status.target_temp) && emitted.target_temp != Some(status.target_temp) {
            emitted.target_temp = Some(status.target_temp);
            self.emit(id, CharacteristicUpdate::TargetTemperature(status.target_temp));
        }

        let heater = HeaterState::infer(status);
        if emitted.heater != Some(heater) {
            emitted.heater = Some(heater);
            self.emit(id, CharacteristicUpdate::HeaterState(heater));
        }
    }

    /// Applies a partial telemetry push.
    ///
    /// Only the fields present in the payload are considered. Returns
    /// `true` when the push carried a heating indicator: telemetry does not
    /// reliably include the power field, so the caller must recompute the
    /// heating state from a full snapshot and apply it via
    /// [`apply_heater_state`](Self::apply_heater_state).
    pub fn apply_push(&self, id: &DeviceId, event: &TelemetryEvent) -> bool {
        let mut last = self.last.lock();
        let emitted = last.entry(id.clone()).or_default();

        if let Some(current) = event.current_temp
            && current.is_finite()
            && self.in_bounds(current)
            && emitted.current_temp != Some(current)
        {
            emitted.current_temp = Some(current);
            self.emit(id, CharacteristicUpdate::CurrentTemperature(current));
        }

        if let Some(target) = event.target
            && target.is_finite()
            && target > 0.0
            && self.in_bounds(target)
            && emitted.target_temp != Some(target)
        {
            emitted.target_temp = Some(target);
            self.emit(id, CharacteristicUpdate::TargetTemperature(target));
        }

        event.heating.is_some()
    }

    /// Applies a heating state recomputed from a secondary full fetch.
    pub fn apply_heater_state(&self, id: &DeviceId, heater: HeaterState) {
        let mut last = self.last.lock();
        let emitted = last.entry(id.clone()).or_default();
        if emitted.heater != Some(heater) {
            emitted.heater = Some(heater);
            self.emit(id, CharacteristicUpdate::HeaterState(heater));
        }
    }

    /// Drops tracked state for a removed device.
    pub fn forget(&self, id: &DeviceId) {
        self.last.lock().remove(id);
    }

    fn in_bounds(&self, temp: f64) -> bool {
        temp >= self.min_temp && temp <= self.max_temp
    }

    fn emit(&self, id: &DeviceId, update: CharacteristicUpdate) {
        tracing::debug!(device = %id, ?update, "Characteristic changed");
        self.port.update(id, update);
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("min_temp", &self.min_temp)
            .field("max_temp", &self.max_temp)
            .field("devices", &self.last.lock().len())
            .finish_non_exhaustive()
    }
}
