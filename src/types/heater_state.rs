// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Three-valued heating state and the inference rule that derives it from a
//! status snapshot.

use crate::device::DeviceStatus;

/// Temperature deficit at which a heater without an explicit heating field
/// is assumed to be heating. The threshold is inclusive.
const HEATING_THRESHOLD: f64 = 0.5;

/// Derived heating state exposed to the accessory layer.
///
/// Maps onto the accessory framework's three-state heater indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaterState {
    /// Device is powered off.
    Inactive,
    /// Device is on but not actively heating.
    Idle,
    /// Device is on and actively heating.
    Heating,
}

impl HeaterState {
    /// Infers the heating state from a full status snapshot.
    ///
    /// The rule, in priority order:
    ///
    /// 1. A powered-off device is [`Inactive`](Self::Inactive) regardless of
    ///    every other field.
    /// 2. An explicit `heating` field always wins, even when it disagrees
    ///    with the temperature delta.
    /// 3. With no explicit field, the device is assumed to be heating when
    ///    the target exceeds the current temperature by at least 0.5 °C.
    ///
    /// # Examples
    ///
    /// ```
    /// use tesylink::{DeviceStatus, HeaterState, PowerState};
    ///
    /// let status = DeviceStatus {
    ///     power: PowerState::On,
    ///     current_temp: 19.0,
    ///     target_temp: 22.0,
    ///     heating: None,
    /// };
    /// assert_eq!(HeaterState::infer(&status), HeaterState::Heating);
    /// ```
    #[must_use]
    pub fn infer(status: &DeviceStatus) -> Self {
        if !status.power.is_on() {
            return Self::Inactive;
        }

        if let Some(heating) = status.heating {
            return if heating.is_on() {
                Self::Heating
            } else {
                Self::Idle
            };
        }

        if status.target_temp - status.current_temp >= HEATING_THRESHOLD {
            Self::Heating
        } else {
            Self::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PowerState;

    fn status(
        power: PowerState,
        current: f64,
        target: f64,
        heating: Option<PowerState>,
    ) -> DeviceStatus {
        DeviceStatus {
            power,
            current_temp: current,
            target_temp: target,
            heating,
        }
    }

    #[test]
    fn powered_off_is_inactive_regardless_of_other_fields() {
        for heating in [None, Some(PowerState::On), Some(PowerState::Off)] {
            for (current, target) in [(10.0, 30.0), (30.0, 10.0), (20.0, 20.0)] {
                let s = status(PowerState::Off, current, target, heating);
                assert_eq!(HeaterState::infer(&s), HeaterState::Inactive);
            }
        }
    }

    #[test]
    fn explicit_heating_field_wins() {
        let s = status(PowerState::On, 25.0, 20.0, Some(PowerState::On));
        // Target below current, but the explicit field says heating.
        assert_eq!(HeaterState::infer(&s), HeaterState::Heating);

        let s = status(PowerState::On, 15.0, 25.0, Some(PowerState::Off));
        // Large deficit, but the explicit field says idle.
        assert_eq!(HeaterState::infer(&s), HeaterState::Idle);
    }

    #[test]
    fn numeric_fallback_threshold_is_inclusive() {
        let s = status(PowerState::On, 21.5, 22.0, None);
        assert_eq!(HeaterState::infer(&s), HeaterState::Heating);

        let s = status(PowerState::On, 21.6, 22.0, None);
        assert_eq!(HeaterState::infer(&s), HeaterState::Idle);

        let s = status(PowerState::On, 22.0, 22.0, None);
        assert_eq!(HeaterState::infer(&s), HeaterState::Idle);
    }

    #[test]
    fn numeric_fallback_heating_when_far_below_target() {
        let s = status(PowerState::On, 18.0, 24.0, None);
        assert_eq!(HeaterState::infer(&s), HeaterState::Heating);
    }
}
