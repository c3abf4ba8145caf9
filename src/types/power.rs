// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power state for Tesy heaters.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Represents the on/off state of a heater.
///
/// The cloud directory and the broker both report power as a string; the
/// comparison is case-insensitive (`"on"`, `"ON"` and `"On"` all match).
///
/// # Examples
///
/// ```
/// use tesylink::PowerState;
///
/// assert_eq!("ON".parse::<PowerState>().unwrap(), PowerState::On);
/// assert_eq!(PowerState::Off.as_str(), "off");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    /// Power is off.
    Off,
    /// Power is on.
    On,
}

impl PowerState {
    /// Returns the wire representation used in `onOff` command payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
        }
    }

    /// Returns `true` when the state is [`PowerState::On`].
    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("on") {
            Ok(Self::On)
        } else if s.eq_ignore_ascii_case("off") {
            Ok(Self::Off)
        } else {
            Err(ParseError::InvalidValue {
                field: "status".to_string(),
                message: format!("unknown power state: {s}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        for raw in ["on", "ON", "On", "oN"] {
            assert_eq!(raw.parse::<PowerState>().unwrap(), PowerState::On);
        }
        for raw in ["off", "OFF", "Off"] {
            assert_eq!(raw.parse::<PowerState>().unwrap(), PowerState::Off);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!("standby".parse::<PowerState>().is_err());
    }

    #[test]
    fn from_bool() {
        assert_eq!(PowerState::from(true), PowerState::On);
        assert_eq!(PowerState::from(false), PowerState::Off);
    }
}
