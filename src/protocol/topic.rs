// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker topic scheme.
//!
//! Requests go to `v1/{mac}/request/{model}/{token}/{command}`; devices
//! answer on `v1/{mac}/response/{model}/{token}/{command}`. Incoming
//! subjects are parsed into a typed structure rather than indexed out of a
//! split, so a malformed subject is a parse failure instead of a silent
//! misread.

use crate::device::DeviceRecord;

/// A parsed device response topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTopic<'a> {
    /// Device MAC address.
    pub mac: &'a str,
    /// Device model.
    pub model: &'a str,
    /// Device token.
    pub token: &'a str,
    /// Command name the device is responding to.
    pub command: &'a str,
}

impl<'a> ResponseTopic<'a> {
    /// Parses a response topic of the form
    /// `v1/{mac}/response/{model}/{token}/{command}`.
    ///
    /// Returns `None` for any subject that does not match the scheme
    /// exactly.
    #[must_use]
    pub fn parse(topic: &'a str) -> Option<Self> {
        let mut parts = topic.split('/');
        let version = parts.next()?;
        let mac = parts.next()?;
        let direction = parts.next()?;
        let model = parts.next()?;
        let token = parts.next()?;
        let command = parts.next()?;

        if version != "v1" || direction != "response" || parts.next().is_some() {
            return None;
        }
        if mac.is_empty() || command.is_empty() {
            return None;
        }

        Some(Self {
            mac,
            model,
            token,
            command,
        })
    }
}

/// Builds the request topic for a command to a device.
#[must_use]
pub(crate) fn request(record: &DeviceRecord, command: &str) -> String {
    format!(
        "v1/{}/request/{}/{}/{}",
        record.mac, record.model, record.token, command
    )
}

/// Builds the wildcard subscription covering all responses from a device.
#[must_use]
pub(crate) fn response_subscription(record: &DeviceRecord) -> String {
    format!(
        "v1/{}/response/{}/{}/#",
        record.mac, record.model, record.token
    )
}
