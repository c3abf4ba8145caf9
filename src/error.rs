// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `tesylink` library.
//!
//! Failures are split into protocol errors (HTTP/MQTT transport), parse
//! errors (malformed directory or telemetry payloads), and bridge-level
//! conditions such as a full outbound queue or a device that vanished from
//! the cloud directory.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during protocol communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a cloud or broker payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The outbound command queue is at capacity.
    ///
    /// Commands issued while the broker session is down are queued for
    /// delivery on reconnect; once the queue is full further commands are
    /// rejected rather than evicting older ones.
    #[error("outbound command queue is full (capacity {capacity})")]
    QueueFull {
        /// Maximum number of queued commands.
        capacity: usize,
    },

    /// The broker session is not connected and queueing was not possible.
    #[error("broker session is not connected")]
    NotConnected,

    /// Device is not present in the cloud directory.
    #[error("device not found in cloud directory")]
    DeviceNotFound,

    /// Bridge configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors related to protocol communication (HTTPS directory / MQTT broker).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request to the cloud directory failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// MQTT publish or subscribe failed.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Connection to the broker or directory failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// Errors related to parsing directory responses and broker payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the response.
    #[error("missing field in response: {0}")]
    MissingField(String),

    /// Failed to parse a specific value.
    #[error("failed to parse {field}: {message}")]
    InvalidValue {
        /// The field that failed to parse.
        field: String,
        /// Description of the parsing failure.
        message: String,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
