// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker protocol: topic scheme, command encoding, and the session
//! manager that owns the single MQTT connection.

mod command;
mod queue;
mod session;
mod topic;

pub use command::{Command, HeaterMode, TELEMETRY_COMMAND};
pub use queue::QUEUE_CAPACITY;
pub use session::{BrokerSession, BrokerSessionBuilder, Dispatch, SessionState};
pub use topic::ResponseTopic;
