// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cloud directory access.
//!
//! The vendor cloud exposes a single REST endpoint listing all devices on
//! the account together with their latest known state. There is no
//! per-device endpoint; fetching one device's status re-reads the whole
//! directory and extracts the entry.

mod client;
pub(crate) mod raw;

pub use client::{CloudDevice, CloudDirectoryClient, Directory};
