// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `tesylink` - A Rust library bridging Tesy cloud heaters to local
//! smart-home accessories.
//!
//! The bridge discovers heaters from the Tesy cloud directory, mirrors
//! their state into accessory capabilities, and relays user commands back
//! to the devices over the vendor's MQTT broker (MQTT over secure
//! WebSocket).
//!
//! # Architecture
//!
//! - **Cloud directory client**: authenticated HTTPS listing of the
//!   account's devices and their latest state.
//! - **Broker session**: the single MQTT connection of a bridge process,
//!   with automatic reconnect, per-device subscriptions, and a bounded
//!   outbound queue for commands issued while disconnected.
//! - **Reconciler**: merges slow polled snapshots with fast pushed
//!   telemetry and forwards only genuine deltas to the accessory layer.
//! - **Heater bridge**: discovery, accessory lifecycle, polling, and the
//!   user command path.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tesylink::{AccessoryPort, BridgeConfig, HeaterBridge};
//!
//! # async fn example(port: Arc<dyn AccessoryPort>) -> tesylink::Result<()> {
//! let config = BridgeConfig::new(12345, "user@example.com", "secret");
//! let bridge = HeaterBridge::new(config, port)?;
//!
//! // Connect the broker session and the telemetry pump.
//! bridge.start();
//!
//! // Discover devices and keep their state fresh.
//! bridge.discover().await?;
//! bridge.start_polling();
//! # Ok(())
//! # }
//! ```
//!
//! User-initiated capability writes go through the bridge's command path:
//!
//! ```no_run
//! # use tesylink::{DeviceId, HeaterBridge};
//! # async fn example(bridge: &HeaterBridge) -> tesylink::Result<()> {
//! let id = DeviceId::new("7");
//! bridge.set_active(&id, true).await?;
//! // Clamped to the configured bounds; setMode precedes setTemp.
//! let applied = bridge.set_target_temperature(&id, 22.5).await?;
//! # Ok(())
//! # }
//! ```

mod accessory;
pub mod cloud;
mod config;
mod device;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod state;
pub mod types;

pub use accessory::{AccessoryPort, CharacteristicUpdate};
pub use cloud::{CloudDevice, CloudDirectoryClient, Directory};
pub use config::BridgeConfig;
pub use device::{DeviceId, DeviceRecord, DeviceStatus, TelemetryEvent};
pub use error::{Error, ParseError, ProtocolError, Result};
pub use manager::HeaterBridge;
pub use protocol::{BrokerSession, Command, Dispatch, HeaterMode, SessionState};
pub use state::Reconciler;
pub use types::{HeaterState, PowerState};
