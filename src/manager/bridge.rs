// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The heater bridge: device discovery, lifecycle reconciliation, status
//! polling, and the user command path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::accessory::AccessoryPort;
use crate::cloud::{CloudDevice, CloudDirectoryClient, Directory};
use crate::config::BridgeConfig;
use crate::device::{DeviceId, DeviceRecord, DeviceStatus, TelemetryEvent};
use crate::error::{Error, Result};
use crate::protocol::{BrokerSession, Command, Dispatch, HeaterMode};
use crate::state::Reconciler;
use crate::types::HeaterState;

/// Bridges a cloud heater fleet to the local accessory layer.
///
/// One instance per bridge process. Owns the cloud directory client, the
/// single broker session, the reconciler, and the device map; the accessory
/// layer is reached only through the injected [`AccessoryPort`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tesylink::{AccessoryPort, BridgeConfig, HeaterBridge};
///
/// # async fn example(port: Arc<dyn AccessoryPort>) -> tesylink::Result<()> {
/// let config = BridgeConfig::new(12345, "user@example.com", "secret");
/// let bridge = HeaterBridge::new(config, port)?;
///
/// bridge.start();
/// bridge.discover().await?;
/// bridge.start_polling();
/// # Ok(())
/// # }
/// ```
pub struct HeaterBridge {
    config: BridgeConfig,
    cloud: CloudDirectoryClient,
    session: BrokerSession,
    reconciler: Reconciler,
    port: Arc<dyn AccessoryPort>,
    devices: RwLock<HashMap<DeviceId, DeviceRecord>>,
    last_discovery: Mutex<Option<Instant>>,
    discovery_in_flight: AtomicBool,
    telemetry_rx: Mutex<Option<mpsc::Receiver<TelemetryEvent>>>,
    polling: Mutex<Option<JoinHandle<()>>>,
}

impl HeaterBridge {
    /// Creates a bridge from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for missing credentials or
    /// inverted temperature bounds, and a protocol error if the HTTP client
    /// cannot be built.
    pub fn new(config: BridgeConfig, port: Arc<dyn AccessoryPort>) -> Result<Arc<Self>> {
        config.validate()?;

        let cloud = CloudDirectoryClient::new(&config)?;
        let (session, telemetry_rx) = BrokerSession::from_config(&config);
        let reconciler = Reconciler::new(Arc::clone(&port), config.min_temp, config.max_temp);

        Ok(Arc::new(Self {
            config,
            cloud,
            session,
            reconciler,
            port,
            devices: RwLock::new(HashMap::new()),
            last_discovery: Mutex::new(None),
            discovery_in_flight: AtomicBool::new(false),
            telemetry_rx: Mutex::new(Some(telemetry_rx)),
            polling: Mutex::new(None),
        }))
    }

    /// Starts the broker session and the telemetry pump. Idempotent.
    pub fn start(self: &Arc<Self>) {
        self.session.start();

        if let Some(rx) = self.telemetry_rx.lock().take() {
            let bridge = Arc::downgrade(self);
            tokio::spawn(async move {
                let mut rx = rx;
                while let Some(event) = rx.recv().await {
                    let Some(bridge) = bridge.upgrade() else { break };
                    bridge.apply_telemetry(event).await;
                }
            });
        }
    }

    /// Runs one discovery pass against the cloud directory.
    ///
    /// Rate limited: attempts within the configured minimum interval of the
    /// previous one, or while another pass is in flight, are dropped with a
    /// debug log and no HTTP request.
    ///
    /// # Errors
    ///
    /// Propagates directory transport and parse errors; the device map is
    /// left untouched on failure.
    pub async fn discover(&self) -> Result<()> {
        {
            let mut last = self.last_discovery.lock();
            if let Some(at) = *last
                && at.elapsed() < self.config.discovery_min_interval
            {
                tracing::debug!("Discovery attempted too soon, skipping");
                return Ok(());
            }
            if self.discovery_in_flight.swap(true, Ordering::AcqRel) {
                tracing::debug!("Discovery already in flight, skipping");
                return Ok(());
            }
            *last = Some(Instant::now());
        }

        let result = self.run_discovery().await;
        self.discovery_in_flight.store(false, Ordering::Release);
        result
    }

    async fn run_discovery(&self) -> Result<()> {
        tracing::info!("Fetching devices from cloud directory");

        match self.cloud.list_devices().await? {
            Directory::NoDevices => {
                tracing::warn!("No devices found on the account");
                self.remove_absent(&HashSet::new()).await;
            }
            Directory::Devices(listing) => {
                tracing::info!(count = listing.len(), "Found devices on the account");

                let mut valid = HashSet::new();
                for device in listing.into_values() {
                    valid.insert(device.record.id.clone());
                    self.upsert_device(device).await;
                }
                self.remove_absent(&valid).await;
            }
        }

        Ok(())
    }

    /// Creates or updates one accessory binding from a directory entry.
    async fn upsert_device(&self, device: CloudDevice) {
        let CloudDevice { record, status } = device;
        let id = record.id.clone();

        {
            let mut devices = self.devices.write().await;
            if let Some(existing) = devices.get_mut(&id) {
                if existing.name != record.name {
                    tracing::info!(
                        device = %id,
                        from = %existing.name,
                        to = %record.name,
                        "Updating accessory name"
                    );
                    self.port.update_name(&id, &record.name);
                }
                *existing = record.clone();
            } else {
                tracing::info!(device = %id, name = %record.name, "Adding new accessory");
                self.port.register(&record);
                devices.insert(id.clone(), record.clone());
            }
        }

        // Immediate when connected, deferred to the Connected transition
        // otherwise. A failure here must not abort the discovery pass.
        if let Err(e) = self.session.subscribe_device(record).await {
            tracing::warn!(device = %id, error = %e, "Subscribe failed, will retry on reconnect");
        }

        self.reconciler.apply_snapshot(&id, &status);
    }

    /// Unregisters every binding whose id is absent from the directory.
    async fn remove_absent(&self, valid: &HashSet<DeviceId>) {
        let stale: Vec<DeviceId> = {
            let devices = self.devices.read().await;
            devices
                .keys()
                .filter(|id| !valid.contains(*id))
                .cloned()
                .collect()
        };
        if stale.is_empty() {
            return;
        }

        tracing::info!(count = stale.len(), "Removing devices no longer on the account");
        let mut devices = self.devices.write().await;
        for id in stale {
            devices.remove(&id);
            self.session.unsubscribe_device(&id).await;
            self.reconciler.forget(&id);
            self.port.unregister(&id);
        }
    }

    /// Starts the periodic status poll. Idempotent.
    ///
    /// Each tick applies the poll path for all known devices; while no
    /// devices are known the tick triggers a discovery pass instead.
    pub fn start_polling(self: &Arc<Self>) {
        let mut guard = self.polling.lock();
        if guard.is_some() {
            tracing::debug!("Polling already running");
            return;
        }

        // Safe: practical intervals fit in u64 milliseconds.
        #[allow(clippy::cast_possible_truncation)]
        let interval_ms = self.config.pull_interval.as_millis() as u64;
        tracing::info!(interval_ms, "Starting status polling");

        let bridge = Arc::downgrade(self);
        let period = self.config.pull_interval;
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(bridge) = bridge.upgrade() else { break };
                bridge.poll_once().await;
            }
        }));
    }

    /// Runs one poll pass: full snapshots for all known devices.
    pub async fn poll_once(&self) {
        if self.devices.read().await.is_empty() {
            if let Err(e) = self.discover().await {
                tracing::debug!(error = %e, "Discovery from poll tick failed");
            }
            return;
        }

        let listing = match self.cloud.list_devices().await {
            Ok(Directory::Devices(listing)) => listing,
            Ok(Directory::NoDevices) => return,
            // Failure logging is handled by the directory client; prior
            // state stays untouched.
            Err(_) => return,
        };

        let devices = self.devices.read().await;
        for (id, record) in devices.iter() {
            if let Some(device) = listing.get(&record.mac) {
                self.reconciler.apply_snapshot(id, &device.status);
            }
        }
    }

    /// Applies one telemetry push.
    ///
    /// Normally fed by the broker session's telemetry channel; exposed so
    /// host processes with their own transport can inject events. Partial
    /// fields apply directly; a heating indicator triggers a secondary
    /// full-status fetch because pushes do not reliably carry the power
    /// field.
    pub async fn apply_telemetry(&self, event: TelemetryEvent) {
        let id = {
            let devices = self.devices.read().await;
            devices
                .values()
                .find(|r| r.mac == event.mac)
                .map(|r| r.id.clone())
        };
        let Some(id) = id else {
            tracing::trace!(mac = %event.mac, "Telemetry for unknown device");
            return;
        };

        let heating_changed = self.reconciler.apply_push(&id, &event);

        // Telemetry lacks a reliable power field, so the heating state is
        // recomputed from a full snapshot.
        if heating_changed {
            match self.cloud.fetch_device_status(&event.mac).await {
                Ok(status) => {
                    self.reconciler
                        .apply_heater_state(&id, HeaterState::infer(&status));
                }
                Err(e) => {
                    tracing::debug!(device = %id, error = %e, "Secondary status fetch failed");
                }
            }
        }
    }

    /// Turns a heater on or off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown id, or the publish
    /// error (notably [`Error::QueueFull`]).
    pub async fn set_active(&self, id: &DeviceId, on: bool) -> Result<Dispatch> {
        let record = self.record(id).await?;
        tracing::info!(device = %id, on, "Setting active state");
        self.session.publish(&record, Command::OnOff(on.into())).await
    }

    /// Sets the target temperature, clamped to the configured bounds.
    ///
    /// The device only honors `setTemp` in manual mode, so a
    /// `setMode {manual}` is published first, strictly before the
    /// temperature; a failure there aborts and the temperature is never
    /// sent. Returns the clamped value actually requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown id, or the first
    /// publish error.
    pub async fn set_target_temperature(&self, id: &DeviceId, temp: f64) -> Result<f64> {
        let record = self.record(id).await?;
        let clamped = self.config.clamp_target(temp);
        tracing::info!(device = %id, requested = temp, clamped, "Setting target temperature");

        self.session
            .publish(&record, Command::SetMode(HeaterMode::Manual))
            .await?;
        self.session
            .publish(&record, Command::SetTemp(clamped))
            .await?;
        Ok(clamped)
    }

    /// Reads the current full status of a device from the directory.
    ///
    /// Backs the accessory layer's get callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown id or a device
    /// missing from the directory, plus any directory error.
    pub async fn read_status(&self, id: &DeviceId) -> Result<DeviceStatus> {
        let record = self.record(id).await?;
        self.cloud.fetch_device_status(&record.mac).await
    }

    /// Number of devices currently bound.
    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Returns a device record by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown id.
    pub async fn record(&self, id: &DeviceId) -> Result<DeviceRecord> {
        self.devices
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(Error::DeviceNotFound)
    }

    /// Returns the broker session (state inspection, tests).
    #[must_use]
    pub fn session(&self) -> &BrokerSession {
        &self.session
    }

    /// Stops polling and disconnects the broker session.
    ///
    /// # Errors
    ///
    /// Returns the MQTT error if the disconnect request fails.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(handle) = self.polling.lock().take() {
            handle.abort();
        }
        self.session.shutdown().await
    }
}

impl std::fmt::Debug for HeaterBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaterBridge")
            .field("session", &self.session)
            .field("cloud_errors", &self.cloud.consecutive_errors())
            .finish_non_exhaustive()
    }
}
