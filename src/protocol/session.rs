// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker session manager.
//!
//! Owns the single MQTT connection of a bridge process. The session keeps a
//! subscription per known device, queues commands issued while
//! disconnected, and republishes them in FIFO order on reconnect. Telemetry
//! pushes are parsed and forwarded to the reconciler through a channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
    StateError, Transport};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::device::{DeviceId, DeviceRecord, TelemetryEvent};
use crate::error::{Error, ProtocolError, Result};

use super::command::{Command, TELEMETRY_COMMAND, parse_telemetry};
use super::queue::{CommandEnvelope, OutboundQueue};
use super::topic::{self, ResponseTopic};

/// Default keep-alive interval for the broker connection.
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
/// Default wait between reconnect attempts.
const DEFAULT_RECONNECT_PERIOD: Duration = Duration::from_secs(5);
/// Capacity of the telemetry channel toward the reconciler.
const TELEMETRY_CHANNEL_CAPACITY: usize = 32;

/// Connection state of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection attempt has started yet.
    Disconnected,
    /// The event loop is running but no ConnAck has arrived.
    Connecting,
    /// Connected and able to publish immediately.
    Connected,
    /// Connection lost; the reconnect cycle is running.
    Reconnecting,
}

/// Outcome of a [`BrokerSession::publish`] call.
#[derive(Debug)]
pub enum Dispatch {
    /// Published immediately on the live connection.
    Sent,
    /// Accepted for delivery and queued until reconnect (optimistic
    /// acknowledgment). The receiver resolves with the real publish result
    /// once the queue is flushed.
    Queued(oneshot::Receiver<Result<()>>),
}

struct SessionInner {
    client: AsyncClient,
    state: Mutex<SessionState>,
    queue: OutboundQueue,
    /// Subscription set, shared read-only with discovery.
    devices: RwLock<HashMap<DeviceId, DeviceRecord>>,
    telemetry_tx: mpsc::Sender<TelemetryEvent>,
    app_id: String,
    reconnect_period: Duration,
    started: AtomicBool,
}

/// Manager for the single broker connection of a bridge process.
///
/// Cheaply cloneable via an inner `Arc`; the event loop task and the bridge
/// share the same instance.
#[derive(Clone)]
pub struct BrokerSession {
    inner: Arc<SessionInner>,
    event_loop: Arc<Mutex<Option<EventLoop>>>,
}

impl BrokerSession {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> BrokerSessionBuilder {
        BrokerSessionBuilder::default()
    }

    /// Creates a session from the bridge configuration.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        Self::builder()
            .host(&config.broker_host)
            .port(config.broker_port)
            .credentials(&config.broker_username, &config.broker_password)
            .build()
    }

    /// Starts the session's event loop.
    ///
    /// Idempotent: the connection attempt is spawned once, and any later
    /// call while the loop is running is a no-op. Reconnection after that
    /// is handled inside the loop, never by spawning a second one.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("Broker session already started");
            return;
        }

        let Some(event_loop) = self.event_loop.lock().take() else {
            return;
        };

        *self.inner.state.lock() = SessionState::Connecting;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_event_loop(inner, event_loop).await;
        });
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Number of commands currently queued for delivery.
    #[must_use]
    pub fn queued_commands(&self) -> usize {
        self.inner.queue.len()
    }

    /// Publishes a command to a device.
    ///
    /// When connected the command is sent immediately; otherwise it is
    /// queued and the caller receives an optimistic [`Dispatch::Queued`]
    /// acknowledgment meaning "accepted for delivery", not "delivered".
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`] when disconnected with the queue at
    /// capacity, or the underlying MQTT error for an immediate publish.
    pub async fn publish(&self, record: &DeviceRecord, command: Command) -> Result<Dispatch> {
        // The state check and the enqueue happen under one lock: a command
        // issued while the connected transition is still flushing lands
        // behind the queued envelopes instead of overtaking them.
        let queued = {
            let state = self.inner.state.lock();
            if matches!(*state, SessionState::Connected) {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                self.inner.queue.push(CommandEnvelope {
                    record: record.clone(),
                    command: command.clone(),
                    delivery: Some(tx),
                })?;
                Some(rx)
            }
        };

        match queued {
            None => {
                publish_now(&self.inner, record, &command).await?;
                Ok(Dispatch::Sent)
            }
            Some(rx) => {
                tracing::debug!(
                    device = %record.id,
                    queued = self.inner.queue.len(),
                    "Broker disconnected, command queued"
                );
                Ok(Dispatch::Queued(rx))
            }
        }
    }

    /// Adds a device to the subscription set.
    ///
    /// When connected the response topic is subscribed right away;
    /// otherwise the subscription happens on the next `Connected`
    /// transition along with every other known device.
    ///
    /// # Errors
    ///
    /// Returns the MQTT error if an immediate subscribe fails.
    pub async fn subscribe_device(&self, record: DeviceRecord) -> Result<()> {
        let sub_topic = topic::response_subscription(&record);
        let connected = {
            let mut devices = self.inner.devices.write();
            devices.insert(record.id.clone(), record);
            matches!(*self.inner.state.lock(), SessionState::Connected)
        };

        if connected {
            self.inner
                .client
                .subscribe(&sub_topic, QoS::AtLeastOnce)
                .await
                .map_err(ProtocolError::Mqtt)?;
            tracing::debug!(topic = %sub_topic, "Subscribed to device responses");
        }
        Ok(())
    }

    /// Removes a device from the subscription set.
    pub async fn unsubscribe_device(&self, id: &DeviceId) {
        let record = self.inner.devices.write().remove(id);
        let Some(record) = record else { return };

        let connected = matches!(*self.inner.state.lock(), SessionState::Connected);
        if !connected {
            return;
        }
        let sub_topic = topic::response_subscription(&record);
        if let Err(e) = self.inner.client.unsubscribe(&sub_topic).await {
            tracing::warn!(topic = %sub_topic, error = %e, "Failed to unsubscribe");
        }
    }

    /// Number of devices in the subscription set.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.devices.read().len()
    }

    /// Shuts the session down.
    ///
    /// # Errors
    ///
    /// Returns the MQTT error if the disconnect request fails.
    pub async fn shutdown(&self) -> Result<()> {
        *self.inner.state.lock() = SessionState::Disconnected;
        self.inner
            .client
            .disconnect()
            .await
            .map_err(ProtocolError::Mqtt)?;
        Ok(())
    }
}

impl std::fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSession")
            .field("state", &self.state())
            .field("queued", &self.queued_commands())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Publishes a command on the live connection.
async fn publish_now(
    inner: &SessionInner,
    record: &DeviceRecord,
    command: &Command,
) -> Result<()> {
    let request_topic = topic::request(record, command.name());
    let payload = command.payload(&inner.app_id).to_string();

    tracing::debug!(topic = %request_topic, command = command.name(), "Publishing command");

    inner
        .client
        .publish(request_topic, QoS::AtLeastOnce, false, payload)
        .await
        .map_err(|e| Error::Protocol(ProtocolError::Mqtt(e)))
}

/// Drives the connection until shutdown, handling reconnects in place.
async fn run_event_loop(inner: Arc<SessionInner>, mut event_loop: EventLoop) {
    let mut reconnect_logged = false;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                reconnect_logged = false;
                tracing::info!("Connected to broker");
                on_connected(&inner).await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if let Ok(body) = std::str::from_utf8(&publish.payload) {
                    handle_incoming(&inner, &publish.topic, body).await;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("Broker sent disconnect");
                *inner.state.lock() = SessionState::Disconnected;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if matches!(*inner.state.lock(), SessionState::Disconnected) {
                    // Explicit shutdown; the poll error is the closed
                    // connection, not a failure.
                    break;
                }

                if is_keepalive_timeout(&e) {
                    tracing::warn!(error = %e, "Broker keepalive timeout");
                } else {
                    tracing::error!(error = %e, "Broker connection error");
                }

                *inner.state.lock() = SessionState::Reconnecting;
                if !reconnect_logged {
                    tracing::warn!(
                        period_s = inner.reconnect_period.as_secs(),
                        "Reconnecting to broker"
                    );
                    reconnect_logged = true;
                }

                tokio::time::sleep(inner.reconnect_period).await;
            }
        }
    }
}

/// Keepalive expiry is routine on flaky links and recovers on its own.
fn is_keepalive_timeout(error: &ConnectionError) -> bool {
    matches!(
        error,
        ConnectionError::MqttState(StateError::AwaitPingResp)
            | ConnectionError::NetworkTimeout
            | ConnectionError::FlushTimeout
    )
}

/// Resubscribes every known device, flushes the outbound queue, and only
/// then flips the state to `Connected`.
///
/// The flip happens under the state lock once the queue is observed empty,
/// so a command issued mid-flush is queued behind the envelopes being
/// flushed and FIFO order holds across the transition.
async fn on_connected(inner: &Arc<SessionInner>) {
    let records: Vec<DeviceRecord> = inner.devices.read().values().cloned().collect();
    for record in &records {
        let sub_topic = topic::response_subscription(record);
        if let Err(e) = inner.client.subscribe(&sub_topic, QoS::AtLeastOnce).await {
            tracing::error!(topic = %sub_topic, error = %e, "Resubscribe failed");
        }
    }

    loop {
        flush_queue(inner).await;
        let mut state = inner.state.lock();
        if inner.queue.is_empty() {
            *state = SessionState::Connected;
            break;
        }
    }
}

/// Publishes queued commands in FIFO order, completing their delivery
/// notifiers with the publish results.
async fn flush_queue(inner: &Arc<SessionInner>) {
    let envelopes = inner.queue.drain();
    if envelopes.is_empty() {
        return;
    }

    let count = envelopes.len();
    for envelope in envelopes {
        let result = publish_now(inner, &envelope.record, &envelope.command).await;
        if let Err(e) = &result {
            tracing::error!(
                device = %envelope.record.id,
                command = envelope.command.name(),
                error = %e,
                "Queued command failed on flush"
            );
        }
        if let Some(delivery) = envelope.delivery {
            // Receiver may have been dropped by a caller that only wanted
            // the optimistic acknowledgment.
            let _ = delivery.send(result);
        }
    }

    tracing::info!(count, "Flushed queued commands");
}

/// Handles an incoming broker message.
async fn handle_incoming(inner: &Arc<SessionInner>, subject: &str, body: &str) {
    let Some(parsed) = ResponseTopic::parse(subject) else {
        tracing::trace!(topic = %subject, "Ignoring unparseable topic");
        return;
    };

    // Only the periodic telemetry push carries status; command echoes and
    // anything else are ignored.
    if parsed.command != TELEMETRY_COMMAND {
        return;
    }

    match parse_telemetry(parsed.mac, body) {
        Ok(event) => {
            if let Err(e) = inner.telemetry_tx.try_send(event) {
                tracing::debug!(error = %e, "Telemetry channel full, dropping push");
            }
        }
        Err(e) => {
            tracing::debug!(topic = %subject, error = %e, "Dropping malformed telemetry");
        }
    }
}

/// Builder for a [`BrokerSession`].
///
/// # Examples
///
/// ```
/// use tesylink::protocol::BrokerSession;
/// use std::time::Duration;
///
/// # rustls::crypto::ring::default_provider().install_default().unwrap();
/// let (session, telemetry) = BrokerSession::builder()
///     .host("mqtt.tesy.com")
///     .port(8083)
///     .credentials("client1", "123")
///     .keep_alive(Duration::from_secs(60))
///     .build();
/// ```
#[derive(Debug)]
pub struct BrokerSessionBuilder {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    reconnect_period: Duration,
}

impl Default for BrokerSessionBuilder {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8083,
            credentials: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            reconnect_period: DEFAULT_RECONNECT_PERIOD,
        }
    }
}

impl BrokerSessionBuilder {
    /// Sets the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the broker port (default: 8083).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the broker credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 60 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    /// Sets the wait between reconnect attempts (default: 5 seconds).
    #[must_use]
    pub fn reconnect_period(mut self, duration: Duration) -> Self {
        self.reconnect_period = duration;
        self
    }

    /// Builds the session and the telemetry receiver.
    ///
    /// The host normally names the vendor's secure WebSocket endpoint; a
    /// `tcp://` or `mqtt://` prefix selects plain TCP instead (local
    /// brokers). No network activity happens until
    /// [`BrokerSession::start`] is called.
    #[must_use]
    pub fn build(self) -> (BrokerSession, mpsc::Receiver<TelemetryEvent>) {
        // Randomized per connection so parallel bridge processes never
        // steal each other's session.
        let client_id = format!("tesylink_{}", short_id());
        let (transport, broker_addr) = match self
            .host
            .strip_prefix("tcp://")
            .or_else(|| self.host.strip_prefix("mqtt://"))
        {
            Some(host) => (Transport::Tcp, host.to_string()),
            None => (
                Transport::wss_with_default_config(),
                format!("wss://{}:{}/mqtt", self.host, self.port),
            ),
        };

        let mut options = MqttOptions::new(client_id, broker_addr, self.port);
        options.set_transport(transport);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some((username, password)) = self.credentials {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 10);
        let (telemetry_tx, telemetry_rx) = mpsc::channel(TELEMETRY_CHANNEL_CAPACITY);

        let inner = SessionInner {
            client,
            state: Mutex::new(SessionState::Disconnected),
            queue: OutboundQueue::new(),
            devices: RwLock::new(HashMap::new()),
            telemetry_tx,
            app_id: format!("app_{}", short_id()),
            reconnect_period: self.reconnect_period,
            started: AtomicBool::new(false),
        };

        let session = BrokerSession {
            inner: Arc::new(inner),
            event_loop: Arc::new(Mutex::new(Some(event_loop))),
        };

        (session, telemetry_rx)
    }
}

/// Short random identifier for client and app ids.
fn short_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
