// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for discovery, lifecycle, reconciliation, and the
//! command path, using wiremock for the cloud directory and a recording
//! accessory port.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tesylink::{
    AccessoryPort, BridgeConfig, CharacteristicUpdate, DeviceId, DeviceRecord, Error,
    HeaterBridge, HeaterState, PowerState, TelemetryEvent,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records every call from the bridge so tests can assert exact counts.
#[derive(Default)]
struct RecordingPort {
    registered: Mutex<Vec<DeviceId>>,
    renamed: Mutex<Vec<(DeviceId, String)>>,
    unregistered: Mutex<Vec<DeviceId>>,
    updates: Mutex<Vec<(DeviceId, CharacteristicUpdate)>>,
}

impl AccessoryPort for RecordingPort {
    fn register(&self, record: &DeviceRecord) {
        self.registered.lock().push(record.id.clone());
    }
    fn update_name(&self, id: &DeviceId, name: &str) {
        self.renamed.lock().push((id.clone(), name.to_string()));
    }
    fn unregister(&self, id: &DeviceId) {
        self.unregistered.lock().push(id.clone());
    }
    fn update(&self, id: &DeviceId, update: CharacteristicUpdate) {
        self.updates.lock().push((id.clone(), update));
    }
}

impl RecordingPort {
    fn update_count(&self) -> usize {
        self.updates.lock().len()
    }
}

fn config(server: &MockServer) -> BridgeConfig {
    BridgeConfig::new(42, "user@example.com", "secret")
        .with_directory_host(server.uri())
        .with_discovery_min_interval(Duration::ZERO)
}

fn device_entry(id: u32, name: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "token": "tok",
        "model": "cn05uv",
        "state": {
            "id": id,
            "status": status,
            "temp": 22.0,
            "current_temp": 20.0,
            "heating": "on",
            "deviceName": name
        }
    })
}

// Both `ring` and `aws-lc-rs` rustls backends end up compiled into the test
// binary (via reqwest/mockforge and rumqttc respectively), so rustls cannot
// auto-select a provider; pick one explicitly before any TLS config is built.
fn install_crypto_provider() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("install rustls crypto provider");
    });
}

fn bridge_with(config: BridgeConfig) -> (Arc<RecordingPort>, Arc<HeaterBridge>) {
    install_crypto_provider();
    let port = Arc::new(RecordingPort::default());
    let bridge = HeaterBridge::new(config, Arc::clone(&port) as Arc<dyn AccessoryPort>).unwrap();
    (port, bridge)
}

#[tokio::test]
async fn discovery_registers_devices_and_seeds_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/get-my-devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "Living Room", "on")
        })))
        .mount(&server)
        .await;

    let (port, bridge) = bridge_with(config(&server));
    bridge.discover().await.unwrap();

    assert_eq!(bridge.device_count().await, 1);
    assert_eq!(port.registered.lock().as_slice(), &[DeviceId::new("7")]);
    assert_eq!(bridge.session().subscription_count(), 1);

    // Initial snapshot: active, both temperatures, heating state.
    let updates = port.updates.lock();
    assert_eq!(updates.len(), 4);
    assert!(updates.contains(&(
        DeviceId::new("7"),
        CharacteristicUpdate::HeaterState(HeaterState::Heating)
    )));
}

#[tokio::test]
async fn rediscovery_renames_in_place_without_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "Old Name", "on")
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "New Name", "on")
        })))
        .mount(&server)
        .await;

    let (port, bridge) = bridge_with(config(&server));
    bridge.discover().await.unwrap();
    bridge.discover().await.unwrap();

    assert_eq!(bridge.device_count().await, 1);
    assert_eq!(port.registered.lock().len(), 1);
    assert_eq!(
        port.renamed.lock().as_slice(),
        &[(DeviceId::new("7"), "New Name".to_string())]
    );
    assert_eq!(bridge.record(&DeviceId::new("7")).await.unwrap().name, "New Name");
}

#[tokio::test]
async fn device_absent_from_directory_is_unregistered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "Heater", "on")
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let (port, bridge) = bridge_with(config(&server));
    bridge.discover().await.unwrap();
    assert_eq!(bridge.device_count().await, 1);

    bridge.discover().await.unwrap();
    assert_eq!(bridge.device_count().await, 0);
    assert_eq!(port.unregistered.lock().as_slice(), &[DeviceId::new("7")]);
    assert_eq!(bridge.session().subscription_count(), 0);
}

#[tokio::test]
async fn discovery_inside_minimum_interval_issues_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "Heater", "on")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = BridgeConfig::new(42, "user@example.com", "secret")
        .with_directory_host(server.uri())
        .with_discovery_min_interval(Duration::from_secs(10));
    let (_port, bridge) = bridge_with(cfg);

    bridge.discover().await.unwrap();
    // Second attempt is dropped before any HTTP request.
    bridge.discover().await.unwrap();

    server.verify().await;
}

#[tokio::test]
async fn unchanged_poll_emits_no_updates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "Heater", "on")
        })))
        .mount(&server)
        .await;

    let (port, bridge) = bridge_with(config(&server));
    bridge.discover().await.unwrap();
    let after_discovery = port.update_count();

    bridge.poll_once().await;
    bridge.poll_once().await;
    assert_eq!(port.update_count(), after_discovery);
}

#[tokio::test]
async fn telemetry_push_updates_current_temp_and_refetches_heating() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "Heater", "on")
        })))
        .mount(&server)
        .await;

    let (port, bridge) = bridge_with(config(&server));
    bridge.discover().await.unwrap();
    port.updates.lock().clear();

    // Push: new current temperature, target below minimum bound, explicit
    // heating key. The temperature applies immediately; the heating key
    // triggers a secondary fetch whose snapshot still reports heating on,
    // so no heater-state delta is emitted.
    bridge
        .apply_telemetry(TelemetryEvent {
            mac: "mac1".to_string(),
            current_temp: Some(22.5),
            target: Some(5.0),
            heating: Some(PowerState::Off),
        })
        .await;

    let updates = port.updates.lock();
    assert_eq!(
        updates.as_slice(),
        &[(DeviceId::new("7"), CharacteristicUpdate::CurrentTemperature(22.5))]
    );
}

#[tokio::test]
async fn telemetry_for_unknown_device_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let (port, bridge) = bridge_with(config(&server));
    bridge
        .apply_telemetry(TelemetryEvent {
            mac: "ghost".to_string(),
            current_temp: Some(21.0),
            target: None,
            heating: None,
        })
        .await;

    assert_eq!(port.update_count(), 0);
}

#[tokio::test]
async fn set_target_temperature_clamps_and_orders_commands() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "Heater", "on")
        })))
        .mount(&server)
        .await;

    let (_port, bridge) = bridge_with(config(&server));
    bridge.discover().await.unwrap();

    // Session never started: both commands are queued optimistically,
    // setMode first, setTemp second.
    let applied = bridge
        .set_target_temperature(&DeviceId::new("7"), 35.0)
        .await
        .unwrap();
    assert!((applied - 30.0).abs() < f64::EPSILON);
    assert_eq!(bridge.session().queued_commands(), 2);
}

#[tokio::test]
async fn set_target_temperature_aborts_when_set_mode_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "Heater", "on")
        })))
        .mount(&server)
        .await;

    let (_port, bridge) = bridge_with(config(&server));
    bridge.discover().await.unwrap();
    let id = DeviceId::new("7");

    // Fill the outbound queue so the next enqueue is rejected.
    for _ in 0..10 {
        bridge.set_active(&id, true).await.unwrap();
    }

    let err = bridge.set_target_temperature(&id, 25.0).await.unwrap_err();
    assert!(matches!(err, Error::QueueFull { capacity: 10 }));
    // setMode was rejected, so setTemp was never enqueued either.
    assert_eq!(bridge.session().queued_commands(), 10);
}

#[tokio::test]
async fn commands_for_unknown_devices_fail_with_not_found() {
    let server = MockServer::start().await;
    let (_port, bridge) = bridge_with(config(&server));

    let err = bridge.set_active(&DeviceId::new("99"), true).await.unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound));
}

#[tokio::test]
async fn read_status_backs_accessory_get_callbacks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "mac1": device_entry(7, "Heater", "off")
        })))
        .mount(&server)
        .await;

    let (_port, bridge) = bridge_with(config(&server));
    bridge.discover().await.unwrap();

    let status = bridge.read_status(&DeviceId::new("7")).await.unwrap();
    assert!(!status.power.is_on());
    assert_eq!(HeaterState::infer(&status), HeaterState::Inactive);
}
