#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ecoflow_api::{
    InboundMessage, MqttConnectOptions, MqttConnection, MqttTransport, TransportConnector,
};
use ecoflow_core::codec::{delta2, smart_plug};
use ecoflow_core::{
    CoreError, Credentials, DeviceConfig, DeviceModel, EnableType, Gateway, GatewayConfig,
    SessionState, SetCommand, SimulatedConnector,
};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Fixtures ────────────────────────────────────────────────────────

fn credentials(ak: &str, sk: &str) -> Credentials {
    Credentials::new(ak, SecretString::from(sk.to_string()))
}

fn device(sn: &str, model: DeviceModel, creds: &Credentials) -> DeviceConfig {
    DeviceConfig {
        name: format!("Test {sn}"),
        serial_number: sn.to_owned(),
        model,
        credentials: creds.clone(),
    }
}

fn config(reply_timeout: Option<Duration>) -> GatewayConfig {
    let mut config = GatewayConfig::new(Url::parse("https://api-e.ecoflow.com").unwrap());
    config.mqtt.client_id = Some("HOMEBRIDGE_TEST".into());
    config.reply_timeout = reply_timeout;
    config
}

fn simulated_gateway(reply_timeout: Option<Duration>) -> (Gateway, Arc<SimulatedConnector>) {
    let connector = Arc::new(SimulatedConnector::new());
    let gateway = Gateway::with_backend(
        config(reply_timeout),
        connector.cloud_factory(),
        Arc::clone(&connector) as Arc<dyn TransportConnector>,
    );
    (gateway, connector)
}

/// Broker stand-in the test drives by hand: records publishes and lets the
/// test inject inbound messages.
#[derive(Default)]
struct ScriptedConnector {
    connects: AtomicUsize,
    fail_publish: bool,
    published: Arc<Mutex<Vec<(String, Value)>>>,
    /// Subscribed topics, with `CONNECT` marking each new session.
    broker_log: Arc<Mutex<Vec<String>>>,
    inbound: Mutex<Option<mpsc::Sender<InboundMessage>>>,
}

const CONNECT: &str = "--connect--";

impl ScriptedConnector {
    fn failing() -> Self {
        Self {
            fail_publish: true,
            ..Self::default()
        }
    }

    fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().unwrap().clone()
    }

    /// Topics subscribed on the most recent session.
    fn current_subscriptions(&self) -> Vec<String> {
        let log = self.broker_log.lock().unwrap();
        let start = log.iter().rposition(|entry| entry == CONNECT).map_or(0, |i| i + 1);
        log[start..].to_vec()
    }

    async fn inject(&self, topic: &str, payload: &str) {
        let sender = self.inbound.lock().unwrap().clone().unwrap();
        sender
            .send(InboundMessage {
                topic: topic.to_owned(),
                payload: Bytes::from(payload.to_owned()),
            })
            .await
            .unwrap();
    }
}

struct ScriptedTransport {
    fail_publish: bool,
    published: Arc<Mutex<Vec<(String, Value)>>>,
    broker_log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MqttTransport for ScriptedTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), ecoflow_api::Error> {
        self.broker_log.lock().unwrap().push(topic.to_owned());
        Ok(())
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<(), ecoflow_api::Error> {
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ecoflow_api::Error> {
        if self.fail_publish {
            return Err(ecoflow_api::Error::MqttClosed);
        }
        let value = serde_json::from_slice(&payload).unwrap();
        self.published.lock().unwrap().push((topic.to_owned(), value));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ecoflow_api::Error> {
        Ok(())
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn connect(&self, _options: MqttConnectOptions) -> Result<MqttConnection, ecoflow_api::Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.broker_log.lock().unwrap().push(CONNECT.to_owned());
        let (tx, rx) = mpsc::channel(16);
        *self.inbound.lock().unwrap() = Some(tx);
        Ok(MqttConnection {
            transport: Arc::new(ScriptedTransport {
                fail_publish: self.fail_publish,
                published: Arc::clone(&self.published),
                broker_log: Arc::clone(&self.broker_log),
            }),
            inbound: rx,
        })
    }
}

fn scripted_gateway(
    connector: &Arc<ScriptedConnector>,
    reply_timeout: Option<Duration>,
) -> Gateway {
    // Certificates and initial quotas come from the simulator's cloud.
    let fleet = SimulatedConnector::new();
    fleet.register_model("R331ZEB4ZEAL0528", DeviceModel::Delta2);
    fleet.register_model("HW52ZDH4SF123456", DeviceModel::SmartPlug);
    Gateway::with_backend(
        config(reply_timeout),
        fleet.cloud_factory(),
        Arc::clone(connector) as Arc<dyn TransportConnector>,
    )
}

// ── Connection registry ─────────────────────────────────────────────

#[tokio::test]
async fn same_credentials_share_one_connection() {
    let (gateway, connector) = simulated_gateway(None);
    connector.register_model("SN1", DeviceModel::Delta2);
    connector.register_model("SN2", DeviceModel::SmartPlug);
    let creds = credentials("AK1", "SK1");

    let a = gateway.add_device(&device("SN1", DeviceModel::Delta2, &creds)).unwrap();
    let b = gateway.add_device(&device("SN2", DeviceModel::SmartPlug, &creds)).unwrap();
    let (ra, rb) = tokio::join!(a.subscribe(), b.subscribe());
    ra.unwrap();
    rb.unwrap();

    assert_eq!(connector.connect_count(), 1);
    assert_eq!(gateway.registry().len(), 1);
    assert!(Arc::ptr_eq(a.connection(), b.connection()));
}

#[tokio::test]
async fn different_credentials_get_separate_connections() {
    let (gateway, connector) = simulated_gateway(None);
    connector.register_model("SN1", DeviceModel::Delta2);
    connector.register_model("SN2", DeviceModel::Delta2);

    let a = gateway
        .add_device(&device("SN1", DeviceModel::Delta2, &credentials("AK1", "SK1")))
        .unwrap();
    let b = gateway
        .add_device(&device("SN2", DeviceModel::Delta2, &credentials("AK1", "SK2")))
        .unwrap();
    a.subscribe().await.unwrap();
    b.subscribe().await.unwrap();

    assert_eq!(connector.connect_count(), 2);
    assert_eq!(gateway.registry().len(), 2);
}

#[tokio::test]
async fn shutdown_returns_to_unconnected_and_reconnects_on_demand() {
    let (gateway, connector) = simulated_gateway(None);
    connector.register_model("SN1", DeviceModel::Glacier);
    let handle = gateway
        .add_device(&device("SN1", DeviceModel::Glacier, &credentials("AK1", "SK1")))
        .unwrap();
    handle.subscribe().await.unwrap();
    assert_eq!(*handle.connection_state().borrow(), SessionState::Connected);

    gateway.shutdown().await;
    assert_eq!(*handle.connection_state().borrow(), SessionState::Unconnected);

    handle.subscribe().await.unwrap();
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test]
async fn command_after_shutdown_resubscribes_device_topics() {
    let connector = Arc::new(ScriptedConnector::default());
    let gateway = scripted_gateway(&connector, None);
    let handle = gateway
        .add_device(&device("HW52ZDH4SF123456", DeviceModel::SmartPlug, &credentials("AK1", "SK1")))
        .unwrap();
    handle.subscribe().await.unwrap();
    let expected = vec![
        "/open/open-simulated/HW52ZDH4SF123456/quota".to_owned(),
        "/open/open-simulated/HW52ZDH4SF123456/set_reply".to_owned(),
        "/open/open-simulated/HW52ZDH4SF123456/status".to_owned(),
    ];
    assert_eq!(connector.current_subscriptions(), expected);

    gateway.shutdown().await;
    handle.send_command(SetCommand::PlugSwitch(true)).await.unwrap();

    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_eq!(connector.current_subscriptions(), expected);
    assert_eq!(
        *handle.connection_state().borrow(),
        SessionState::Connected
    );
}

// ── Simulator round trip ────────────────────────────────────────────

#[tokio::test]
async fn simulated_device_acknowledges_commands() {
    let (gateway, connector) = simulated_gateway(Some(Duration::from_secs(2)));
    let simulator = connector.register_model("R331ZEB4ZEAL0528", DeviceModel::Delta2);
    let handle = gateway
        .add_device(&device("R331ZEB4ZEAL0528", DeviceModel::Delta2, &credentials("AK1", "SK1")))
        .unwrap();

    handle.initialize().await.unwrap();
    assert_eq!(handle.status().battery_level, Some(87.0));
    assert_eq!(handle.status().ac_enabled, Some(EnableType::Off));

    // Publishing connects on demand; the reply is routed without a
    // topic subscription.
    handle.send_command(SetCommand::AcOutput(true)).await.unwrap();
    assert_eq!(simulator.state().get_u64(delta2::keys::AC_ENABLED), Some(1));
    assert_eq!(handle.status().ac_enabled, Some(EnableType::On));
}

#[tokio::test]
async fn quota_reports_update_the_snapshot() {
    let (gateway, connector) = simulated_gateway(None);
    let simulator = connector.register_model("HW52ZDH4SF123456", DeviceModel::SmartPlug);
    simulator.apply(&ecoflow_core::QuotaPatch::new().with(smart_plug::keys::WATTS, 1234));
    let handle = gateway
        .add_device(&device("HW52ZDH4SF123456", DeviceModel::SmartPlug, &credentials("AK1", "SK1")))
        .unwrap();

    let mut watch = handle.watch_snapshot();
    handle.subscribe().await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(2),
        watch.wait_for(|s| s.get_u64(smart_plug::keys::WATTS) == Some(1234)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(handle.status().output_watts, Some(123.4));
}

// ── Commands over a scripted broker ─────────────────────────────────

#[tokio::test]
async fn delta2_ac_on_reuses_cached_output_settings() {
    let connector = Arc::new(ScriptedConnector::default());
    let gateway = scripted_gateway(&connector, None);
    let handle = gateway
        .add_device(&device("R331ZEB4ZEAL0528", DeviceModel::Delta2, &credentials("AK1", "SK1")))
        .unwrap();
    handle.initialize().await.unwrap();

    handle.send_command(SetCommand::AcOutput(true)).await.unwrap();

    let published = connector.published();
    assert_eq!(published.len(), 1);
    let (topic, envelope) = &published[0];
    assert_eq!(topic, "/open/open-simulated/R331ZEB4ZEAL0528/set");
    assert_eq!(envelope["operateType"], "acOutCfg");
    assert_eq!(
        envelope["params"],
        json!({ "out_voltage": 220_000, "out_freq": 1, "xboost": 1, "enabled": 1 })
    );
}

#[tokio::test]
async fn failed_publish_reverts_exactly_once() {
    let connector = Arc::new(ScriptedConnector::failing());
    let gateway = scripted_gateway(&connector, None);
    let handle = gateway
        .add_device(&device("HW52ZDH4SF123456", DeviceModel::SmartPlug, &credentials("AK1", "SK1")))
        .unwrap();
    handle.initialize().await.unwrap();
    assert_eq!(handle.status().switch_on, Some(EnableType::On));

    let mut watch = handle.watch_snapshot();
    watch.borrow_and_update();

    let err = handle
        .send_command(SetCommand::PlugSwitch(false))
        .await
        .unwrap_err();
    assert!(matches!(err.error(), CoreError::SessionClosed));
    assert!(err.can_revert());
    // Optimistic value is visible until the revert runs.
    assert_eq!(handle.status().switch_on, Some(EnableType::Off));

    watch.borrow_and_update();
    let cause = err.revert();
    assert!(matches!(cause, CoreError::SessionClosed));
    assert!(watch.has_changed().unwrap());
    assert_eq!(handle.status().switch_on, Some(EnableType::On));
}

#[tokio::test]
async fn send_command_or_revert_restores_state() {
    let connector = Arc::new(ScriptedConnector::failing());
    let gateway = scripted_gateway(&connector, None);
    let handle = gateway
        .add_device(&device("HW52ZDH4SF123456", DeviceModel::SmartPlug, &credentials("AK1", "SK1")))
        .unwrap();
    handle.initialize().await.unwrap();
    let before = handle.snapshot();

    handle
        .send_command_or_revert(SetCommand::Brightness(10))
        .await
        .unwrap_err();
    assert_eq!(handle.snapshot(), before);
}

#[tokio::test]
async fn missing_reply_times_out() {
    let connector = Arc::new(ScriptedConnector::default());
    let gateway = scripted_gateway(&connector, Some(Duration::from_millis(50)));
    let handle = gateway
        .add_device(&device("HW52ZDH4SF123456", DeviceModel::SmartPlug, &credentials("AK1", "SK1")))
        .unwrap();

    let err = handle
        .send_command(SetCommand::PlugSwitch(true))
        .await
        .unwrap_err();
    assert!(matches!(err.error(), CoreError::CommandTimeout { timeout_ms: 50, .. }));
    assert!(err.can_revert());
}

#[tokio::test]
async fn negative_reply_is_a_rejection() {
    let connector = Arc::new(ScriptedConnector::default());
    let gateway = scripted_gateway(&connector, Some(Duration::from_secs(2)));
    let handle = gateway
        .add_device(&device("HW52ZDH4SF123456", DeviceModel::SmartPlug, &credentials("AK1", "SK1")))
        .unwrap();
    handle.subscribe().await.unwrap();

    let sender = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.send_command(SetCommand::PlugSwitch(true)).await })
    };
    // Wait for the envelope to learn its id.
    let id = loop {
        if let Some((_, envelope)) = connector.published().first() {
            break envelope["id"].as_u64().unwrap();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    connector
        .inject(
            "/open/open-simulated/HW52ZDH4SF123456/set_reply",
            &json!({ "id": id, "code": "0", "data": { "ack": 1 } }).to_string(),
        )
        .await;

    let err = sender.await.unwrap().unwrap_err();
    assert!(matches!(err.error(), CoreError::CommandRejected { .. }));
}

// ── Routing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn unregistered_serial_reaches_no_stream() {
    let connector = Arc::new(ScriptedConnector::default());
    let gateway = scripted_gateway(&connector, None);
    let handle = gateway
        .add_device(&device("HW52ZDH4SF123456", DeviceModel::SmartPlug, &credentials("AK1", "SK1")))
        .unwrap();
    let mut quota = handle.quota_messages();
    let mut replies = handle.set_replies();
    let mut statuses = handle.statuses();
    handle.subscribe().await.unwrap();

    connector
        .inject("/open/open-simulated/SN-NOT-REGISTERED/quota", r#"{"cmdFunc":2}"#)
        .await;
    connector
        .inject("/open/open-simulated/HW52ZDH4SF123456/status", r#"{"online":1}"#)
        .await;

    // Per-connection ordering: once the status arrives, the earlier message
    // has been routed (and dropped).
    let status = tokio::time::timeout(Duration::from_secs(2), statuses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status["online"], 1);
    assert!(quota.try_recv().is_err());
    assert!(replies.try_recv().is_err());
}

#[tokio::test]
async fn two_handles_for_one_serial_both_receive() {
    let connector = Arc::new(ScriptedConnector::default());
    let gateway = scripted_gateway(&connector, None);
    let creds = credentials("AK1", "SK1");
    let config = device("HW52ZDH4SF123456", DeviceModel::SmartPlug, &creds);
    let first = gateway.add_device(&config).unwrap();
    let second = gateway.add_device(&config).unwrap();
    let mut a = first.quota_messages();
    let mut b = second.quota_messages();
    first.subscribe().await.unwrap();

    connector
        .inject(
            "/open/open-simulated/HW52ZDH4SF123456/quota",
            r#"{"cmdFunc":2,"cmdId":1,"param":{"watts":50}}"#,
        )
        .await;
    for rx in [&mut a, &mut b] {
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message["param"]["watts"], 50);
    }
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.devices().len(), 2);
}

// ── HTTP initialization ─────────────────────────────────────────────

#[tokio::test]
async fn http_quotas_seed_the_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/iot-open/sign/device/quota/all"))
        .and(query_param("sn", "R331ZEB4ZEAL0528"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "0",
            "message": "Success",
            "data": { "inv.cfgAcEnabled": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(None);
    config.api_url = Url::parse(&server.uri()).unwrap();
    let gateway = Gateway::new(config);
    let handle = gateway
        .add_device(&device("R331ZEB4ZEAL0528", DeviceModel::Delta2, &credentials("AK1", "SK1")))
        .unwrap();

    handle.initialize().await.unwrap();
    assert_eq!(handle.status().ac_enabled, Some(EnableType::On));
    assert_eq!(gateway.device("R331ZEB4ZEAL0528").unwrap().model(), DeviceModel::Delta2);
}
