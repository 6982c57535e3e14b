// ── Device simulator ──
//
// In-process stand-ins for the broker and the cloud API. A
// `SimulatedConnector` plugs into the connection registry in place of the
// rumqttc connector: subscribing a quota topic emits the simulated device's
// current state, and publishing a set envelope answers with a set reply and a
// fresh quota report.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use ecoflow_api::{
    AllQuotaData, Certificate, InboundMessage, MqttConnectOptions, MqttConnection, MqttTransport,
    TransportConnector,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{QuotaCodec, codec_for, delta_pro, delta_pro3, delta2, glacier, power_ocean};
use crate::codec::{power_stream, smart_plug, wave2};
use crate::config::Credentials;
use crate::connection::cloud::{CloudApi, CloudFactory};
use crate::connection::topics::{self, TopicKind};
use crate::model::{DeviceModel, ENVELOPE_VERSION, ProductLine, QuotaPatch, QuotaSnapshot, SetEnvelope};

/// Account the simulated certificate hands out.
pub const SIMULATED_ACCOUNT: &str = "open-simulated";

const INBOUND_CAPACITY: usize = 256;

/// Behaviour of one simulated device.
pub trait Simulator: Send + Sync {
    /// Quota messages describing the current state.
    fn generate_quota(&self) -> Vec<Value>;

    /// Apply a raw set envelope and answer it.
    fn generate_set_reply(&self, raw: &Value) -> Value;

    /// State as the cloud's "get all quotas" would return it.
    fn all_quotas(&self) -> Option<AllQuotaData> {
        None
    }
}

// ── Codec-backed simulator ───────────────────────────────────────────

/// Simulates a device of one model with that model's own codec.
pub struct CodecSimulator {
    model: DeviceModel,
    codec: Arc<dyn QuotaCodec>,
    state: Mutex<QuotaSnapshot>,
}

impl CodecSimulator {
    pub fn new(model: DeviceModel) -> Self {
        let mut state = QuotaSnapshot::new();
        state.apply(&sample_state(model));
        Self {
            model,
            codec: codec_for(model),
            state: Mutex::new(state),
        }
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    pub fn state(&self) -> QuotaSnapshot {
        self.lock().clone()
    }

    /// Overwrite fields of the simulated state.
    pub fn apply(&self, patch: &QuotaPatch) {
        self.lock().apply(patch);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QuotaSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Simulator for CodecSimulator {
    fn generate_quota(&self) -> Vec<Value> {
        self.codec.report(&self.lock())
    }

    fn generate_set_reply(&self, raw: &Value) -> Value {
        let id = raw.get("id").cloned().unwrap_or(Value::Null);
        let applied = SetEnvelope::from_json(raw)
            .and_then(|envelope| self.codec.decode_command(&envelope))
            .and_then(|command| self.codec.optimistic_patch(&command));

        let accepted = match applied {
            Ok(patch) => {
                self.lock().apply(&patch);
                true
            }
            Err(e) => {
                debug!(model = %self.model, error = %e, "Simulated device rejected command");
                false
            }
        };

        json!({
            "id": id,
            "version": ENVELOPE_VERSION,
            "code": "0",
            "data": { "ack": u8::from(!accepted), "configOk": accepted }
        })
    }

    fn all_quotas(&self) -> Option<AllQuotaData> {
        let state = self.lock();
        Some(
            state
                .iter()
                .map(|(key, value)| (key.to_owned(), value.clone()))
                .collect(),
        )
    }
}

/// Plausible idle state of a freshly unboxed device.
fn sample_state(model: DeviceModel) -> QuotaPatch {
    match model.product_line() {
        ProductLine::Delta2 => QuotaPatch::new()
            .with(delta2::keys::SOC, 87)
            .with(delta2::keys::WATTS_IN, 0)
            .with(delta2::keys::WATTS_OUT, 12)
            .with(delta2::keys::USB_STATE, 1)
            .with(delta2::keys::BRIGHTNESS, 100)
            .with(delta2::keys::LCD_TIMEOUT, 300)
            .with(delta2::keys::AC_ENABLED, 0)
            .with(delta2::keys::AC_XBOOST, 1)
            .with(delta2::keys::AC_OUT_VOLTAGE, 220_000)
            .with(delta2::keys::AC_OUT_FREQ, 1)
            .with(delta2::keys::CAR_STATE, 0)
            .with(delta2::keys::AC_CHARGE_WATTS, 500)
            .with(delta2::keys::MAX_CHARGE_SOC, 100)
            .with(delta2::keys::MIN_DISCHARGE_SOC, 0),
        ProductLine::DeltaPro => QuotaPatch::new()
            .with(delta_pro::keys::SOC, 74)
            .with(delta_pro::keys::WATTS_IN, 0)
            .with(delta_pro::keys::WATTS_OUT, 35)
            .with(delta_pro::keys::USB_STATE, 1)
            .with(delta_pro::keys::BRIGHTNESS, 60)
            .with(delta_pro::keys::AC_ENABLED, 0)
            .with(delta_pro::keys::AC_XBOOST, 1)
            .with(delta_pro::keys::AC_OUT_VOLTAGE, 230_000)
            .with(delta_pro::keys::AC_OUT_FREQ, 50)
            .with(delta_pro::keys::AC_CHARGE_WATTS, 400)
            .with(delta_pro::keys::CAR_STATE, 0)
            .with(delta_pro::keys::MAX_CHARGE_SOC, 100)
            .with(delta_pro::keys::MIN_DISCHARGE_SOC, 5),
        ProductLine::DeltaPro3 => QuotaPatch::new()
            .with(delta_pro3::keys::SOC, 63)
            .with(delta_pro3::keys::WATTS_IN, 0)
            .with(delta_pro3::keys::WATTS_OUT, 48)
            .with(delta_pro3::keys::AC_OPEN, 0)
            .with(delta_pro3::keys::HV_AC_OPEN, 0)
            .with(delta_pro3::keys::XBOOST, 1)
            .with(delta_pro3::keys::DC_12V_OPEN, 1)
            .with(delta_pro3::keys::LCD_LIGHT, 80)
            .with(delta_pro3::keys::MAX_CHARGE_SOC, 100)
            .with(delta_pro3::keys::MIN_DISCHARGE_SOC, 10)
            .with(delta_pro3::keys::AC_CHARGE_WATTS, 1800),
        ProductLine::SmartPlug => QuotaPatch::new()
            .with(smart_plug::keys::SWITCH, 1)
            .with(smart_plug::keys::BRIGHTNESS, 1023)
            .with(smart_plug::keys::WATTS, 452)
            .with(smart_plug::keys::TEMPERATURE, 31),
        ProductLine::PowerStream => QuotaPatch::new()
            .with(power_stream::keys::PERMANENT_WATTS, 2000)
            .with(power_stream::keys::SUPPLY_PRIORITY, 0)
            .with(power_stream::keys::LOWER_LIMIT, 10)
            .with(power_stream::keys::UPPER_LIMIT, 95)
            .with(power_stream::keys::BRIGHTNESS, 512)
            .with(power_stream::keys::BATTERY_SOC, 58)
            .with(power_stream::keys::PV1_WATTS, 1830)
            .with(power_stream::keys::PV2_WATTS, 1710)
            .with(power_stream::keys::INV_OUTPUT_WATTS, 2000)
            .with(power_stream::keys::INV_TEMPERATURE, 41),
        ProductLine::Glacier => QuotaPatch::new()
            .with(glacier::keys::SOC, 92)
            .with(glacier::keys::TARGET_RIGHT, 4)
            .with(glacier::keys::TARGET_LEFT, 4)
            .with(glacier::keys::TARGET_COMBINED, 4)
            .with(glacier::keys::AMBIENT, 24)
            .with(glacier::keys::ECO_MODE, 0)
            .with(glacier::keys::MOTOR_WATTS, 38),
        ProductLine::Wave2 => QuotaPatch::new()
            .with(wave2::keys::SOC, 81)
            .with(wave2::keys::SET_TEMP, 22)
            .with(wave2::keys::ENV_TEMP, 29)
            .with(wave2::keys::FAN_VALUE, 1)
            .with(wave2::keys::MAIN_MODE, 0)
            .with(wave2::keys::POWER_MODE, 2)
            .with(wave2::keys::BATTERY_WATTS_OUT, 0),
        ProductLine::PowerOcean => QuotaPatch::new()
            .with(power_ocean::keys::SOC, 66)
            .with(power_ocean::keys::PV_WATTS, 4120)
            .with(power_ocean::keys::LOAD_WATTS, 860),
    }
}

// ── Simulated broker ─────────────────────────────────────────────────

type Fleet = DashMap<String, Arc<dyn Simulator>>;

/// Transport connector backed by registered simulators.
#[derive(Default)]
pub struct SimulatedConnector {
    simulators: Arc<Fleet>,
    connects: AtomicUsize,
    quota_interval: Option<Duration>,
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-send every subscribed device's quota at `interval`.
    pub fn with_quota_interval(mut self, interval: Duration) -> Self {
        self.quota_interval = Some(interval);
        self
    }

    pub fn register(&self, sn: impl Into<String>, simulator: Arc<dyn Simulator>) {
        self.simulators.insert(sn.into(), simulator);
    }

    /// Register a [`CodecSimulator`] for `model` and return it.
    pub fn register_model(&self, sn: impl Into<String>, model: DeviceModel) -> Arc<CodecSimulator> {
        let simulator = Arc::new(CodecSimulator::new(model));
        self.register(sn, Arc::clone(&simulator) as Arc<dyn Simulator>);
        simulator
    }

    /// Number of broker sessions opened so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Cloud clients answering from the same simulators.
    pub fn cloud_factory(&self) -> CloudFactory {
        let simulators = Arc::clone(&self.simulators);
        Arc::new(move |_credentials: &Credentials| {
            Ok(Arc::new(SimulatedCloud {
                simulators: Arc::clone(&simulators),
            }) as Arc<dyn CloudApi>)
        })
    }
}

#[async_trait]
impl TransportConnector for SimulatedConnector {
    async fn connect(&self, options: MqttConnectOptions) -> Result<MqttConnection, ecoflow_api::Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        info!(client_id = %options.client_id, "Simulated broker session opened");

        let (inbound_tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let transport = SimulatedTransport {
            simulators: Arc::clone(&self.simulators),
            inbound: inbound_tx,
            quota_interval: self.quota_interval,
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        };
        Ok(MqttConnection {
            transport: Arc::new(transport),
            inbound,
        })
    }
}

struct SimulatedTransport {
    simulators: Arc<Fleet>,
    inbound: mpsc::Sender<InboundMessage>,
    quota_interval: Option<Duration>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl SimulatedTransport {
    fn ensure_open(&self) -> Result<(), ecoflow_api::Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ecoflow_api::Error::MqttClosed);
        }
        Ok(())
    }

    fn simulator(&self, sn: &str) -> Option<Arc<dyn Simulator>> {
        self.simulators.get(sn).map(|entry| Arc::clone(entry.value()))
    }

    fn spawn_ticker(&self, topic: String, simulator: Arc<dyn Simulator>, interval: Duration) {
        let inbound = self.inbound.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if emit(&inbound, &topic, simulator.generate_quota()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

async fn emit(
    inbound: &mpsc::Sender<InboundMessage>,
    topic: &str,
    messages: Vec<Value>,
) -> Result<(), ecoflow_api::Error> {
    for message in messages {
        inbound
            .send(InboundMessage {
                topic: topic.to_owned(),
                payload: Bytes::from(message.to_string()),
            })
            .await
            .map_err(|_| ecoflow_api::Error::MqttClosed)?;
    }
    Ok(())
}

#[async_trait]
impl MqttTransport for SimulatedTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), ecoflow_api::Error> {
        self.ensure_open()?;
        let Some(parsed) = topics::parse(topic) else {
            return Ok(());
        };
        if parsed.kind != Some(TopicKind::Quota) {
            return Ok(());
        }
        let Some(simulator) = self.simulator(parsed.sn) else {
            warn!(sn = parsed.sn, "No simulator registered for device");
            return Ok(());
        };

        emit(&self.inbound, topic, simulator.generate_quota()).await?;
        if let Some(interval) = self.quota_interval {
            self.spawn_ticker(topic.to_owned(), simulator, interval);
        }
        Ok(())
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<(), ecoflow_api::Error> {
        self.ensure_open()
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ecoflow_api::Error> {
        self.ensure_open()?;
        let parsed = topics::parse(topic)
            .filter(|parsed| parsed.kind == Some(TopicKind::Set))
            .ok_or_else(|| ecoflow_api::Error::MqttOptions(format!("cannot publish to {topic}")))?;
        let Some(simulator) = self.simulator(parsed.sn) else {
            warn!(sn = parsed.sn, "Publish to unsimulated device dropped");
            return Ok(());
        };

        let raw: Value =
            serde_json::from_slice(&payload).map_err(|e| ecoflow_api::Error::Deserialization {
                message: e.to_string(),
                body: String::from_utf8_lossy(&payload).into_owned(),
            })?;
        let reply = simulator.generate_set_reply(&raw);

        let reply_topic = topics::topic(parsed.account, parsed.sn, TopicKind::SetReply);
        let quota_topic = topics::topic(parsed.account, parsed.sn, TopicKind::Quota);
        emit(&self.inbound, &reply_topic, vec![reply]).await?;
        emit(&self.inbound, &quota_topic, simulator.generate_quota()).await
    }

    async fn disconnect(&self) -> Result<(), ecoflow_api::Error> {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        info!("Simulated broker session closed");
        Ok(())
    }
}

// ── Simulated cloud ──────────────────────────────────────────────────

struct SimulatedCloud {
    simulators: Arc<Fleet>,
}

#[async_trait]
impl CloudApi for SimulatedCloud {
    async fn get_all_quotas(&self, sn: &str) -> Result<Option<AllQuotaData>, ecoflow_api::Error> {
        Ok(self
            .simulators
            .get(sn)
            .and_then(|simulator| simulator.all_quotas()))
    }

    async fn acquire_certificate(&self) -> Result<Certificate, ecoflow_api::Error> {
        Ok(Certificate {
            certificate_account: SIMULATED_ACCOUNT.to_owned(),
            certificate_password: "simulated".to_owned(),
            url: "localhost".to_owned(),
            port: "8883".to_owned(),
            protocol: "mqtts".to_owned(),
        })
    }

    async fn send_set_envelope(&self, envelope: &Value) -> Result<(), ecoflow_api::Error> {
        let sn = envelope.get("sn").and_then(Value::as_str).unwrap_or_default();
        let Some(simulator) = self.simulators.get(sn).map(|entry| Arc::clone(entry.value())) else {
            return Err(ecoflow_api::Error::Api {
                code: "1006".to_owned(),
                message: format!("device {sn} not bound to this account"),
            });
        };
        let reply = simulator.generate_set_reply(envelope);
        if reply["data"]["configOk"] == json!(true) {
            Ok(())
        } else {
            Err(ecoflow_api::Error::Api {
                code: "1".to_owned(),
                message: "command rejected".to_owned(),
            })
        }
    }
}
