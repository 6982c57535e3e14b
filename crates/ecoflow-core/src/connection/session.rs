// ── MQTT session per credential pair ──
//
// A `Connection` lazily acquires a certificate, opens one broker session and
// subscribes the topics of every registered device. Acquisition is
// single-flight: concurrent callers wait on the same attempt.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use dashmap::DashMap;
use ecoflow_api::{Certificate, MqttConnectOptions, MqttTransport, TransportConnector};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cloud::CloudApi;
use super::topics::{self, TopicKind};
use crate::config::{CredentialKey, MqttSettings};
use crate::error::CoreError;
use crate::router::{self, DeviceChannels, DeviceTable};

/// Lifecycle of the broker session of one credential pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    Unconnected,
    AcquiringCertificate,
    Connecting,
    Connected,
}

/// A live broker session.
struct Session {
    certificate: Certificate,
    transport: Arc<dyn MqttTransport>,
    /// Serial numbers whose topics are subscribed on this session.
    subscribed: StdMutex<HashSet<String>>,
    /// Stops the router task.
    router: CancellationToken,
    /// Cancelled once the router task has exited.
    closed: CancellationToken,
}

impl Session {
    fn is_alive(&self) -> bool {
        !self.closed.is_cancelled()
    }

    fn topic(&self, sn: &str, kind: TopicKind) -> String {
        topics::topic(&self.certificate.certificate_account, sn, kind)
    }

    /// Subscribe the inbound topics of `sn` once per session.
    async fn ensure_subscribed(&self, sn: &str) -> Result<(), CoreError> {
        let first = self
            .subscribed
            .lock()
            .map(|mut set| set.insert(sn.to_owned()))
            .unwrap_or(false);
        if !first {
            return Ok(());
        }

        for kind in TopicKind::INBOUND {
            let topic = self.topic(sn, kind);
            if let Err(e) = self.transport.subscribe(&topic).await {
                error!(sn, topic = %topic, error = %e, "MQTT subscribe failed");
                if let Ok(mut set) = self.subscribed.lock() {
                    set.remove(sn);
                }
                return Err(e.into());
            }
        }
        info!(sn, "Subscribed to device topics");
        Ok(())
    }
}

/// Connection of one credential pair: zero-or-one live session plus the
/// device handles registered against it.
pub struct Connection {
    key: CredentialKey,
    cloud: Arc<dyn CloudApi>,
    connector: Arc<dyn TransportConnector>,
    client_id: String,
    mqtt: MqttSettings,
    session: Mutex<Option<Arc<Session>>>,
    state: Arc<watch::Sender<SessionState>>,
    devices: Arc<DeviceTable>,
    /// Devices that asked for their topics; re-subscribed on a new session.
    wanted: StdMutex<HashSet<String>>,
}

impl Connection {
    pub(crate) fn new(
        key: CredentialKey,
        cloud: Arc<dyn CloudApi>,
        connector: Arc<dyn TransportConnector>,
        client_id: String,
        mqtt: MqttSettings,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unconnected);
        Self {
            key,
            cloud,
            connector,
            client_id,
            mqtt,
            session: Mutex::new(None),
            state: Arc::new(state),
            devices: Arc::new(DashMap::new()),
            wanted: StdMutex::new(HashSet::new()),
        }
    }

    pub fn key(&self) -> &CredentialKey {
        &self.key
    }

    pub fn cloud(&self) -> &Arc<dyn CloudApi> {
        &self.cloud
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Serial numbers with at least one registered handle.
    pub fn serial_numbers(&self) -> Vec<String> {
        self.devices.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Register a device handle under `sn`; several handles may share one.
    pub(crate) fn add_device(&self, sn: &str, channels: DeviceChannels) {
        self.devices.entry(sn.to_owned()).or_default().push(channels);
        debug!(sn, "Device handle registered");
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// The live session, establishing it on first use.
    async fn session(&self) -> Result<Arc<Session>, CoreError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.is_alive() {
                return Ok(Arc::clone(session));
            }
            warn!("MQTT session ended, reconnecting");
            *guard = None;
        }

        let session = self.establish().await.inspect_err(|_| {
            self.state.send_replace(SessionState::Unconnected);
        })?;
        *guard = Some(Arc::clone(&session));
        drop(guard);

        let wanted: Vec<String> = self
            .wanted
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for sn in wanted {
            if let Err(e) = session.ensure_subscribed(&sn).await {
                warn!(sn = %sn, error = %e, "Re-subscribing device failed");
            }
        }

        Ok(session)
    }

    async fn establish(&self) -> Result<Arc<Session>, CoreError> {
        self.state.send_replace(SessionState::AcquiringCertificate);
        let certificate = self.cloud.acquire_certificate().await?;
        info!(
            account = %certificate.certificate_account,
            broker = %certificate.broker_url(),
            "MQTT certificate acquired"
        );

        self.state.send_replace(SessionState::Connecting);
        let mut options = MqttConnectOptions::from_certificate(&certificate, self.client_id.clone())?;
        options.keep_alive = self.mqtt.keep_alive;
        options.reconnect = self.mqtt.reconnect.clone();

        let connection = self.connector.connect(options).await.inspect_err(|e| {
            error!(error = %e, "MQTT connection failed");
        })?;

        let router = CancellationToken::new();
        let closed = CancellationToken::new();
        {
            let router = router.clone();
            let closed = closed.clone();
            let devices = Arc::clone(&self.devices);
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                router::run(connection.inbound, devices, router.clone()).await;
                if !router.is_cancelled() {
                    warn!("MQTT inbound stream ended");
                    state.send_replace(SessionState::Unconnected);
                }
                closed.cancel();
            });
        }

        self.state.send_replace(SessionState::Connected);
        Ok(Arc::new(Session {
            certificate,
            transport: connection.transport,
            subscribed: StdMutex::new(HashSet::new()),
            router,
            closed,
        }))
    }

    /// Connect if needed and subscribe the topics of `sn`.
    pub async fn subscribe_device(&self, sn: &str) -> Result<(), CoreError> {
        if let Ok(mut wanted) = self.wanted.lock() {
            wanted.insert(sn.to_owned());
        }
        let session = self.session().await?;
        session.ensure_subscribed(sn).await
    }

    /// Publish a raw payload to the `set` topic of `sn`.
    pub async fn publish(&self, sn: &str, payload: Bytes) -> Result<(), CoreError> {
        let session = self.session().await?;
        let topic = session.topic(sn, TopicKind::Set);
        debug!(sn, topic = %topic, bytes = payload.len(), "Publishing set command");
        session
            .transport
            .publish(&topic, payload)
            .await
            .map_err(|e| {
                error!(sn, topic = %topic, error = %e, "MQTT publish failed");
                CoreError::from(e)
            })
    }

    /// Unsubscribe everything and end the session after queued publishes.
    ///
    /// The certificate and client handle are dropped; the next use starts a
    /// fresh session that re-subscribes every device that had subscribed.
    pub async fn teardown(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        if let Err(e) = session.transport.unsubscribe("#").await {
            warn!(error = %e, "MQTT unsubscribe failed during teardown");
        }
        if let Err(e) = session.transport.disconnect().await {
            warn!(error = %e, "MQTT disconnect failed during teardown");
        }
        session.router.cancel();
        self.state.send_replace(SessionState::Unconnected);
        info!("MQTT session closed");
    }
}
