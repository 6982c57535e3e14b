//! MQTT transport with auto-reconnect.
//!
//! The gateway talks to the broker through the object-safe
//! [`MqttTransport`] / [`TransportConnector`] pair so that a simulated
//! transport can stand in for the real broker. [`RumqttcConnector`] is the
//! production implementation on top of `rumqttc`'s MQTT v5 client.
//!
//! Inbound publishes are forwarded through a bounded [`mpsc`] channel in
//! arrival order. After a connection error the event loop keeps polling with
//! exponential backoff + jitter and re-issues every active subscription once
//! the broker accepts the reconnect.
//!
//! # Example
//!
//! ```rust,ignore
//! use ecoflow_api::mqtt::{MqttConnectOptions, RumqttcConnector, TransportConnector};
//!
//! let options = MqttConnectOptions::from_certificate(&certificate, "HOMEBRIDGE_ABC")?;
//! let mut connection = RumqttcConnector.connect(options).await?;
//! connection.transport.subscribe("/open/acc/SN/quota").await?;
//!
//! while let Some(message) = connection.inbound.recv().await {
//!     println!("{}: {} bytes", message.topic, message.payload.len());
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use rumqttc::Transport;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::http::Certificate;

// ── Channel capacities ───────────────────────────────────────────────

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const INBOUND_CHANNEL_CAPACITY: usize = 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

// ── InboundMessage ───────────────────────────────────────────────────

/// A raw publish received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for broker reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 60s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: None,
        }
    }
}

// ── MqttConnectOptions ───────────────────────────────────────────────

/// Everything needed to open one broker connection.
#[derive(Clone)]
pub struct MqttConnectOptions {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub client_id: String,
    pub username: String,
    pub password: SecretString,
    pub keep_alive: Duration,
    pub reconnect: ReconnectConfig,
}

impl std::fmt::Debug for MqttConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl MqttConnectOptions {
    /// Broker address and credentials from an issued certificate.
    ///
    /// The certificate account and password are the MQTT username/password.
    pub fn from_certificate(certificate: &Certificate, client_id: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            host: certificate.url.clone(),
            port: certificate.port_number()?,
            use_tls: certificate.uses_tls(),
            client_id: client_id.into(),
            username: certificate.certificate_account.clone(),
            password: SecretString::from(certificate.certificate_password.clone()),
            keep_alive: Duration::from_secs(60),
            reconnect: ReconnectConfig::default(),
        })
    }
}

// ── Transport traits ─────────────────────────────────────────────────

/// A live broker connection shared by every device of one account.
#[async_trait]
pub trait MqttTransport: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), Error>;
    async fn unsubscribe(&self, topic: &str) -> Result<(), Error>;
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), Error>;
    /// Close the connection after queued requests have been handed over.
    async fn disconnect(&self) -> Result<(), Error>;
}

/// An open connection: the shared transport plus its inbound stream.
pub struct MqttConnection {
    pub transport: Arc<dyn MqttTransport>,
    pub inbound: mpsc::Receiver<InboundMessage>,
}

/// Opens broker connections.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, options: MqttConnectOptions) -> Result<MqttConnection, Error>;
}

// ── rumqttc implementation ───────────────────────────────────────────

/// Connector backed by `rumqttc` (MQTT v5, clean start).
#[derive(Debug, Clone, Copy, Default)]
pub struct RumqttcConnector;

#[async_trait]
impl TransportConnector for RumqttcConnector {
    async fn connect(&self, options: MqttConnectOptions) -> Result<MqttConnection, Error> {
        tracing::info!(
            host = %options.host,
            port = options.port,
            client_id = %options.client_id,
            "Connecting to MQTT broker"
        );

        let mut mqtt_options = MqttOptions::new(&options.client_id, &options.host, options.port);
        mqtt_options.set_credentials(&options.username, options.password.expose_secret());
        mqtt_options.set_keep_alive(options.keep_alive);
        mqtt_options.set_clean_start(true);
        if options.use_tls {
            mqtt_options.set_transport(Transport::tls_with_default_config());
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                Error::MqttConnect(format!(
                    "no CONNACK within {}s",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })??;

        tracing::info!("MQTT broker accepted connection");

        let shared = Arc::new(Shared {
            subscriptions: Mutex::new(BTreeSet::new()),
            closing: AtomicBool::new(false),
            closed: Notify::new(),
        });
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        tokio::spawn(event_loop(
            eventloop,
            client.clone(),
            inbound_tx,
            Arc::clone(&shared),
            options.reconnect,
            cancel.clone(),
        ));

        Ok(MqttConnection {
            transport: Arc::new(RumqttcTransport {
                client,
                shared,
                cancel,
            }),
            inbound: inbound_rx,
        })
    }
}

/// State shared between the client handle and its event loop task.
struct Shared {
    /// Active subscriptions, replayed after every reconnect.
    subscriptions: Mutex<BTreeSet<String>>,
    closing: AtomicBool,
    closed: Notify,
}

impl Shared {
    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn remember(&self, topic: &str) {
        if let Ok(mut set) = self.subscriptions.lock() {
            set.insert(topic.to_owned());
        }
    }

    fn forget(&self, topic: &str) {
        if let Ok(mut set) = self.subscriptions.lock() {
            if topic == "#" {
                set.clear();
            } else {
                set.remove(topic);
            }
        }
    }
}

struct RumqttcTransport {
    client: AsyncClient,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

#[async_trait]
impl MqttTransport for RumqttcTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), Error> {
        tracing::debug!(topic, "MQTT subscribe");
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        self.shared.remember(topic);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        tracing::debug!(topic, "MQTT unsubscribe");
        self.client.unsubscribe(topic).await?;
        self.shared.forget(topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), Error> {
        tracing::debug!(topic, bytes = payload.len(), "MQTT publish");
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Error> {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // The request channel is FIFO: publishes queued before this point are
        // written to the socket before the DISCONNECT packet.
        let result = self.client.disconnect().await.map_err(Error::from);
        let _ = tokio::time::timeout(DISCONNECT_GRACE, self.shared.closed.notified()).await;
        self.cancel.cancel();
        result
    }
}

/// Poll until the broker acknowledges the initial CONNECT.
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), Error> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(Error::MqttConnect(e.to_string())),
        }
    }
}

// ── Background event loop ────────────────────────────────────────────

/// Main loop: poll → forward publishes → on error, backoff → poll again
/// (which makes rumqttc reconnect).
async fn event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    inbound_tx: mpsc::Sender<InboundMessage>,
    shared: Arc<Shared>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                        payload: publish.payload,
                    };
                    if inbound_tx.send(message).await.is_err() {
                        tracing::debug!("Inbound receiver dropped, stopping MQTT loop");
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // Only reconnects reach this arm; the first CONNACK is
                    // consumed by `wait_for_connack`.
                    attempt = 0;
                    resubscribe(&client, &shared);
                }
                Ok(Event::Incoming(Packet::Disconnect(_))) => {
                    tracing::warn!("Broker sent DISCONNECT");
                }
                Ok(_) => {}
                Err(e) => {
                    if shared.closing.load(Ordering::SeqCst) {
                        tracing::debug!(error = %e, "MQTT connection closed");
                        break;
                    }

                    tracing::warn!(error = %e, attempt, "MQTT connection error");

                    if let Some(max) = reconnect.max_retries {
                        if attempt >= max {
                            tracing::error!(
                                max_retries = max,
                                "MQTT reconnection limit reached, giving up"
                            );
                            break;
                        }
                    }

                    let delay = calculate_backoff(attempt, &reconnect);
                    tracing::info!(
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        attempt,
                        "Waiting before MQTT reconnect"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }

                    attempt += 1;
                }
            }
        }
    }

    shared.closed.notify_waiters();
    tracing::debug!("MQTT loop exiting");
}

/// Replay active subscriptions after a clean-start reconnect.
fn resubscribe(client: &AsyncClient, shared: &Shared) {
    let topics = shared.subscriptions();
    if topics.is_empty() {
        return;
    }
    tracing::info!(count = topics.len(), "Re-subscribing after reconnect");
    for topic in topics {
        // try_subscribe: the event loop must not block on its own request channel.
        if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
            tracing::warn!(error = %e, topic = %topic, "Re-subscribe failed");
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`, `jitter` drawn from
/// `[0.75, 1.25]` on every call so that gateways sharing a broker outage
/// reconnect at different times.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let jitter = rand::thread_rng().gen_range(1.0 - JITTER..=1.0 + JITTER);
    backoff_with_jitter(attempt, config, jitter)
}

const JITTER: f64 = 0.25;

fn backoff_with_jitter(attempt: u32, config: &ReconnectConfig, jitter: f64) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn certificate(protocol: &str, port: &str) -> Certificate {
        Certificate {
            certificate_account: "open-account".into(),
            certificate_password: "secret-pw".into(),
            url: "mqtt-e.ecoflow.com".into(),
            port: port.into(),
            protocol: protocol.into(),
        }
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
        // Huge attempt counts must not overflow.
        assert!(calculate_backoff(u32::MAX, &config) <= Duration::from_secs(13));
    }

    #[test]
    fn backoff_jitter_bounds() {
        let config = ReconnectConfig::default();
        assert_eq!(
            backoff_with_jitter(2, &config, 1.0 - JITTER),
            Duration::from_secs(3)
        );
        assert_eq!(
            backoff_with_jitter(2, &config, 1.0 + JITTER),
            Duration::from_secs(5)
        );
        for _ in 0..200 {
            let delay = calculate_backoff(2, &config);
            assert!(delay >= Duration::from_secs(3) && delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn backoff_differs_between_calls() {
        let config = ReconnectConfig::default();
        let delays: BTreeSet<Duration> = (0..50).map(|_| calculate_backoff(3, &config)).collect();
        assert!(delays.len() > 1, "every call produced {delays:?}");
    }

    #[test]
    fn options_from_certificate() {
        let options =
            MqttConnectOptions::from_certificate(&certificate("mqtts", "8883"), "HOMEBRIDGE_X")
                .unwrap();
        assert_eq!(options.host, "mqtt-e.ecoflow.com");
        assert_eq!(options.port, 8883);
        assert!(options.use_tls);
        assert_eq!(options.username, "open-account");
        assert_eq!(options.password.expose_secret(), "secret-pw");
        assert_eq!(options.client_id, "HOMEBRIDGE_X");

        let plain =
            MqttConnectOptions::from_certificate(&certificate("mqtt", "1883"), "id").unwrap();
        assert!(!plain.use_tls);
    }

    #[test]
    fn options_reject_bad_port() {
        let result = MqttConnectOptions::from_certificate(&certificate("mqtts", "port"), "id");
        assert!(matches!(result, Err(Error::MqttOptions(_))));
    }

    #[test]
    fn options_debug_hides_password() {
        let options =
            MqttConnectOptions::from_certificate(&certificate("mqtts", "8883"), "id").unwrap();
        assert!(!format!("{options:?}").contains("secret-pw"));
    }

    #[test]
    fn shared_subscription_bookkeeping() {
        let shared = Shared {
            subscriptions: Mutex::new(BTreeSet::new()),
            closing: AtomicBool::new(false),
            closed: Notify::new(),
        };
        shared.remember("/open/a/SN1/quota");
        shared.remember("/open/a/SN1/set_reply");
        shared.forget("/open/a/SN1/quota");
        assert_eq!(shared.subscriptions(), vec!["/open/a/SN1/set_reply".to_string()]);

        shared.forget("#");
        assert!(shared.subscriptions().is_empty());
    }
}
