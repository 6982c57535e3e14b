// ── Runtime gateway configuration ──
//
// These types describe *how* to reach the EcoFlow cloud and which devices
// to bridge. They carry credential data and connection tuning, but never
// touch disk. The config crate (or a test) builds a `GatewayConfig` and
// hands it in.

use std::fmt;
use std::time::Duration;

use ecoflow_api::{ReconnectConfig, TransportConfig};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::model::DeviceModel;

/// Access/secret key pair of one EcoFlow developer account.
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: SecretString,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key,
        }
    }

    /// Registry key: `accessKey + "_" + secretKey`.
    pub fn key(&self) -> CredentialKey {
        CredentialKey(format!(
            "{}_{}",
            self.access_key,
            self.secret_key.expose_secret()
        ))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

/// Identity of a connection in the registry. Contains the secret key,
/// so `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey(String);

impl fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access_key = self.0.split('_').next().unwrap_or_default();
        write!(f, "CredentialKey({access_key}_***)")
    }
}

/// MQTT session tuning.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Client id override; derived from the machine id when `None`.
    pub client_id: Option<String>,
    pub keep_alive: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            keep_alive: Duration::from_secs(60),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Process-wide gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Cloud API base URL (e.g., `https://api-e.ecoflow.com`).
    pub api_url: Url,
    /// HTTP timeout and TLS settings.
    pub transport: TransportConfig,
    pub mqtt: MqttSettings,
    /// Wait this long for a set reply before treating a command as failed.
    /// `None` publishes without waiting.
    pub reply_timeout: Option<Duration>,
}

impl GatewayConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            transport: TransportConfig::default(),
            mqtt: MqttSettings::default(),
            reply_timeout: None,
        }
    }
}

/// One physical device to bridge.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Display name.
    pub name: String,
    pub serial_number: String,
    pub model: DeviceModel,
    pub credentials: Credentials,
}
