//! Configuration for the EcoFlow bridge.
//!
//! TOML file + `ECOFLOW_` environment overrides, secret key resolution
//! (env var, keyring, plaintext), and translation to the runtime
//! `ecoflow_core::GatewayConfig` / `DeviceConfig` types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use ecoflow_api::{DEFAULT_API_URL, ReconnectConfig, TlsMode, TransportConfig};
use ecoflow_core::{Credentials, DeviceConfig, DeviceModel, GatewayConfig, MqttSettings};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keyring service name for stored secret keys.
pub const KEYRING_SERVICE: &str = "ecoflow-bridge";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no secret key configured for device '{device}'")]
    NoCredentials { device: String },

    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub mqtt: MqttSection,

    /// Devices to bridge.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSection {
    /// Cloud API base URL (regional, e.g. "https://api-e.ecoflow.com").
    #[serde(default = "default_api_url")]
    pub url: String,

    /// HTTP timeout, humantime syntax ("30s").
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            timeout: default_timeout(),
            ca_cert: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MqttSection {
    /// Client id override. Derived from the machine id when unset.
    pub client_id: Option<String>,

    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,

    /// First reconnect delay.
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial: String,

    /// Reconnect delay ceiling.
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max: String,

    /// Give up after this many failed reconnects. Unlimited when unset.
    pub max_retries: Option<u32>,

    /// Wait this long for a set reply before failing a command.
    pub reply_timeout: Option<String>,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            client_id: None,
            keep_alive: default_keep_alive(),
            reconnect_initial: default_reconnect_initial(),
            reconnect_max: default_reconnect_max(),
            max_retries: None,
            reply_timeout: None,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}
fn default_timeout() -> String {
    "30s".into()
}
fn default_keep_alive() -> String {
    "60s".into()
}
fn default_reconnect_initial() -> String {
    "1s".into()
}
fn default_reconnect_max() -> String {
    "60s".into()
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub name: String,
    pub serial_number: String,
    /// Model display name or alias ("Delta 2", "delta2", "Smart Plug").
    pub model: DeviceModel,
    pub access_key: String,

    /// Secret key (plaintext; prefer keyring or env var).
    pub secret_key: Option<String>,

    /// Environment variable holding the secret key.
    pub secret_key_env: Option<String>,
}

impl Config {
    pub fn device(&self, sn_or_name: &str) -> Option<&DeviceEntry> {
        self.devices
            .iter()
            .find(|d| d.serial_number == sn_or_name || d.name.eq_ignore_ascii_case(sn_or_name))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ecoflow-bridge", "ecoflow-bridge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ecoflow-bridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest with `__`: `ECOFLOW_API__URL`,
/// `ECOFLOW_MQTT__REPLY_TIMEOUT`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ECOFLOW_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(access_key: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{access_key}/secret-key"))
}

/// Resolve a device's secret key: env var, then keyring, then plaintext.
pub fn resolve_secret_key(device: &DeviceEntry) -> Result<SecretString, ConfigError> {
    // 1. Device's secret_key_env → env var lookup
    if let Some(ref env_name) = device.secret_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring, keyed by access key
    if let Ok(entry) = keyring_entry(&device.access_key) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref key) = device.secret_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        device: device.name.clone(),
    })
}

/// Store a secret key in the system keyring.
pub fn store_secret_key(access_key: &str, secret_key: &str) -> Result<(), ConfigError> {
    keyring_entry(access_key)?.set_password(secret_key)?;
    Ok(())
}

// ── Translation to runtime config ───────────────────────────────────

fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{raw}': {e}"),
    })
}

/// Build the process-wide `GatewayConfig`.
pub fn to_gateway_config(cfg: &Config) -> Result<GatewayConfig, ConfigError> {
    let api_url: url::Url = cfg.api.url.parse().map_err(|_| ConfigError::Validation {
        field: "api.url".into(),
        reason: format!("invalid URL: {}", cfg.api.url),
    })?;

    let tls = cfg
        .api
        .ca_cert
        .clone()
        .map_or(TlsMode::System, TlsMode::CustomCa);

    let reply_timeout = cfg
        .mqtt
        .reply_timeout
        .as_deref()
        .map(|raw| parse_duration("mqtt.reply_timeout", raw))
        .transpose()?;

    Ok(GatewayConfig {
        api_url,
        transport: TransportConfig {
            tls,
            timeout: parse_duration("api.timeout", &cfg.api.timeout)?,
        },
        mqtt: MqttSettings {
            client_id: cfg.mqtt.client_id.clone(),
            keep_alive: parse_duration("mqtt.keep_alive", &cfg.mqtt.keep_alive)?,
            reconnect: ReconnectConfig {
                initial_delay: parse_duration("mqtt.reconnect_initial", &cfg.mqtt.reconnect_initial)?,
                max_delay: parse_duration("mqtt.reconnect_max", &cfg.mqtt.reconnect_max)?,
                max_retries: cfg.mqtt.max_retries,
            },
        },
        reply_timeout,
    })
}

/// Build the runtime config of one device, resolving its secret key.
pub fn to_device_config(device: &DeviceEntry) -> Result<DeviceConfig, ConfigError> {
    if device.serial_number.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "serial_number".into(),
            reason: format!("device '{}' has an empty serial number", device.name),
        });
    }
    let secret_key = resolve_secret_key(device)?;
    Ok(DeviceConfig {
        name: device.name.clone(),
        serial_number: device.serial_number.clone(),
        model: device.model,
        credentials: Credentials::new(device.access_key.clone(), secret_key),
    })
}

/// Runtime configs of every configured device.
pub fn device_configs(cfg: &Config) -> Result<Vec<DeviceConfig>, ConfigError> {
    cfg.devices.iter().map(to_device_config).collect()
}
