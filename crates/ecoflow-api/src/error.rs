use thiserror::Error;

/// Top-level error type for the `ecoflow-api` crate.
///
/// Covers every failure mode across both API surfaces:
/// request signing, HTTP transport, the `{code, message, data}` envelope,
/// and the MQTT transport. `ecoflow-core` maps these into gateway errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Signing ─────────────────────────────────────────────────────
    /// The secret key could not be used as an HMAC key.
    #[error("Invalid signing key: {0}")]
    InvalidSigningKey(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-2xx HTTP status from the cloud API.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    // ── Cloud API ───────────────────────────────────────────────────
    /// The API answered with a non-success `code` in its envelope.
    #[error("EcoFlow API error (code {code}): {message}")]
    Api { code: String, message: String },

    /// The envelope reported success but carried no `data`.
    #[error("EcoFlow API returned no data for {what}")]
    MissingData { what: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── MQTT ────────────────────────────────────────────────────────
    /// Broker address or options could not be built.
    #[error("Invalid MQTT options: {0}")]
    MqttOptions(String),

    /// The broker refused or dropped the connection.
    #[error("MQTT connection failed: {0}")]
    MqttConnect(String),

    /// A subscribe/publish/disconnect request could not be queued.
    #[error("MQTT client error: {0}")]
    MqttClient(#[from] rumqttc::v5::ClientError),

    /// The transport has been shut down.
    #[error("MQTT transport closed")]
    MqttClosed,
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::MqttConnect(_) => true,
            _ => false,
        }
    }

    /// Extract the API error code, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}
