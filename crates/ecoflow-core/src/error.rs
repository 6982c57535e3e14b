// ── Core error types ──
//
// User-facing errors from ecoflow-core. Consumers never see raw HTTP
// statuses or MQTT client errors; the `From<ecoflow_api::Error>` impl
// translates transport-layer errors into gateway variants.

use thiserror::Error;

use crate::model::ProductLine;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach EcoFlow cloud: {reason}")]
    ConnectionFailed { reason: String },

    #[error("MQTT session unavailable: {reason}")]
    SessionUnavailable { reason: String },

    #[error("MQTT session closed")]
    SessionClosed,

    // ── Device errors ────────────────────────────────────────────────
    #[error("Device not found: {sn}")]
    DeviceNotFound { sn: String },

    #[error("Command rejected by device {sn}: {reason}")]
    CommandRejected { sn: String, reason: String },

    #[error("No reply from device {sn} within {timeout_ms}ms")]
    CommandTimeout { sn: String, timeout_ms: u64 },

    // ── Protocol errors ──────────────────────────────────────────────
    #[error(transparent)]
    Codec(#[from] CodecError),

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// The envelope `code` returned by the cloud API.
        code: Option<String>,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure to decode an inbound payload or encode an outbound command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("{product_line}: unrecognised message discriminator '{discriminator}'")]
    UnknownDiscriminator {
        product_line: ProductLine,
        discriminator: String,
    },

    #[error("malformed payload: {reason}")]
    Malformed { reason: String },

    #[error("{product_line} does not support the {command} command")]
    Unsupported {
        product_line: ProductLine,
        command: String,
    },

    #[error("{product_line} is read-only")]
    ReadOnly { product_line: ProductLine },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl CodecError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ecoflow_api::Error> for CoreError {
    fn from(err: ecoflow_api::Error) -> Self {
        use ecoflow_api::Error as ApiError;

        match err {
            ApiError::Transport(ref e) => {
                if e.is_timeout() || e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::HttpStatus { status, url } => CoreError::Api {
                message: format!("HTTP {status} from {url}"),
                code: None,
                status: Some(status),
            },
            ApiError::Api { code, message } => CoreError::Api {
                message,
                code: Some(code),
                status: None,
            },
            ApiError::MissingData { what } => CoreError::Api {
                message: format!("no data returned for {what}"),
                code: None,
                status: None,
            },
            ApiError::Deserialization { message, .. } => CoreError::Api {
                message: format!("unexpected response: {message}"),
                code: None,
                status: None,
            },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::InvalidSigningKey(reason) => CoreError::Config {
                message: format!("Invalid secret key: {reason}"),
            },
            ApiError::Tls(reason) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {reason}"),
            },
            ApiError::MqttOptions(reason) | ApiError::MqttConnect(reason) => {
                CoreError::SessionUnavailable { reason }
            }
            ApiError::MqttClient(e) => CoreError::SessionUnavailable {
                reason: e.to_string(),
            },
            ApiError::MqttClosed => CoreError::SessionClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_envelope_error_keeps_code() {
        let err: CoreError = ecoflow_api::Error::Api {
            code: "1006".into(),
            message: "device not bound".into(),
        }
        .into();
        match err {
            CoreError::Api { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("1006"));
                assert_eq!(message, "device not bound");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn closed_transport_maps_to_session_closed() {
        let err: CoreError = ecoflow_api::Error::MqttClosed.into();
        assert!(matches!(err, CoreError::SessionClosed));
    }

    #[test]
    fn codec_error_display() {
        let err = CodecError::ReadOnly {
            product_line: ProductLine::PowerOcean,
        };
        assert_eq!(err.to_string(), "PowerOcean is read-only");
    }
}
