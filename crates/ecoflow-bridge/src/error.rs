//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use ecoflow_config::ConfigError;
use ecoflow_core::{CodecError, CommandError, CoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the EcoFlow cloud: {reason}")]
    #[diagnostic(
        code(ecoflow::connection_failed),
        help(
            "Check network access and the API URL (api.url or --api-url).\n\
             Try: ecoflow --simulate status <SN> --model <MODEL>"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("MQTT session unavailable: {reason}")]
    #[diagnostic(
        code(ecoflow::session_unavailable),
        help("The broker session could not be opened or was closed. Retry, or run with -vv for details.")
    )]
    SessionUnavailable { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("No secret key available for device '{device}'")]
    #[diagnostic(
        code(ecoflow::no_credentials),
        help(
            "Store one with: ecoflow config set-secret <ACCESS_KEY>\n\
             Or set secret_key_env on the device, or ECOFLOW_SECRET_KEY for ad-hoc devices."
        )
    )]
    NoCredentials { device: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(ecoflow::not_found),
        help("Run: ecoflow {list_command} to see available {resource_type}s, or pass --model for an ad-hoc device")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Device {sn} rejected the command: {reason}")]
    #[diagnostic(code(ecoflow::rejected))]
    CommandRejected { sn: String, reason: String },

    #[error("{reason}")]
    #[diagnostic(
        code(ecoflow::unsupported),
        help("Run: ecoflow devices models to see the product line of each model")
    )]
    Unsupported { reason: String },

    #[error("No reply from device {sn} within {timeout_ms}ms")]
    #[diagnostic(
        code(ecoflow::timeout),
        help("Increase --reply-timeout, or omit it to publish without waiting.")
    )]
    Timeout { sn: String, timeout_ms: u64 },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(ecoflow::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ecoflow::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(ecoflow::config),
        help("Check the config file. Print its location with: ecoflow config path")
    )]
    Config { message: String },

    #[error("Keyring error: {reason}")]
    #[diagnostic(
        code(ecoflow::keyring),
        help("No usable system keyring. Use secret_key_env or a plaintext secret_key instead.")
    )]
    Keyring { reason: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    #[diagnostic(code(ecoflow::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML output failed: {0}")]
    #[diagnostic(code(ecoflow::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::SessionUnavailable { .. } => {
                exit_code::CONNECTION
            }
            Self::NoCredentials { .. } | Self::Keyring { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::CommandRejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "devices list".into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },

            CoreError::SessionUnavailable { reason } => CliError::SessionUnavailable { reason },

            CoreError::SessionClosed => CliError::SessionUnavailable {
                reason: "session closed".into(),
            },

            CoreError::DeviceNotFound { sn } => CliError::device_not_found(sn),

            CoreError::CommandRejected { sn, reason } => CliError::CommandRejected { sn, reason },

            CoreError::CommandTimeout { sn, timeout_ms } => CliError::Timeout { sn, timeout_ms },

            CoreError::Codec(err) => err.into(),

            CoreError::Api {
                message,
                code,
                status,
            } => CliError::ApiError {
                code: code
                    .or_else(|| status.map(|s| format!("HTTP {s}")))
                    .unwrap_or_default(),
                message,
            },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

impl From<CodecError> for CliError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Unsupported { .. } | CodecError::ReadOnly { .. } => CliError::Unsupported {
                reason: err.to_string(),
            },
            CodecError::InvalidValue { field, reason } => CliError::Validation { field, reason },
            CodecError::Malformed { .. } | CodecError::UnknownDiscriminator { .. } => {
                CliError::ApiError {
                    code: "codec".into(),
                    message: err.to_string(),
                }
            }
        }
    }
}

impl From<CommandError> for CliError {
    fn from(err: CommandError) -> Self {
        err.into_inner().into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { device } => CliError::NoCredentials { device },
            ConfigError::UnknownDevice(identifier) => CliError::device_not_found(identifier),
            ConfigError::Keyring(e) => CliError::Keyring {
                reason: e.to_string(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecoflow_core::ProductLine;

    #[test]
    fn read_only_codec_maps_to_unsupported() {
        let err: CliError = CoreError::Codec(CodecError::ReadOnly {
            product_line: ProductLine::PowerOcean,
        })
        .into();
        assert_eq!(err.exit_code(), exit_code::UNSUPPORTED);
        assert_eq!(err.to_string(), "PowerOcean is read-only");
    }

    #[test]
    fn http_status_becomes_api_code() {
        let err: CliError = CoreError::Api {
            message: "HTTP 502 from https://api-e.ecoflow.com".into(),
            code: None,
            status: Some(502),
        }
        .into();
        match err {
            CliError::ApiError { code, .. } => assert_eq!(code, "HTTP 502"),
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let timeout: CliError = CoreError::CommandTimeout {
            sn: "R331".into(),
            timeout_ms: 500,
        }
        .into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);

        let missing: CliError = ConfigError::NoCredentials {
            device: "garage".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::AUTH);
    }
}
