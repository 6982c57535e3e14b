//! Resolve the config file, device targets and the gateway backend from
//! global flags.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ecoflow_config::{self as config_file, Config, DeviceEntry};
use ecoflow_core::{
    Credentials, DeviceConfig, DeviceModel, Gateway, GatewayConfig, SimulatedConnector,
};
use secrecy::SecretString;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Credential placeholder for simulated devices without configured keys.
const SIMULATED_KEY: &str = "simulated";

pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_file::config_path)
}

/// Load the config file named by `--config`, or the platform default.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(config_file::load_config_from(&config_path(global))?)
}

// ── Device targets ───────────────────────────────────────────────────

/// Resolve a device by name or serial number, falling back to an ad-hoc
/// device when `model` is given.
pub fn resolve_device(
    cfg: &Config,
    global: &GlobalOpts,
    identifier: &str,
    model: Option<DeviceModel>,
) -> Result<DeviceConfig, CliError> {
    if let Some(entry) = cfg.device(identifier) {
        return configured_device(entry, global);
    }
    let model = model.ok_or_else(|| CliError::device_not_found(identifier))?;
    ad_hoc_device(global, identifier, model)
}

/// Resolve the devices named on the command line, or every configured one.
pub fn resolve_devices(
    cfg: &Config,
    global: &GlobalOpts,
    identifiers: &[String],
    model: Option<DeviceModel>,
) -> Result<Vec<DeviceConfig>, CliError> {
    if identifiers.is_empty() {
        if cfg.devices.is_empty() {
            return Err(CliError::Validation {
                field: "devices".into(),
                reason: "no devices configured; name one with --model or add one with `ecoflow config add-device`".into(),
            });
        }
        return cfg
            .devices
            .iter()
            .map(|entry| configured_device(entry, global))
            .collect();
    }
    identifiers
        .iter()
        .map(|identifier| resolve_device(cfg, global, identifier, model))
        .collect()
}

fn configured_device(entry: &DeviceEntry, global: &GlobalOpts) -> Result<DeviceConfig, CliError> {
    match config_file::to_device_config(entry) {
        Ok(device) => Ok(device),
        Err(config_file::ConfigError::NoCredentials { .. }) if global.simulate => {
            Ok(DeviceConfig {
                name: entry.name.clone(),
                serial_number: entry.serial_number.clone(),
                model: entry.model,
                credentials: Credentials::new(
                    entry.access_key.clone(),
                    SecretString::from(SIMULATED_KEY.to_owned()),
                ),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn ad_hoc_device(
    global: &GlobalOpts,
    serial_number: &str,
    model: DeviceModel,
) -> Result<DeviceConfig, CliError> {
    let credentials = match (&global.access_key, &global.secret_key) {
        (Some(access_key), Some(secret_key)) => {
            Credentials::new(access_key.clone(), SecretString::from(secret_key.clone()))
        }
        _ if global.simulate => Credentials::new(
            global.access_key.clone().unwrap_or_else(|| SIMULATED_KEY.to_owned()),
            SecretString::from(SIMULATED_KEY.to_owned()),
        ),
        _ => {
            return Err(CliError::NoCredentials {
                device: serial_number.to_owned(),
            });
        }
    };
    Ok(DeviceConfig {
        name: serial_number.to_owned(),
        serial_number: serial_number.to_owned(),
        model,
        credentials,
    })
}

// ── Gateway ──────────────────────────────────────────────────────────

/// Runtime gateway settings: config file values with flag overrides.
pub fn gateway_config(cfg: &Config, global: &GlobalOpts) -> Result<GatewayConfig, CliError> {
    let mut gateway = config_file::to_gateway_config(cfg)?;
    if let Some(ref raw) = global.api_url {
        gateway.api_url = raw.parse().map_err(|_| CliError::Validation {
            field: "api-url".into(),
            reason: format!("invalid URL: {raw}"),
        })?;
    }
    if let Some(timeout) = global.reply_timeout {
        gateway.reply_timeout = Some(timeout);
    }
    Ok(gateway)
}

/// Build a gateway for `devices`: the EcoFlow cloud, or in-process
/// simulators with `--simulate`.
pub fn build_gateway(
    cfg: &Config,
    global: &GlobalOpts,
    devices: &[DeviceConfig],
    sim_interval: Option<Duration>,
) -> Result<Gateway, CliError> {
    let gateway_config = gateway_config(cfg, global)?;
    if !global.simulate {
        return Ok(Gateway::new(gateway_config));
    }

    let mut connector = SimulatedConnector::new();
    if let Some(interval) = sim_interval {
        connector = connector.with_quota_interval(interval);
    }
    for device in devices {
        connector.register_model(device.serial_number.clone(), device.model);
    }
    tracing::info!(devices = devices.len(), "Using simulated devices");
    let connector = Arc::new(connector);
    Ok(Gateway::with_backend(
        gateway_config,
        connector.cloud_factory(),
        connector,
    ))
}
