//! Shared helpers for command handlers.

use std::str::FromStr;

use clap::ValueEnum;
use ecoflow_core::{Device, Gateway, SetCommand, SupplyPriority};

use crate::cli::{GlobalOpts, Setting, TargetArgs};
use crate::config;
use crate::error::CliError;

/// Build a gateway holding just the targeted device.
pub fn open_device(target: &TargetArgs, global: &GlobalOpts) -> Result<(Gateway, Device), CliError> {
    let cfg = config::load(global)?;
    let device = config::resolve_device(&cfg, global, &target.device, target.model)?;
    let gateway = config::build_gateway(&cfg, global, std::slice::from_ref(&device), None)?;
    let handle = gateway.add_device(&device)?;
    Ok((gateway, handle))
}

// ── Value parsing ────────────────────────────────────────────────────

fn invalid(setting: Setting, reason: impl Into<String>) -> CliError {
    let field = setting
        .to_possible_value()
        .map_or_else(|| "value".to_owned(), |v| v.get_name().to_owned());
    CliError::Validation {
        field,
        reason: reason.into(),
    }
}

fn parse_switch(setting: Setting, value: &str) -> Result<bool, CliError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(setting, format!("expected on/off, got '{value}'"))),
    }
}

fn parse_number<T: FromStr>(setting: Setting, value: &str) -> Result<T, CliError> {
    value
        .parse()
        .map_err(|_| invalid(setting, format!("expected a number, got '{value}'")))
}

fn parse_priority(value: &str) -> Result<SupplyPriority, CliError> {
    match value.to_ascii_lowercase().as_str() {
        "supply" | "power-supply" | "home" | "0" => Ok(SupplyPriority::PowerSupply),
        "storage" | "battery" | "1" => Ok(SupplyPriority::Storage),
        _ => Err(invalid(
            Setting::SupplyPriority,
            format!("expected 'supply' or 'storage', got '{value}'"),
        )),
    }
}

/// Translate a `setting value` pair into a logical command.
pub fn parse_command(setting: Setting, value: &str) -> Result<SetCommand, CliError> {
    let command = match setting {
        Setting::Ac => SetCommand::AcOutput(parse_switch(setting, value)?),
        Setting::Xboost => SetCommand::XBoost(parse_switch(setting, value)?),
        Setting::Dc => SetCommand::DcOutput(parse_switch(setting, value)?),
        Setting::Usb => SetCommand::UsbOutput(parse_switch(setting, value)?),
        Setting::Switch => SetCommand::PlugSwitch(parse_switch(setting, value)?),
        Setting::EcoMode => SetCommand::EcoMode(parse_switch(setting, value)?),
        Setting::Power => SetCommand::Power(parse_switch(setting, value)?),
        Setting::Brightness => SetCommand::Brightness(parse_number(setting, value)?),
        Setting::ChargeLimit => SetCommand::ChargeLimit(parse_number(setting, value)?),
        Setting::DischargeLimit => SetCommand::DischargeLimit(parse_number(setting, value)?),
        Setting::AcChargingPower => SetCommand::AcChargingPower(parse_number(setting, value)?),
        Setting::PowerDemand => SetCommand::PowerDemand(parse_number(setting, value)?),
        Setting::SupplyPriority => SetCommand::SupplyPriority(parse_priority(value)?),
        Setting::TargetTemperature => {
            SetCommand::TargetTemperature(parse_number(setting, value)?)
        }
        Setting::FanSpeed => SetCommand::FanSpeed(parse_number(setting, value)?),
        Setting::Mode => SetCommand::OperatingMode(parse_number(setting, value)?),
    };
    Ok(command)
}
