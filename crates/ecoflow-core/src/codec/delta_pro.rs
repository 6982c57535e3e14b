// Delta Pro.
//
// Inbound:  { params: { "pd.soc": 80, "inv.cfgAcEnabled": 1, ... } }
// Outbound: { id, version, sn, params: { cmdSet: 32, id: <cmd>, ... } }

use serde_json::{Value, json};

use super::{
    EncodeContext, IGNORED_BYTE, IGNORED_VOLTAGE, QuotaCodec, check_percent, flag,
    message_params, object, param_bool, param_u8, param_u32, param_u64, percent_of, unsupported,
};
use crate::error::CodecError;
use crate::model::{
    DeviceStatus, Framing, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand, SetEnvelope,
};

/// Address prefixes of the reporting modules.
const PREFIXES: &[&str] = &["pd.", "inv.", "bmsMaster.", "ems.", "mppt."];

const CMD_SET: u8 = 32;

const CMD_USB: u8 = 34;
const CMD_LCD_BRIGHTNESS: u8 = 39;
const CMD_MAX_CHARGE_SOC: u8 = 49;
const CMD_MIN_DISCHARGE_SOC: u8 = 51;
const CMD_AC_OUT: u8 = 66;
const CMD_AC_CHARGE_WATTS: u8 = 69;
const CMD_CAR_OUT: u8 = 81;

pub mod keys {
    pub const SOC: &str = "pd.soc";
    pub const WATTS_IN: &str = "pd.wattsInSum";
    pub const WATTS_OUT: &str = "pd.wattsOutSum";
    pub const USB_STATE: &str = "pd.dcOutState";
    pub const BRIGHTNESS: &str = "pd.lcdBrightness";
    pub const AC_ENABLED: &str = "inv.cfgAcEnabled";
    pub const AC_XBOOST: &str = "inv.cfgAcXboost";
    pub const AC_OUT_VOLTAGE: &str = "inv.cfgAcOutVoltage";
    pub const AC_OUT_FREQ: &str = "inv.cfgAcOutFreq";
    pub const AC_CHARGE_WATTS: &str = "inv.cfgSlowChgWatts";
    pub const CAR_STATE: &str = "mppt.carState";
    pub const MAX_CHARGE_SOC: &str = "ems.maxChargeSoc";
    pub const MIN_DISCHARGE_SOC: &str = "ems.minDsgSoc";
}

pub struct DeltaProCodec;

fn cmd(id: u8) -> Framing {
    Framing::CmdSet {
        cmd_set: CMD_SET,
        cmd: id,
    }
}

impl QuotaCodec for DeltaProCodec {
    fn product_line(&self) -> ProductLine {
        ProductLine::DeltaPro
    }

    fn decode_quota(&self, message: &Value) -> Result<QuotaPatch, CodecError> {
        let params = message_params(message)?;

        let mut patch = QuotaPatch::new();
        for (key, value) in params {
            if PREFIXES.iter().any(|prefix| key.starts_with(prefix)) {
                patch.set(key.clone(), value.clone());
            }
        }

        if patch.is_empty() && !params.is_empty() {
            return Err(CodecError::UnknownDiscriminator {
                product_line: self.product_line(),
                discriminator: params.keys().next().cloned().unwrap_or_default(),
            });
        }
        Ok(patch)
    }

    fn encode(
        &self,
        command: &SetCommand,
        ctx: &EncodeContext<'_>,
    ) -> Result<SetEnvelope, CodecError> {
        let cached = |key: &str, fallback: u64| ctx.snapshot.get_u64(key).unwrap_or(fallback);

        let (framing, params) = match *command {
            SetCommand::AcOutput(on) => (
                cmd(CMD_AC_OUT),
                json!({
                    "enabled": flag(on),
                    "xboost": cached(keys::AC_XBOOST, IGNORED_BYTE),
                    "out_voltage": cached(keys::AC_OUT_VOLTAGE, IGNORED_VOLTAGE),
                    "out_freq": cached(keys::AC_OUT_FREQ, IGNORED_BYTE),
                }),
            ),
            SetCommand::XBoost(on) => (
                cmd(CMD_AC_OUT),
                json!({
                    "enabled": IGNORED_BYTE,
                    "xboost": flag(on),
                    "out_voltage": IGNORED_VOLTAGE,
                    "out_freq": IGNORED_BYTE,
                }),
            ),
            SetCommand::DcOutput(on) => (cmd(CMD_CAR_OUT), json!({ "enabled": flag(on) })),
            SetCommand::UsbOutput(on) => (cmd(CMD_USB), json!({ "enabled": flag(on) })),
            SetCommand::Brightness(percent) => (
                cmd(CMD_LCD_BRIGHTNESS),
                json!({ "lcdBrightness": check_percent("lcdBrightness", percent)? }),
            ),
            SetCommand::ChargeLimit(percent) => (
                cmd(CMD_MAX_CHARGE_SOC),
                json!({ "maxChgSoc": check_percent("maxChgSoc", percent)? }),
            ),
            SetCommand::DischargeLimit(percent) => (
                cmd(CMD_MIN_DISCHARGE_SOC),
                json!({ "minDsgSoc": check_percent("minDsgSoc", percent)? }),
            ),
            SetCommand::AcChargingPower(watts) => (
                cmd(CMD_AC_CHARGE_WATTS),
                json!({ "slowChgPower": watts }),
            ),
            _ => return Err(unsupported(self.product_line(), command)),
        };

        Ok(ctx.envelope(framing, object(params)))
    }

    fn optimistic_patch(&self, command: &SetCommand) -> Result<QuotaPatch, CodecError> {
        let patch = QuotaPatch::new();
        Ok(match *command {
            SetCommand::AcOutput(on) => patch.with(keys::AC_ENABLED, flag(on)),
            SetCommand::XBoost(on) => patch.with(keys::AC_XBOOST, flag(on)),
            SetCommand::DcOutput(on) => patch.with(keys::CAR_STATE, flag(on)),
            SetCommand::UsbOutput(on) => patch.with(keys::USB_STATE, flag(on)),
            SetCommand::Brightness(percent) => patch.with(keys::BRIGHTNESS, percent),
            SetCommand::ChargeLimit(percent) => patch.with(keys::MAX_CHARGE_SOC, percent),
            SetCommand::DischargeLimit(percent) => patch.with(keys::MIN_DISCHARGE_SOC, percent),
            SetCommand::AcChargingPower(watts) => patch.with(keys::AC_CHARGE_WATTS, watts),
            _ => return Err(unsupported(self.product_line(), command)),
        })
    }

    fn decode_command(&self, envelope: &SetEnvelope) -> Result<SetCommand, CodecError> {
        let id = envelope
            .cmd()
            .ok_or_else(|| CodecError::malformed("expected a cmdSet envelope"))?;

        match id {
            CMD_AC_OUT => {
                if param_u64(envelope, "enabled")? == IGNORED_BYTE {
                    Ok(SetCommand::XBoost(param_bool(envelope, "xboost")?))
                } else {
                    Ok(SetCommand::AcOutput(param_bool(envelope, "enabled")?))
                }
            }
            CMD_CAR_OUT => Ok(SetCommand::DcOutput(param_bool(envelope, "enabled")?)),
            CMD_USB => Ok(SetCommand::UsbOutput(param_bool(envelope, "enabled")?)),
            CMD_LCD_BRIGHTNESS => Ok(SetCommand::Brightness(param_u8(envelope, "lcdBrightness")?)),
            CMD_MAX_CHARGE_SOC => Ok(SetCommand::ChargeLimit(param_u8(envelope, "maxChgSoc")?)),
            CMD_MIN_DISCHARGE_SOC => {
                Ok(SetCommand::DischargeLimit(param_u8(envelope, "minDsgSoc")?))
            }
            CMD_AC_CHARGE_WATTS => {
                Ok(SetCommand::AcChargingPower(param_u32(envelope, "slowChgPower")?))
            }
            other => Err(CodecError::UnknownDiscriminator {
                product_line: self.product_line(),
                discriminator: other.to_string(),
            }),
        }
    }

    fn status(&self, snapshot: &QuotaSnapshot) -> DeviceStatus {
        DeviceStatus {
            battery_level: snapshot.get_f64(keys::SOC),
            input_watts: snapshot.get_f64(keys::WATTS_IN),
            output_watts: snapshot.get_f64(keys::WATTS_OUT),
            ac_enabled: snapshot.enabled(keys::AC_ENABLED),
            xboost_enabled: snapshot.enabled(keys::AC_XBOOST),
            dc_enabled: snapshot.enabled(keys::CAR_STATE),
            usb_enabled: snapshot.enabled(keys::USB_STATE),
            brightness_percent: percent_of(snapshot, keys::BRIGHTNESS),
            charge_limit: percent_of(snapshot, keys::MAX_CHARGE_SOC),
            discharge_limit: percent_of(snapshot, keys::MIN_DISCHARGE_SOC),
            ..DeviceStatus::default()
        }
    }

    fn report(&self, snapshot: &QuotaSnapshot) -> Vec<Value> {
        let params: serde_json::Map<String, Value> = snapshot
            .iter()
            .filter(|(key, _)| PREFIXES.iter().any(|prefix| key.starts_with(prefix)))
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect();
        if params.is_empty() {
            return Vec::new();
        }
        vec![json!({ "params": Value::Object(params) })]
    }
}
