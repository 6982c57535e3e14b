// Delta 2 family: Delta 2, Delta 2 Max, River 2, River 2 Max, River 2 Pro.
//
// Inbound:  { typeCode: "invStatus", params: { cfgAcEnabled: 1, ... } }
// Outbound: { id, version, sn, moduleType, operateType, params }

use serde_json::{Value, json};

use super::{
    EncodeContext, IGNORED_BYTE, IGNORED_VOLTAGE, QuotaCodec, check_percent, decode_type_code,
    flag, object, param_bool, param_u8, param_u32, param_u64, percent_of, report_type_code,
    unsupported,
};
use crate::error::CodecError;
use crate::model::{
    DeviceModel, DeviceStatus, Framing, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand,
    SetEnvelope,
};

const SECTIONS: &[(&str, &str)] = &[
    ("pdStatus", "pd."),
    ("bmsStatus", "bms_bmsStatus."),
    ("emsStatus", "bms_emsStatus."),
    ("invStatus", "inv."),
    ("mpptStatus", "mppt."),
];

const MODULE_PD: u8 = 1;
const MODULE_BMS: u8 = 2;
const MODULE_INV: u8 = 3;
const MODULE_MPPT: u8 = 5;

/// Kept LCD timeout when only the brightness changes.
const IGNORED_LCD_TIMEOUT: u64 = 0xffff;

pub mod keys {
    pub const SOC: &str = "pd.soc";
    pub const WATTS_IN: &str = "pd.wattsInSum";
    pub const WATTS_OUT: &str = "pd.wattsOutSum";
    pub const USB_STATE: &str = "pd.dcOutState";
    pub const BRIGHTNESS: &str = "pd.brightLevel";
    pub const LCD_TIMEOUT: &str = "pd.lcdOffSec";
    pub const AC_ENABLED: &str = "inv.cfgAcEnabled";
    pub const AC_XBOOST: &str = "inv.cfgAcXboost";
    pub const AC_OUT_VOLTAGE: &str = "inv.cfgAcOutVol";
    pub const AC_OUT_FREQ: &str = "inv.cfgAcOutFreq";
    pub const CAR_STATE: &str = "mppt.carState";
    pub const AC_CHARGE_WATTS: &str = "mppt.cfgChgWatts";
    pub const MAX_CHARGE_SOC: &str = "bms_emsStatus.maxChargeSoc";
    pub const MIN_DISCHARGE_SOC: &str = "bms_emsStatus.minDsgSoc";
}

pub struct Delta2Codec {
    model: DeviceModel,
}

impl Delta2Codec {
    pub fn new(model: DeviceModel) -> Self {
        Self { model }
    }

    /// Module owning the AC inverter configuration.
    fn ac_module(&self) -> u8 {
        match self.model {
            DeviceModel::Delta2Max => MODULE_INV,
            _ => MODULE_MPPT,
        }
    }

    fn module(module_type: u8, operate_type: &str) -> Framing {
        Framing::Module {
            module_type,
            operate_type: operate_type.to_owned(),
        }
    }
}

impl QuotaCodec for Delta2Codec {
    fn product_line(&self) -> ProductLine {
        ProductLine::Delta2
    }

    fn decode_quota(&self, message: &Value) -> Result<QuotaPatch, CodecError> {
        decode_type_code(self.product_line(), SECTIONS, message)
    }

    fn encode(
        &self,
        command: &SetCommand,
        ctx: &EncodeContext<'_>,
    ) -> Result<SetEnvelope, CodecError> {
        let cached = |key: &str, fallback: u64| ctx.snapshot.get_u64(key).unwrap_or(fallback);

        let (framing, params) = match *command {
            SetCommand::AcOutput(on) => {
                // River units have a fixed output voltage.
                let out_voltage = if self.model.is_river() {
                    IGNORED_VOLTAGE
                } else {
                    cached(keys::AC_OUT_VOLTAGE, IGNORED_VOLTAGE)
                };
                (
                    Self::module(self.ac_module(), "acOutCfg"),
                    json!({
                        "enabled": flag(on),
                        "xboost": cached(keys::AC_XBOOST, IGNORED_BYTE),
                        "out_voltage": out_voltage,
                        "out_freq": cached(keys::AC_OUT_FREQ, IGNORED_BYTE),
                    }),
                )
            }
            SetCommand::XBoost(on) => (
                Self::module(self.ac_module(), "acOutCfg"),
                json!({
                    "enabled": IGNORED_BYTE,
                    "xboost": flag(on),
                    "out_voltage": IGNORED_VOLTAGE,
                    "out_freq": IGNORED_BYTE,
                }),
            ),
            SetCommand::DcOutput(on) => (
                Self::module(MODULE_MPPT, "mpptCar"),
                json!({ "enabled": flag(on) }),
            ),
            SetCommand::UsbOutput(on) => (
                Self::module(MODULE_PD, "dcOutCfg"),
                json!({ "enabled": flag(on) }),
            ),
            SetCommand::Brightness(percent) => (
                Self::module(MODULE_PD, "lcdCfg"),
                json!({
                    "brighLevel": check_percent("brighLevel", percent)?,
                    "delayOff": cached(keys::LCD_TIMEOUT, IGNORED_LCD_TIMEOUT),
                }),
            ),
            SetCommand::ChargeLimit(percent) => (
                Self::module(MODULE_BMS, "upsConfig"),
                json!({ "maxChgSoc": check_percent("maxChgSoc", percent)? }),
            ),
            SetCommand::DischargeLimit(percent) => (
                Self::module(MODULE_BMS, "dsgCfg"),
                json!({ "minDsgSoc": check_percent("minDsgSoc", percent)? }),
            ),
            SetCommand::AcChargingPower(watts) => (
                Self::module(MODULE_MPPT, "acChgCfg"),
                json!({ "chgWatts": watts, "chgPauseFlag": IGNORED_BYTE }),
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
        let operate_type = envelope
            .operate_type()
            .ok_or_else(|| CodecError::malformed("expected a moduleType/operateType envelope"))?;

        match operate_type {
            "acOutCfg" => {
                if param_u64(envelope, "enabled")? == IGNORED_BYTE {
                    Ok(SetCommand::XBoost(param_bool(envelope, "xboost")?))
                } else {
                    Ok(SetCommand::AcOutput(param_bool(envelope, "enabled")?))
                }
            }
            "mpptCar" => Ok(SetCommand::DcOutput(param_bool(envelope, "enabled")?)),
            "dcOutCfg" => Ok(SetCommand::UsbOutput(param_bool(envelope, "enabled")?)),
            "lcdCfg" => Ok(SetCommand::Brightness(param_u8(envelope, "brighLevel")?)),
            "upsConfig" => Ok(SetCommand::ChargeLimit(param_u8(envelope, "maxChgSoc")?)),
            "dsgCfg" => Ok(SetCommand::DischargeLimit(param_u8(envelope, "minDsgSoc")?)),
            "acChgCfg" => Ok(SetCommand::AcChargingPower(param_u32(envelope, "chgWatts")?)),
            other => Err(CodecError::UnknownDiscriminator {
                product_line: self.product_line(),
                discriminator: other.to_owned(),
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
        report_type_code(SECTIONS, snapshot)
    }
}
