// Wave 2 portable air conditioner.
//
// Inbound:  { typeCode: "pdStatus" | "powerStatus" | "bmsStatus", params }
// Outbound: { id, version, sn, moduleType: 1, operateType, params }

use serde_json::{Value, json};

use super::{
    EncodeContext, QuotaCodec, decode_type_code, object, param_i32, param_u8, param_u64,
    report_type_code, unsupported,
};
use crate::error::CodecError;
use crate::model::{
    DeviceStatus, EnableType, Framing, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand,
    SetEnvelope,
};

const SECTIONS: &[(&str, &str)] = &[
    ("pdStatus", "pd."),
    ("powerStatus", "power."),
    ("bmsStatus", "bms."),
];

const MODULE_TYPE: u8 = 1;

/// `powerMode` values.
const POWER_ON: u64 = 1;
const POWER_OFF: u64 = 2;

pub mod keys {
    pub const SOC: &str = "pd.batSoc";
    pub const SET_TEMP: &str = "pd.setTemp";
    pub const ENV_TEMP: &str = "pd.envTemp";
    pub const FAN_VALUE: &str = "pd.fanValue";
    pub const MAIN_MODE: &str = "pd.mainMode";
    pub const POWER_MODE: &str = "pd.powerMode";
    pub const BATTERY_WATTS_OUT: &str = "power.batPwrOut";
}

pub struct Wave2Codec;

fn module(operate_type: &str) -> Framing {
    Framing::Module {
        module_type: MODULE_TYPE,
        operate_type: operate_type.to_owned(),
    }
}

fn power_mode(on: bool) -> u64 {
    if on { POWER_ON } else { POWER_OFF }
}

impl QuotaCodec for Wave2Codec {
    fn product_line(&self) -> ProductLine {
        ProductLine::Wave2
    }

    fn decode_quota(&self, message: &Value) -> Result<QuotaPatch, CodecError> {
        decode_type_code(self.product_line(), SECTIONS, message)
    }

    fn encode(
        &self,
        command: &SetCommand,
        ctx: &EncodeContext<'_>,
    ) -> Result<SetEnvelope, CodecError> {
        let (framing, params) = match *command {
            SetCommand::TargetTemperature(celsius) => {
                (module("setTemp"), json!({ "setTemp": celsius }))
            }
            SetCommand::FanSpeed(speed) => (module("fanValue"), json!({ "fanValue": speed })),
            SetCommand::OperatingMode(mode) => (module("mainMode"), json!({ "mainMode": mode })),
            SetCommand::Power(on) => (module("powerMode"), json!({ "powerMode": power_mode(on) })),
            _ => return Err(unsupported(self.product_line(), command)),
        };
        Ok(ctx.envelope(framing, object(params)))
    }

    fn optimistic_patch(&self, command: &SetCommand) -> Result<QuotaPatch, CodecError> {
        let patch = QuotaPatch::new();
        Ok(match *command {
            SetCommand::TargetTemperature(celsius) => patch.with(keys::SET_TEMP, celsius),
            SetCommand::FanSpeed(speed) => patch.with(keys::FAN_VALUE, speed),
            SetCommand::OperatingMode(mode) => patch.with(keys::MAIN_MODE, mode),
            SetCommand::Power(on) => patch.with(keys::POWER_MODE, power_mode(on)),
            _ => return Err(unsupported(self.product_line(), command)),
        })
    }

    fn decode_command(&self, envelope: &SetEnvelope) -> Result<SetCommand, CodecError> {
        match envelope.operate_type() {
            Some("setTemp") => Ok(SetCommand::TargetTemperature(param_i32(envelope, "setTemp")?)),
            Some("fanValue") => Ok(SetCommand::FanSpeed(param_u8(envelope, "fanValue")?)),
            Some("mainMode") => Ok(SetCommand::OperatingMode(param_u8(envelope, "mainMode")?)),
            Some("powerMode") => match param_u64(envelope, "powerMode")? {
                POWER_ON => Ok(SetCommand::Power(true)),
                POWER_OFF => Ok(SetCommand::Power(false)),
                other => Err(CodecError::InvalidValue {
                    field: "powerMode".into(),
                    reason: format!("unknown power mode {other}"),
                }),
            },
            Some(other) => Err(CodecError::UnknownDiscriminator {
                product_line: self.product_line(),
                discriminator: other.to_owned(),
            }),
            None => Err(CodecError::malformed("expected a moduleType/operateType envelope")),
        }
    }

    fn status(&self, snapshot: &QuotaSnapshot) -> DeviceStatus {
        let power = snapshot.get_u64(keys::POWER_MODE).and_then(|mode| match mode {
            POWER_ON => Some(EnableType::On),
            POWER_OFF => Some(EnableType::Off),
            _ => None,
        });
        DeviceStatus {
            battery_level: snapshot.get_f64(keys::SOC),
            output_watts: snapshot.get_f64(keys::BATTERY_WATTS_OUT),
            switch_on: power,
            temperature: snapshot.get_f64(keys::ENV_TEMP),
            target_temperature: snapshot.get_f64(keys::SET_TEMP),
            ..DeviceStatus::default()
        }
    }

    fn report(&self, snapshot: &QuotaSnapshot) -> Vec<Value> {
        report_type_code(SECTIONS, snapshot)
    }
}
