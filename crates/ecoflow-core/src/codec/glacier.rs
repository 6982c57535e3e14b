// Glacier portable refrigerator.
//
// Inbound:  { typeCode: "pdStatus" | "bmsStatus" | "emsStatus", params }
// Outbound: { id, version, sn, moduleType: 1, operateType, params }

use serde_json::{Value, json};

use super::{
    EncodeContext, QuotaCodec, decode_type_code, flag, object, param_bool, param_i32,
    report_type_code, unsupported,
};
use crate::error::CodecError;
use crate::model::{
    DeviceStatus, Framing, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand, SetEnvelope,
};

const SECTIONS: &[(&str, &str)] = &[
    ("pdStatus", "pd."),
    ("bmsStatus", "bms_bmsStatus."),
    ("emsStatus", "bms_emsStatus."),
];

const MODULE_TYPE: u8 = 1;

pub mod keys {
    pub const SOC: &str = "bms_bmsStatus.soc";
    pub const TARGET_RIGHT: &str = "pd.tmpR";
    pub const TARGET_LEFT: &str = "pd.tmpL";
    pub const TARGET_COMBINED: &str = "pd.tmpM";
    pub const AMBIENT: &str = "pd.ambientTmp";
    pub const ECO_MODE: &str = "pd.coolMode";
    pub const MOTOR_WATTS: &str = "pd.motorWat";
}

pub struct GlacierCodec;

fn module(operate_type: &str) -> Framing {
    Framing::Module {
        module_type: MODULE_TYPE,
        operate_type: operate_type.to_owned(),
    }
}

impl QuotaCodec for GlacierCodec {
    fn product_line(&self) -> ProductLine {
        ProductLine::Glacier
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
            // Single-zone target: both compartments follow the combined value.
            SetCommand::TargetTemperature(celsius) => (
                module("temp"),
                json!({ "tmpR": celsius, "tmpL": celsius, "tmpM": celsius }),
            ),
            SetCommand::EcoMode(on) => (module("ecoMode"), json!({ "mode": flag(on) })),
            _ => return Err(unsupported(self.product_line(), command)),
        };
        Ok(ctx.envelope(framing, object(params)))
    }

    fn optimistic_patch(&self, command: &SetCommand) -> Result<QuotaPatch, CodecError> {
        match *command {
            SetCommand::TargetTemperature(celsius) => Ok(QuotaPatch::new()
                .with(keys::TARGET_RIGHT, celsius)
                .with(keys::TARGET_LEFT, celsius)
                .with(keys::TARGET_COMBINED, celsius)),
            SetCommand::EcoMode(on) => Ok(QuotaPatch::new().with(keys::ECO_MODE, flag(on))),
            _ => Err(unsupported(self.product_line(), command)),
        }
    }

    fn decode_command(&self, envelope: &SetEnvelope) -> Result<SetCommand, CodecError> {
        match envelope.operate_type() {
            Some("temp") => Ok(SetCommand::TargetTemperature(param_i32(envelope, "tmpM")?)),
            Some("ecoMode") => Ok(SetCommand::EcoMode(param_bool(envelope, "mode")?)),
            Some(other) => Err(CodecError::UnknownDiscriminator {
                product_line: self.product_line(),
                discriminator: other.to_owned(),
            }),
            None => Err(CodecError::malformed("expected a moduleType/operateType envelope")),
        }
    }

    fn status(&self, snapshot: &QuotaSnapshot) -> DeviceStatus {
        DeviceStatus {
            battery_level: snapshot.get_f64(keys::SOC),
            output_watts: snapshot.get_f64(keys::MOTOR_WATTS),
            temperature: snapshot.get_f64(keys::AMBIENT),
            target_temperature: snapshot.get_f64(keys::TARGET_COMBINED),
            ..DeviceStatus::default()
        }
    }

    fn report(&self, snapshot: &QuotaSnapshot) -> Vec<Value> {
        report_type_code(SECTIONS, snapshot)
    }
}
