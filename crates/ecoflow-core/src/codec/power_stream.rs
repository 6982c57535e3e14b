// PowerStream micro-inverter.
//
// Inbound:  { cmdFunc: 20, cmdId: 1, param: { permanentWatts, batSoc, ... } }
// Outbound: { id, version, sn, cmdCode: "WN511_SET_...", params }
//
// Power values on the wire are in 0.1 W.

use serde_json::{Value, json};

use super::{
    EncodeContext, QuotaCodec, check_percent, decode_cmd_pair, native_to_percent, object,
    param_u8, param_u64, percent_of, percent_to_native, report_cmd_pair, unsupported,
};
use crate::error::CodecError;
use crate::model::{
    DeviceStatus, Framing, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand, SetEnvelope,
    SupplyPriority,
};

const HEARTBEAT: &str = "20_1";

const CMD_PERMANENT_WATTS: &str = "WN511_SET_PERMANENT_WATTS_PACK";
const CMD_SUPPLY_PRIORITY: &str = "WN511_SET_SUPPLY_PRIORITY_PACK";
const CMD_LOWER_LIMIT: &str = "WN511_SET_BAT_LOWER_PACK";
const CMD_UPPER_LIMIT: &str = "WN511_SET_BAT_UPPER_PACK";
const CMD_BRIGHTNESS: &str = "WN511_SET_BRIGHTNESS_PACK";

pub mod keys {
    pub const PERMANENT_WATTS: &str = "20_1.permanentWatts";
    pub const SUPPLY_PRIORITY: &str = "20_1.supplyPriority";
    pub const LOWER_LIMIT: &str = "20_1.lowerLimit";
    pub const UPPER_LIMIT: &str = "20_1.upperLimit";
    pub const BRIGHTNESS: &str = "20_1.invBrightness";
    pub const BATTERY_SOC: &str = "20_1.batSoc";
    pub const PV1_WATTS: &str = "20_1.pv1InputWatts";
    pub const PV2_WATTS: &str = "20_1.pv2InputWatts";
    pub const INV_OUTPUT_WATTS: &str = "20_1.invOutputWatts";
    pub const INV_TEMPERATURE: &str = "20_1.invTemp";
}

fn priority_value(priority: SupplyPriority) -> u64 {
    match priority {
        SupplyPriority::PowerSupply => 0,
        SupplyPriority::Storage => 1,
    }
}

fn deci_watts(watts: u32) -> u64 {
    u64::from(watts) * 10
}

pub struct PowerStreamCodec;

impl QuotaCodec for PowerStreamCodec {
    fn product_line(&self) -> ProductLine {
        ProductLine::PowerStream
    }

    fn decode_quota(&self, message: &Value) -> Result<QuotaPatch, CodecError> {
        decode_cmd_pair(self.product_line(), HEARTBEAT, message)
    }

    fn encode(
        &self,
        command: &SetCommand,
        ctx: &EncodeContext<'_>,
    ) -> Result<SetEnvelope, CodecError> {
        let (code, params) = match *command {
            SetCommand::PowerDemand(watts) => (
                CMD_PERMANENT_WATTS,
                json!({ "permanentWatts": deci_watts(watts) }),
            ),
            SetCommand::SupplyPriority(priority) => (
                CMD_SUPPLY_PRIORITY,
                json!({ "supplyPriority": priority_value(priority) }),
            ),
            SetCommand::DischargeLimit(percent) => (
                CMD_LOWER_LIMIT,
                json!({ "lowerLimit": check_percent("lowerLimit", percent)? }),
            ),
            SetCommand::ChargeLimit(percent) => (
                CMD_UPPER_LIMIT,
                json!({ "upperLimit": check_percent("upperLimit", percent)? }),
            ),
            SetCommand::Brightness(percent) => (
                CMD_BRIGHTNESS,
                json!({ "brightness": percent_to_native(check_percent("brightness", percent)?) }),
            ),
            _ => return Err(unsupported(self.product_line(), command)),
        };
        Ok(ctx.envelope(Framing::CmdCode(code.to_owned()), object(params)))
    }

    fn optimistic_patch(&self, command: &SetCommand) -> Result<QuotaPatch, CodecError> {
        let patch = QuotaPatch::new();
        Ok(match *command {
            SetCommand::PowerDemand(watts) => patch.with(keys::PERMANENT_WATTS, deci_watts(watts)),
            SetCommand::SupplyPriority(priority) => {
                patch.with(keys::SUPPLY_PRIORITY, priority_value(priority))
            }
            SetCommand::DischargeLimit(percent) => patch.with(keys::LOWER_LIMIT, percent),
            SetCommand::ChargeLimit(percent) => patch.with(keys::UPPER_LIMIT, percent),
            SetCommand::Brightness(percent) => {
                patch.with(keys::BRIGHTNESS, percent_to_native(percent))
            }
            _ => return Err(unsupported(self.product_line(), command)),
        })
    }

    fn decode_command(&self, envelope: &SetEnvelope) -> Result<SetCommand, CodecError> {
        let code = envelope
            .cmd_code()
            .ok_or_else(|| CodecError::malformed("expected a cmdCode envelope"))?;

        match code {
            CMD_PERMANENT_WATTS => {
                let watts = param_u64(envelope, "permanentWatts")? / 10;
                u32::try_from(watts)
                    .map(SetCommand::PowerDemand)
                    .map_err(|_| CodecError::InvalidValue {
                        field: "permanentWatts".into(),
                        reason: "out of range".into(),
                    })
            }
            CMD_SUPPLY_PRIORITY => match param_u64(envelope, "supplyPriority")? {
                0 => Ok(SetCommand::SupplyPriority(SupplyPriority::PowerSupply)),
                1 => Ok(SetCommand::SupplyPriority(SupplyPriority::Storage)),
                other => Err(CodecError::InvalidValue {
                    field: "supplyPriority".into(),
                    reason: format!("unknown priority {other}"),
                }),
            },
            CMD_LOWER_LIMIT => Ok(SetCommand::DischargeLimit(param_u8(envelope, "lowerLimit")?)),
            CMD_UPPER_LIMIT => Ok(SetCommand::ChargeLimit(param_u8(envelope, "upperLimit")?)),
            CMD_BRIGHTNESS => Ok(SetCommand::Brightness(native_to_percent(param_u64(
                envelope,
                "brightness",
            )?))),
            other => Err(CodecError::UnknownDiscriminator {
                product_line: self.product_line(),
                discriminator: other.to_owned(),
            }),
        }
    }

    fn status(&self, snapshot: &QuotaSnapshot) -> DeviceStatus {
        let pv = match (snapshot.get_f64(keys::PV1_WATTS), snapshot.get_f64(keys::PV2_WATTS)) {
            (None, None) => None,
            (a, b) => Some((a.unwrap_or_default() + b.unwrap_or_default()) / 10.0),
        };
        DeviceStatus {
            battery_level: snapshot.get_f64(keys::BATTERY_SOC),
            input_watts: pv,
            output_watts: snapshot.get_f64(keys::INV_OUTPUT_WATTS).map(|w| w / 10.0),
            brightness_percent: snapshot.get_u64(keys::BRIGHTNESS).map(native_to_percent),
            charge_limit: percent_of(snapshot, keys::UPPER_LIMIT),
            discharge_limit: percent_of(snapshot, keys::LOWER_LIMIT),
            temperature: snapshot.get_f64(keys::INV_TEMPERATURE),
            ..DeviceStatus::default()
        }
    }

    fn report(&self, snapshot: &QuotaSnapshot) -> Vec<Value> {
        report_cmd_pair(20, 1, snapshot)
    }
}
