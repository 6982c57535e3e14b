// Delta Pro 3 family: Delta Pro 3, Delta 3, River 3.
//
// Quotas are flat keys. Set commands use `cfg`-prefixed fields behind a
// fixed header and are acknowledged with `data.configOk`.

use serde_json::{Map, Value, json};

use super::{EncodeContext, QuotaCodec, check_percent, message_params, unsupported};
use crate::error::CodecError;
use crate::model::{
    DeviceModel, DeviceStatus, Framing, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand,
    SetEnvelope,
};

const HEADER: Framing = Framing::Header {
    cmd_id: 17,
    dir_dest: 1,
    dir_src: 1,
    cmd_func: 254,
    dest: 2,
    need_ack: true,
};

pub mod keys {
    pub const SOC: &str = "bmsBattSoc";
    pub const WATTS_IN: &str = "powInSumW";
    pub const WATTS_OUT: &str = "powOutSumW";
    pub const AC_OPEN: &str = "acOutOpen";
    pub const HV_AC_OPEN: &str = "hvAcOutOpen";
    pub const XBOOST: &str = "xboostEn";
    pub const DC_12V_OPEN: &str = "dc12vOutOpen";
    pub const LCD_LIGHT: &str = "lcdLight";
    pub const MAX_CHARGE_SOC: &str = "cmsMaxChgSoc";
    pub const MIN_DISCHARGE_SOC: &str = "cmsMinDsgSoc";
    pub const AC_CHARGE_WATTS: &str = "plugInInfoAcInChgPowMax";
}

/// A settable field: its `cfg` name and the quota key that reports it.
#[derive(Debug, Clone, Copy)]
struct Setting {
    cfg: &'static str,
    report: &'static str,
}

const AC_OUT: Setting = Setting {
    cfg: "cfgAcOutOpen",
    report: keys::AC_OPEN,
};
const HV_AC_OUT: Setting = Setting {
    cfg: "cfgHvAcOutOpen",
    report: keys::HV_AC_OPEN,
};
const XBOOST: Setting = Setting {
    cfg: "cfgXboostEn",
    report: keys::XBOOST,
};
const DC_OUT: Setting = Setting {
    cfg: "cfgDc12vOutOpen",
    report: keys::DC_12V_OPEN,
};
const BRIGHTNESS: Setting = Setting {
    cfg: "cfgLcdLight",
    report: keys::LCD_LIGHT,
};
const CHARGE_LIMIT: Setting = Setting {
    cfg: "cfgMaxChgSoc",
    report: keys::MAX_CHARGE_SOC,
};
const DISCHARGE_LIMIT: Setting = Setting {
    cfg: "cfgMinDsgSoc",
    report: keys::MIN_DISCHARGE_SOC,
};
const AC_CHARGE_POWER: Setting = Setting {
    cfg: "cfgPlugInInfoAcInChgPowMax",
    report: keys::AC_CHARGE_WATTS,
};

pub struct DeltaPro3Codec {
    model: DeviceModel,
}

impl DeltaPro3Codec {
    pub fn new(model: DeviceModel) -> Self {
        Self { model }
    }

    /// The Delta Pro 3 switches its high-voltage AC group; the smaller
    /// units have a single AC group.
    fn ac_setting(&self) -> Setting {
        if self.model == DeviceModel::DeltaPro3 {
            HV_AC_OUT
        } else {
            AC_OUT
        }
    }

    /// Setting and wire value for `command`.
    fn setting(&self, command: &SetCommand) -> Result<(Setting, Value), CodecError> {
        Ok(match *command {
            SetCommand::AcOutput(on) => (self.ac_setting(), json!(on)),
            SetCommand::XBoost(on) => (XBOOST, json!(on)),
            SetCommand::DcOutput(on) => (DC_OUT, json!(on)),
            SetCommand::Brightness(percent) => {
                (BRIGHTNESS, json!(check_percent(BRIGHTNESS.cfg, percent)?))
            }
            SetCommand::ChargeLimit(percent) => {
                (CHARGE_LIMIT, json!(check_percent(CHARGE_LIMIT.cfg, percent)?))
            }
            SetCommand::DischargeLimit(percent) => (
                DISCHARGE_LIMIT,
                json!(check_percent(DISCHARGE_LIMIT.cfg, percent)?),
            ),
            SetCommand::AcChargingPower(watts) => (AC_CHARGE_POWER, json!(watts)),
            _ => return Err(unsupported(self.product_line(), command)),
        })
    }
}

impl QuotaCodec for DeltaPro3Codec {
    fn product_line(&self) -> ProductLine {
        ProductLine::DeltaPro3
    }

    fn decode_quota(&self, message: &Value) -> Result<QuotaPatch, CodecError> {
        Ok(QuotaPatch::from_params("", message_params(message)?))
    }

    fn encode(
        &self,
        command: &SetCommand,
        ctx: &EncodeContext<'_>,
    ) -> Result<SetEnvelope, CodecError> {
        let (setting, value) = self.setting(command)?;
        let mut params = Map::new();
        params.insert(setting.cfg.to_owned(), value);
        Ok(ctx.envelope(HEADER, params))
    }

    fn optimistic_patch(&self, command: &SetCommand) -> Result<QuotaPatch, CodecError> {
        let (setting, value) = self.setting(command)?;
        Ok(QuotaPatch::new().with(setting.report, value))
    }

    fn decode_command(&self, envelope: &SetEnvelope) -> Result<SetCommand, CodecError> {
        let (name, value) = envelope
            .params
            .iter()
            .next()
            .ok_or_else(|| CodecError::malformed("empty params"))?;

        let invalid = |reason: &str| CodecError::InvalidValue {
            field: name.clone(),
            reason: reason.to_owned(),
        };
        let as_bool = || value.as_bool().ok_or_else(|| invalid("expected a boolean"));
        let as_u8 = || {
            value
                .as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| invalid("expected a percentage"))
        };

        match name.as_str() {
            n if n == AC_OUT.cfg || n == HV_AC_OUT.cfg => Ok(SetCommand::AcOutput(as_bool()?)),
            n if n == XBOOST.cfg => Ok(SetCommand::XBoost(as_bool()?)),
            n if n == DC_OUT.cfg => Ok(SetCommand::DcOutput(as_bool()?)),
            n if n == BRIGHTNESS.cfg => Ok(SetCommand::Brightness(as_u8()?)),
            n if n == CHARGE_LIMIT.cfg => Ok(SetCommand::ChargeLimit(as_u8()?)),
            n if n == DISCHARGE_LIMIT.cfg => Ok(SetCommand::DischargeLimit(as_u8()?)),
            n if n == AC_CHARGE_POWER.cfg => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(SetCommand::AcChargingPower)
                .ok_or_else(|| invalid("expected watts")),
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
            ac_enabled: snapshot.enabled(self.ac_setting().report),
            xboost_enabled: snapshot.enabled(keys::XBOOST),
            dc_enabled: snapshot.enabled(keys::DC_12V_OPEN),
            brightness_percent: super::percent_of(snapshot, keys::LCD_LIGHT),
            charge_limit: super::percent_of(snapshot, keys::MAX_CHARGE_SOC),
            discharge_limit: super::percent_of(snapshot, keys::MIN_DISCHARGE_SOC),
            ..DeviceStatus::default()
        }
    }

    fn report(&self, snapshot: &QuotaSnapshot) -> Vec<Value> {
        if snapshot.is_empty() {
            return Vec::new();
        }
        let params: Map<String, Value> = snapshot
            .iter()
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect();
        vec![json!({ "cmdId": 21, "cmdFunc": 254, "params": Value::Object(params) })]
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::model::{EnableType, SetReply};
    use pretty_assertions::assert_eq;

    #[test]
    fn envelope_has_fixed_header() {
        let snapshot = QuotaSnapshot::new();
        let ctx = EncodeContext {
            sn: "MR51ZAS4PG330001",
            id: 5,
            snapshot: &snapshot,
        };
        let envelope = DeltaPro3Codec::new(DeviceModel::DeltaPro3)
            .encode(&SetCommand::AcOutput(true), &ctx)
            .unwrap();

        assert_eq!(
            envelope.to_json(),
            json!({
                "id": 5,
                "version": "1.0",
                "sn": "MR51ZAS4PG330001",
                "cmdId": 17,
                "dirDest": 1,
                "dirSrc": 1,
                "cmdFunc": 254,
                "dest": 2,
                "needAck": true,
                "params": { "cfgHvAcOutOpen": true }
            })
        );
    }

    #[test]
    fn smaller_units_use_single_ac_group() {
        let codec = DeltaPro3Codec::new(DeviceModel::River3);
        let patch = codec.optimistic_patch(&SetCommand::AcOutput(false)).unwrap();
        assert_eq!(patch.get(keys::AC_OPEN), Some(Some(&json!(false))));

        let mut snapshot = QuotaSnapshot::new();
        snapshot.apply(&patch);
        assert_eq!(codec.status(&snapshot).ac_enabled, Some(EnableType::Off));
    }

    #[test]
    fn settable_commands_round_trip() {
        let snapshot = QuotaSnapshot::new();
        let codec = DeltaPro3Codec::new(DeviceModel::Delta3);
        let ctx = EncodeContext {
            sn: "D3",
            id: 1,
            snapshot: &snapshot,
        };
        for command in [
            SetCommand::AcOutput(true),
            SetCommand::XBoost(false),
            SetCommand::DcOutput(true),
            SetCommand::Brightness(60),
            SetCommand::ChargeLimit(95),
            SetCommand::DischargeLimit(15),
            SetCommand::AcChargingPower(1500),
        ] {
            let wire = SetEnvelope::from_json(&codec.encode(&command, &ctx).unwrap().to_json())
                .unwrap();
            assert_eq!(codec.decode_command(&wire).unwrap(), command);
        }
    }

    #[test]
    fn usb_output_is_unsupported() {
        let codec = DeltaPro3Codec::new(DeviceModel::DeltaPro3);
        assert!(matches!(
            codec.optimistic_patch(&SetCommand::UsbOutput(true)),
            Err(CodecError::Unsupported { .. })
        ));
    }

    #[test]
    fn partial_update_and_config_ok_reply() {
        let codec = DeltaPro3Codec::new(DeviceModel::DeltaPro3);
        let mut snapshot = QuotaSnapshot::new();
        snapshot.apply(&QuotaPatch::new().with(keys::SOC, 42).with(keys::XBOOST, true));

        snapshot.apply(
            &codec
                .decode_quota(&json!({ "params": { "cmsMaxChgSoc": 90 } }))
                .unwrap(),
        );
        let status = codec.status(&snapshot);
        assert_eq!(status.battery_level, Some(42.0));
        assert_eq!(status.charge_limit, Some(90));
        assert_eq!(status.xboost_enabled, Some(EnableType::On));

        let reply: SetReply = codec
            .parse_set_reply(&json!({ "data": { "configOk": true } }))
            .unwrap();
        assert!(reply.is_success());
    }
}
