// Smart Plug.
//
// Inbound:  { cmdFunc: 2, cmdId: 1, param: { switchSta, brightness, watts, ... } }
// Outbound: { id, version, sn, cmdCode: "WN511_SOCKET_...", params }

use serde_json::{Value, json};

use super::{
    EncodeContext, QuotaCodec, check_percent, decode_cmd_pair, native_to_percent, object,
    param_bool, param_u64, percent_to_native, report_cmd_pair, unsupported,
};
use crate::error::CodecError;
use crate::model::{
    DeviceStatus, Framing, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand, SetEnvelope,
};

const HEARTBEAT: &str = "2_1";

const CMD_SWITCH: &str = "WN511_SOCKET_SET_PLUG_SWITCH_MESSAGE";
const CMD_BRIGHTNESS: &str = "WN511_SOCKET_SET_BRIGHTNESS_PACK";

pub mod keys {
    pub const SWITCH: &str = "2_1.switchSta";
    pub const BRIGHTNESS: &str = "2_1.brightness";
    /// Output power in 0.1 W.
    pub const WATTS: &str = "2_1.watts";
    pub const TEMPERATURE: &str = "2_1.temp";
}

pub struct SmartPlugCodec;

impl QuotaCodec for SmartPlugCodec {
    fn product_line(&self) -> ProductLine {
        ProductLine::SmartPlug
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
            SetCommand::PlugSwitch(on) => (CMD_SWITCH, json!({ "plugSwitch": super::flag(on) })),
            SetCommand::Brightness(percent) => (
                CMD_BRIGHTNESS,
                json!({ "brightness": percent_to_native(check_percent("brightness", percent)?) }),
            ),
            _ => return Err(unsupported(self.product_line(), command)),
        };
        Ok(ctx.envelope(Framing::CmdCode(code.to_owned()), object(params)))
    }

    fn optimistic_patch(&self, command: &SetCommand) -> Result<QuotaPatch, CodecError> {
        match *command {
            SetCommand::PlugSwitch(on) => Ok(QuotaPatch::new().with(keys::SWITCH, on)),
            SetCommand::Brightness(percent) => {
                Ok(QuotaPatch::new().with(keys::BRIGHTNESS, percent_to_native(percent)))
            }
            _ => Err(unsupported(self.product_line(), command)),
        }
    }

    fn decode_command(&self, envelope: &SetEnvelope) -> Result<SetCommand, CodecError> {
        match envelope.cmd_code() {
            Some(CMD_SWITCH) => Ok(SetCommand::PlugSwitch(param_bool(envelope, "plugSwitch")?)),
            Some(CMD_BRIGHTNESS) => Ok(SetCommand::Brightness(native_to_percent(param_u64(
                envelope,
                "brightness",
            )?))),
            Some(other) => Err(CodecError::UnknownDiscriminator {
                product_line: self.product_line(),
                discriminator: other.to_owned(),
            }),
            None => Err(CodecError::malformed("expected a cmdCode envelope")),
        }
    }

    fn status(&self, snapshot: &QuotaSnapshot) -> DeviceStatus {
        DeviceStatus {
            switch_on: snapshot.enabled(keys::SWITCH),
            output_watts: snapshot.get_f64(keys::WATTS).map(|w| w / 10.0),
            brightness_percent: snapshot.get_u64(keys::BRIGHTNESS).map(native_to_percent),
            temperature: snapshot.get_f64(keys::TEMPERATURE),
            ..DeviceStatus::default()
        }
    }

    fn report(&self, snapshot: &QuotaSnapshot) -> Vec<Value> {
        report_cmd_pair(2, 1, snapshot)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::model::EnableType;
    use pretty_assertions::assert_eq;

    fn ctx(snapshot: &QuotaSnapshot) -> EncodeContext<'_> {
        EncodeContext {
            sn: "HW52ZDH4SF123456",
            id: 77,
            snapshot,
        }
    }

    #[test]
    fn switch_envelope() {
        let snapshot = QuotaSnapshot::new();
        let envelope = SmartPlugCodec
            .encode(&SetCommand::PlugSwitch(true), &ctx(&snapshot))
            .unwrap();
        assert_eq!(
            envelope.to_json(),
            json!({
                "id": 77,
                "version": "1.0",
                "sn": "HW52ZDH4SF123456",
                "cmdCode": "WN511_SOCKET_SET_PLUG_SWITCH_MESSAGE",
                "params": { "plugSwitch": 1 }
            })
        );
    }

    #[test]
    fn brightness_is_scaled_to_native_range() {
        let snapshot = QuotaSnapshot::new();
        let envelope = SmartPlugCodec
            .encode(&SetCommand::Brightness(100), &ctx(&snapshot))
            .unwrap();
        assert_eq!(envelope.params["brightness"], json!(1023));

        for percent in [0u8, 1, 33, 50, 99, 100] {
            let envelope = SmartPlugCodec
                .encode(&SetCommand::Brightness(percent), &ctx(&snapshot))
                .unwrap();
            assert_eq!(
                SmartPlugCodec.decode_command(&envelope).unwrap(),
                SetCommand::Brightness(percent)
            );
        }
    }

    #[test]
    fn heartbeat_updates_only_present_fields() {
        let mut snapshot = QuotaSnapshot::new();
        snapshot.apply(&QuotaPatch::new().with(keys::WATTS, 1234).with(keys::SWITCH, false));

        snapshot.apply(
            &SmartPlugCodec
                .decode_quota(&json!({ "cmdFunc": 2, "cmdId": 1, "param": { "switchSta": true } }))
                .unwrap(),
        );

        let status = SmartPlugCodec.status(&snapshot);
        assert_eq!(status.switch_on, Some(EnableType::On));
        assert_eq!(status.output_watts, Some(123.4));
    }

    #[test]
    fn other_command_pairs_are_rejected() {
        let err = SmartPlugCodec
            .decode_quota(&json!({ "cmdFunc": 2, "cmdId": 2, "param": {} }))
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::UnknownDiscriminator {
                product_line: ProductLine::SmartPlug,
                discriminator: "2_2".into()
            }
        );
    }
}
