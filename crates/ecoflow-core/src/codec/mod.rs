//! Per-product-line quota decoders and command encoders.
//!
//! Every product line implements [`QuotaCodec`]; [`codec_for`] picks the
//! implementation for a [`DeviceModel`]. Codecs are stateless apart from
//! model-specific constants: the current state they need for encoding
//! (cached voltage, frequency, ...) comes from the snapshot in
//! [`EncodeContext`].

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::CodecError;
use crate::model::{
    DeviceModel, DeviceStatus, Framing, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand,
    SetEnvelope, SetReply,
};

pub mod delta2;
pub mod delta_pro;
pub mod delta_pro3;
pub mod glacier;
pub mod power_ocean;
pub mod power_stream;
pub mod smart_plug;
pub mod wave2;

// ── Wire sentinels ───────────────────────────────────────────────────

/// Byte-wide "leave unchanged" flag.
pub const IGNORED_BYTE: u64 = 0xff;

/// "Leave unchanged" AC output voltage.
pub const IGNORED_VOLTAGE: u64 = 0xffff_ffff;

/// Native brightness range of Smart Plug and PowerStream LEDs.
pub const NATIVE_BRIGHTNESS_MAX: u64 = 1023;

// ── Codec trait ──────────────────────────────────────────────────────

/// Inputs an encoder may need besides the command itself.
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext<'a> {
    pub sn: &'a str,
    /// Envelope id, echoed by families that correlate replies.
    pub id: u64,
    /// Last-known state, before the command's optimistic patch.
    pub snapshot: &'a QuotaSnapshot,
}

impl EncodeContext<'_> {
    pub(crate) fn envelope(&self, framing: Framing, params: Map<String, Value>) -> SetEnvelope {
        SetEnvelope {
            id: self.id,
            sn: self.sn.to_owned(),
            framing,
            params,
        }
    }
}

pub trait QuotaCodec: Send + Sync {
    fn product_line(&self) -> ProductLine;

    /// Merge an HTTP "get all quotas" result into the snapshot.
    ///
    /// HTTP keys are already canonical, so the default merges them as-is.
    fn apply_all_quotas(&self, snapshot: &mut QuotaSnapshot, data: &Map<String, Value>) {
        snapshot.apply(&QuotaPatch::from_params("", data));
    }

    /// Narrow an inbound quota message to the fields it carries.
    fn decode_quota(&self, message: &Value) -> Result<QuotaPatch, CodecError>;

    /// Build the firmware envelope for `command`.
    fn encode(
        &self,
        command: &SetCommand,
        ctx: &EncodeContext<'_>,
    ) -> Result<SetEnvelope, CodecError>;

    /// Fields `command` is expected to change once the device applies it.
    fn optimistic_patch(&self, command: &SetCommand) -> Result<QuotaPatch, CodecError>;

    /// Inverse of [`encode`](Self::encode).
    fn decode_command(&self, envelope: &SetEnvelope) -> Result<SetCommand, CodecError>;

    fn parse_set_reply(&self, message: &Value) -> Result<SetReply, CodecError> {
        SetReply::from_json(message)
    }

    /// Typed summary of the snapshot.
    fn status(&self, snapshot: &QuotaSnapshot) -> DeviceStatus;

    /// Quota messages a device in state `snapshot` would publish.
    fn report(&self, snapshot: &QuotaSnapshot) -> Vec<Value>;
}

/// Codec for `model`.
pub fn codec_for(model: DeviceModel) -> Arc<dyn QuotaCodec> {
    match model.product_line() {
        ProductLine::Delta2 => Arc::new(delta2::Delta2Codec::new(model)),
        ProductLine::DeltaPro => Arc::new(delta_pro::DeltaProCodec),
        ProductLine::DeltaPro3 => Arc::new(delta_pro3::DeltaPro3Codec::new(model)),
        ProductLine::SmartPlug => Arc::new(smart_plug::SmartPlugCodec),
        ProductLine::PowerStream => Arc::new(power_stream::PowerStreamCodec),
        ProductLine::Glacier => Arc::new(glacier::GlacierCodec),
        ProductLine::Wave2 => Arc::new(wave2::Wave2Codec),
        ProductLine::PowerOcean => Arc::new(power_ocean::PowerOceanCodec),
    }
}

// ── Brightness scaling ───────────────────────────────────────────────

/// 0–100 % to the native 0–1023 LED range.
pub fn percent_to_native(percent: u8) -> u64 {
    (u64::from(percent.min(100)) * NATIVE_BRIGHTNESS_MAX + 50) / 100
}

/// Native 0–1023 LED range to 0–100 %.
pub fn native_to_percent(native: u64) -> u8 {
    let clamped = native.min(NATIVE_BRIGHTNESS_MAX);
    u8::try_from((clamped * 100 + NATIVE_BRIGHTNESS_MAX / 2) / NATIVE_BRIGHTNESS_MAX)
        .unwrap_or(100)
}

// ── Shared helpers ───────────────────────────────────────────────────

pub(crate) fn flag(on: bool) -> u64 {
    u64::from(on)
}

pub(crate) fn unsupported(product_line: ProductLine, command: &SetCommand) -> CodecError {
    CodecError::Unsupported {
        product_line,
        command: command.name().to_owned(),
    }
}

/// Reject percentages above 100.
pub(crate) fn check_percent(field: &str, value: u8) -> Result<u8, CodecError> {
    if value > 100 {
        return Err(CodecError::InvalidValue {
            field: field.to_owned(),
            reason: format!("{value} is not a percentage"),
        });
    }
    Ok(value)
}

/// `json!({...})` literal to its object map.
pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// The `params` object of an inbound message (`param` on some firmware).
pub(crate) fn message_params(message: &Value) -> Result<&Map<String, Value>, CodecError> {
    message
        .get("params")
        .or_else(|| message.get("param"))
        .and_then(Value::as_object)
        .ok_or_else(|| CodecError::malformed("message has no params object"))
}

/// A required parameter of an outbound envelope.
pub(crate) fn param<'a>(envelope: &'a SetEnvelope, key: &str) -> Result<&'a Value, CodecError> {
    envelope
        .params
        .get(key)
        .ok_or_else(|| CodecError::malformed(format!("missing parameter '{key}'")))
}

pub(crate) fn param_u64(envelope: &SetEnvelope, key: &str) -> Result<u64, CodecError> {
    param(envelope, key)?
        .as_u64()
        .ok_or_else(|| CodecError::InvalidValue {
            field: key.to_owned(),
            reason: "expected an unsigned integer".into(),
        })
}

pub(crate) fn param_i64(envelope: &SetEnvelope, key: &str) -> Result<i64, CodecError> {
    param(envelope, key)?
        .as_i64()
        .ok_or_else(|| CodecError::InvalidValue {
            field: key.to_owned(),
            reason: "expected an integer".into(),
        })
}

/// `0`/`1` or `false`/`true`.
pub(crate) fn param_bool(envelope: &SetEnvelope, key: &str) -> Result<bool, CodecError> {
    match param(envelope, key)? {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        _ => Err(CodecError::InvalidValue {
            field: key.to_owned(),
            reason: "expected 0/1 or a boolean".into(),
        }),
    }
}

pub(crate) fn param_u8(envelope: &SetEnvelope, key: &str) -> Result<u8, CodecError> {
    u8::try_from(param_u64(envelope, key)?).map_err(|_| CodecError::InvalidValue {
        field: key.to_owned(),
        reason: "out of range".into(),
    })
}

pub(crate) fn param_u32(envelope: &SetEnvelope, key: &str) -> Result<u32, CodecError> {
    u32::try_from(param_u64(envelope, key)?).map_err(|_| CodecError::InvalidValue {
        field: key.to_owned(),
        reason: "out of range".into(),
    })
}

pub(crate) fn param_i32(envelope: &SetEnvelope, key: &str) -> Result<i32, CodecError> {
    i32::try_from(param_i64(envelope, key)?).map_err(|_| CodecError::InvalidValue {
        field: key.to_owned(),
        reason: "out of range".into(),
    })
}

pub(crate) fn percent_of(snapshot: &QuotaSnapshot, key: &str) -> Option<u8> {
    snapshot.get_u64(key).and_then(|v| u8::try_from(v).ok())
}

// ── typeCode families ────────────────────────────────────────────────
//
// Delta 2, Glacier and Wave 2 report `{ typeCode, params }` where the
// type code selects the snapshot prefix of every field in `params`.

pub(crate) fn decode_type_code(
    product_line: ProductLine,
    sections: &[(&str, &str)],
    message: &Value,
) -> Result<QuotaPatch, CodecError> {
    let type_code = message
        .get("typeCode")
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::malformed("message has no typeCode"))?;

    let (_, prefix) = sections
        .iter()
        .find(|(code, _)| *code == type_code)
        .ok_or_else(|| CodecError::UnknownDiscriminator {
            product_line,
            discriminator: type_code.to_owned(),
        })?;

    Ok(QuotaPatch::from_params(prefix, message_params(message)?))
}

pub(crate) fn report_type_code(sections: &[(&str, &str)], snapshot: &QuotaSnapshot) -> Vec<Value> {
    sections
        .iter()
        .filter_map(|(code, prefix)| {
            let params = snapshot.section(prefix);
            (!params.is_empty()).then(|| {
                serde_json::json!({ "typeCode": code, "params": Value::Object(params) })
            })
        })
        .collect()
}

// ── cmdFunc/cmdId families ───────────────────────────────────────────
//
// Smart Plug and PowerStream report `{ cmdFunc, cmdId, param }`; the pair
// `"{cmdFunc}_{cmdId}"` is both discriminator and snapshot prefix.

pub(crate) fn decode_cmd_pair(
    product_line: ProductLine,
    accepted: &str,
    message: &Value,
) -> Result<QuotaPatch, CodecError> {
    let number = |key: &str| {
        message
            .get(key)
            .and_then(crate::model::command::value_as_u64)
            .ok_or_else(|| CodecError::malformed(format!("message has no {key}")))
    };
    let discriminator = format!("{}_{}", number("cmdFunc")?, number("cmdId")?);
    if discriminator != accepted {
        return Err(CodecError::UnknownDiscriminator {
            product_line,
            discriminator,
        });
    }
    Ok(QuotaPatch::from_params(&format!("{accepted}."), message_params(message)?))
}

pub(crate) fn report_cmd_pair(
    cmd_func: u64,
    cmd_id: u64,
    snapshot: &QuotaSnapshot,
) -> Vec<Value> {
    let params = snapshot.section(&format!("{cmd_func}_{cmd_id}."));
    if params.is_empty() {
        return Vec::new();
    }
    vec![serde_json::json!({
        "cmdFunc": cmd_func,
        "cmdId": cmd_id,
        "param": Value::Object(params),
    })]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn brightness_scaling_round_trips_every_percent() {
        for percent in 0..=100u8 {
            let native = percent_to_native(percent);
            assert!(native <= NATIVE_BRIGHTNESS_MAX);
            assert_eq!(native_to_percent(native), percent, "percent {percent}");
        }
        assert_eq!(percent_to_native(0), 0);
        assert_eq!(percent_to_native(100), 1023);
        assert_eq!(native_to_percent(5000), 100);
    }

    #[test]
    fn every_model_has_a_codec_of_its_product_line() {
        for model in DeviceModel::all() {
            assert_eq!(codec_for(model).product_line(), model.product_line());
        }
    }

    #[test]
    fn type_code_decoding() {
        let sections = [("pdStatus", "pd."), ("invStatus", "inv.")];
        let patch = decode_type_code(
            ProductLine::Delta2,
            &sections,
            &json!({ "typeCode": "invStatus", "params": { "cfgAcEnabled": 1 } }),
        )
        .unwrap();
        assert_eq!(patch.get("inv.cfgAcEnabled"), Some(Some(&json!(1))));

        let err = decode_type_code(
            ProductLine::Delta2,
            &sections,
            &json!({ "typeCode": "kitStatus", "params": {} }),
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::UnknownDiscriminator { .. }));
    }

    #[test]
    fn cmd_pair_accepts_numeric_strings() {
        let patch = decode_cmd_pair(
            ProductLine::SmartPlug,
            "2_1",
            &json!({ "cmdFunc": "2", "cmdId": 1, "param": { "switchSta": true } }),
        )
        .unwrap();
        assert_eq!(patch.get("2_1.switchSta"), Some(Some(&json!(true))));
    }

    #[test]
    fn percent_check() {
        assert_eq!(check_percent("maxChgSoc", 100).unwrap(), 100);
        assert!(check_percent("maxChgSoc", 101).is_err());
    }
}
