// ── Commands, set envelopes and set replies ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::CodecError;

/// Envelope `version` field, fixed across product lines.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Which source a PowerStream prefers to feed the home load from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum SupplyPriority {
    /// Supply the household first.
    PowerSupply,
    /// Charge the battery first.
    Storage,
}

/// Family-agnostic logical command.
///
/// Each product line supports a subset; encoding an unsupported command
/// yields [`CodecError::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
pub enum SetCommand {
    AcOutput(bool),
    XBoost(bool),
    DcOutput(bool),
    UsbOutput(bool),
    PlugSwitch(bool),
    /// Display or LED brightness in percent (0–100).
    Brightness(u8),
    /// Maximum state of charge in percent.
    ChargeLimit(u8),
    /// Minimum state of charge in percent.
    DischargeLimit(u8),
    AcChargingPower(u32),
    /// Permanent output demand in watts.
    PowerDemand(u32),
    SupplyPriority(SupplyPriority),
    /// Target temperature in °C.
    TargetTemperature(i32),
    EcoMode(bool),
    FanSpeed(u8),
    OperatingMode(u8),
    Power(bool),
}

impl SetCommand {
    pub fn name(&self) -> &str {
        self.as_ref()
    }
}

// ── Set envelope ─────────────────────────────────────────────────────

/// Routing fields that differ per product line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// `moduleType` + `operateType` (Delta 2, Glacier, Wave 2).
    Module { module_type: u8, operate_type: String },
    /// Fixed command header (Delta Pro 3 family).
    Header {
        cmd_id: u8,
        dir_dest: u8,
        dir_src: u8,
        cmd_func: u8,
        dest: u8,
        need_ack: bool,
    },
    /// Named command code (Smart Plug, PowerStream).
    CmdCode(String),
    /// Command set and id carried inside `params` (Delta Pro).
    CmdSet { cmd_set: u8, cmd: u8 },
}

/// Outbound set command as published to `/open/{account}/{sn}/set`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetEnvelope {
    pub id: u64,
    pub sn: String,
    pub framing: Framing,
    pub params: Map<String, Value>,
}

impl SetEnvelope {
    /// Wire JSON.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".into(), json!(self.id));
        object.insert("version".into(), json!(ENVELOPE_VERSION));
        object.insert("sn".into(), json!(self.sn));
        match &self.framing {
            Framing::Module {
                module_type,
                operate_type,
            } => {
                object.insert("moduleType".into(), json!(module_type));
                object.insert("operateType".into(), json!(operate_type));
            }
            Framing::Header {
                cmd_id,
                dir_dest,
                dir_src,
                cmd_func,
                dest,
                need_ack,
            } => {
                object.insert("cmdId".into(), json!(cmd_id));
                object.insert("dirDest".into(), json!(dir_dest));
                object.insert("dirSrc".into(), json!(dir_src));
                object.insert("cmdFunc".into(), json!(cmd_func));
                object.insert("dest".into(), json!(dest));
                object.insert("needAck".into(), json!(need_ack));
            }
            Framing::CmdCode(code) => {
                object.insert("cmdCode".into(), json!(code));
            }
            Framing::CmdSet { .. } => {}
        }

        let mut params = self.params.clone();
        if let Framing::CmdSet { cmd_set, cmd } = &self.framing {
            params.insert("cmdSet".into(), json!(cmd_set));
            params.insert("id".into(), json!(cmd));
        }
        object.insert("params".into(), Value::Object(params));
        Value::Object(object)
    }

    /// Parse wire JSON back into an envelope.
    pub fn from_json(value: &Value) -> Result<Self, CodecError> {
        let object = value
            .as_object()
            .ok_or_else(|| CodecError::malformed("set envelope is not an object"))?;

        let id = object.get("id").and_then(value_as_u64).unwrap_or_default();
        let sn = object
            .get("sn")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let mut params = object
            .get("params")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| CodecError::malformed("set envelope has no params object"))?;

        let framing = if let Some(code) = object.get("cmdCode").and_then(Value::as_str) {
            Framing::CmdCode(code.to_owned())
        } else if let Some(module_type) = object.get("moduleType").and_then(value_as_u8) {
            Framing::Module {
                module_type,
                operate_type: object
                    .get("operateType")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            }
        } else if let Some(cmd_id) = object.get("cmdId").and_then(value_as_u8) {
            let field = |name: &str| object.get(name).and_then(value_as_u8).unwrap_or_default();
            Framing::Header {
                cmd_id,
                dir_dest: field("dirDest"),
                dir_src: field("dirSrc"),
                cmd_func: field("cmdFunc"),
                dest: field("dest"),
                need_ack: object
                    .get("needAck")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }
        } else if let Some(cmd_set) = params.get("cmdSet").and_then(value_as_u8) {
            let cmd = params
                .get("id")
                .and_then(value_as_u8)
                .ok_or_else(|| CodecError::malformed("cmdSet envelope has no command id"))?;
            params.remove("cmdSet");
            params.remove("id");
            Framing::CmdSet { cmd_set, cmd }
        } else {
            return Err(CodecError::malformed("set envelope has no routing fields"));
        };

        Ok(Self {
            id,
            sn,
            framing,
            params,
        })
    }

    pub fn operate_type(&self) -> Option<&str> {
        match &self.framing {
            Framing::Module { operate_type, .. } => Some(operate_type),
            _ => None,
        }
    }

    /// Command id of a `cmdSet` envelope.
    pub fn cmd(&self) -> Option<u8> {
        match &self.framing {
            Framing::CmdSet { cmd, .. } => Some(*cmd),
            _ => None,
        }
    }

    pub fn cmd_code(&self) -> Option<&str> {
        match &self.framing {
            Framing::CmdCode(code) => Some(code),
            _ => None,
        }
    }
}

// ── Set reply ────────────────────────────────────────────────────────

/// Parsed acknowledgement from `/open/{account}/{sn}/set_reply`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetReply {
    /// Echoed envelope id, when the family echoes one.
    pub id: Option<u64>,
    pub code: Option<String>,
    /// `data.ack`: `0` or `true` is a positive acknowledgement.
    pub ack: Option<Value>,
    /// `data.configOk`.
    pub config_ok: Option<bool>,
}

impl SetReply {
    pub fn from_json(value: &Value) -> Result<Self, CodecError> {
        let object = value
            .as_object()
            .ok_or_else(|| CodecError::malformed("set reply is not an object"))?;
        let data = object.get("data").and_then(Value::as_object);

        Ok(Self {
            id: object.get("id").and_then(value_as_u64),
            code: object.get("code").map(|c| match c {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            ack: data.and_then(|d| d.get("ack")).cloned(),
            config_ok: data.and_then(|d| d.get("configOk")).and_then(Value::as_bool),
        })
    }

    /// Whether the device accepted the command.
    pub fn is_success(&self) -> bool {
        let code_ok = self.code.as_deref().is_none_or(|c| c == "0");
        let config_ok = self.config_ok.unwrap_or(true);
        let ack_ok = match &self.ack {
            None => true,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_u64() == Some(0),
            Some(_) => false,
        };
        code_ok && config_ok && ack_ok
    }

    /// Whether this reply answers the envelope with `id`.
    pub fn answers(&self, id: u64) -> bool {
        self.id.is_none_or(|own| own == id)
    }
}

/// Ids arrive as numbers or numeric strings.
pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_as_u8(value: &Value) -> Option<u8> {
    value_as_u64(value).and_then(|n| u8::try_from(n).ok())
}
