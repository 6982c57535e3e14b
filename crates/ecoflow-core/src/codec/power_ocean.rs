// PowerOcean home energy system (read-only).
//
// Inbound: { addr: "JTS1_ENERGY_STREAM_REPORT", params: { ... } }

use serde_json::{Map, Value, json};

use super::{EncodeContext, QuotaCodec, message_params};
use crate::error::CodecError;
use crate::model::{DeviceStatus, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand, SetEnvelope};

const REPORTS: &[&str] = &[
    "JTS1_ENERGY_STREAM_REPORT",
    "JTS1_EMS_HEARTBEAT",
    "JTS1_BP_STA_REPORT",
];

pub mod keys {
    pub const SOC: &str = "bpSoc";
    pub const PV_WATTS: &str = "mpptPwr";
    pub const LOAD_WATTS: &str = "sysLoadPwr";
}

pub struct PowerOceanCodec;

impl PowerOceanCodec {
    fn read_only(&self) -> CodecError {
        CodecError::ReadOnly {
            product_line: self.product_line(),
        }
    }
}

impl QuotaCodec for PowerOceanCodec {
    fn product_line(&self) -> ProductLine {
        ProductLine::PowerOcean
    }

    fn decode_quota(&self, message: &Value) -> Result<QuotaPatch, CodecError> {
        let addr = message
            .get("addr")
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::malformed("message has no addr"))?;
        if !REPORTS.contains(&addr) {
            return Err(CodecError::UnknownDiscriminator {
                product_line: self.product_line(),
                discriminator: addr.to_owned(),
            });
        }
        Ok(QuotaPatch::from_params("", message_params(message)?))
    }

    fn encode(
        &self,
        _command: &SetCommand,
        _ctx: &EncodeContext<'_>,
    ) -> Result<SetEnvelope, CodecError> {
        Err(self.read_only())
    }

    fn optimistic_patch(&self, _command: &SetCommand) -> Result<QuotaPatch, CodecError> {
        Err(self.read_only())
    }

    fn decode_command(&self, _envelope: &SetEnvelope) -> Result<SetCommand, CodecError> {
        Err(self.read_only())
    }

    fn status(&self, snapshot: &QuotaSnapshot) -> DeviceStatus {
        DeviceStatus {
            battery_level: snapshot.get_f64(keys::SOC),
            input_watts: snapshot.get_f64(keys::PV_WATTS),
            output_watts: snapshot.get_f64(keys::LOAD_WATTS),
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
        vec![json!({ "addr": REPORTS[0], "params": Value::Object(params) })]
    }
}
