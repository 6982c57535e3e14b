// Wire types for the EcoFlow open platform HTTP API.
//
// Every response is wrapped in `{ code, message, data }` where `code == "0"`
// means success. Quota data is a flat object keyed by quota name
// (`inv.cfgAcEnabled`, `20_1.permanentWatts`, ...).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Success code in the response envelope.
pub const SUCCESS_CODE: &str = "0";

/// `{ code, message, data }` response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(deserialize_with = "string_or_number")]
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// Flat quota map returned by "get all quotas" and "get quotas".
pub type AllQuotaData = Map<String, Value>;

/// Body of a quota read: `{ sn, params: { quotas: [...] } }`.
#[derive(Debug, Clone, Serialize)]
pub struct GetQuotasRequest<'a> {
    pub sn: &'a str,
    pub params: QuotaList<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaList<'a> {
    pub quotas: &'a [&'a str],
}

/// Temporary MQTT credentials issued by the certification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub certificate_account: String,
    pub certificate_password: String,
    pub url: String,
    #[serde(deserialize_with = "string_or_number")]
    pub port: String,
    pub protocol: String,
}

impl Certificate {
    /// `{protocol}://{url}:{port}`
    pub fn broker_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.url, self.port)
    }

    /// Broker port as a number.
    pub fn port_number(&self) -> Result<u16, crate::Error> {
        self.port
            .parse()
            .map_err(|_| crate::Error::MqttOptions(format!("invalid broker port '{}'", self.port)))
    }

    /// Whether the broker expects a TLS connection.
    pub fn uses_tls(&self) -> bool {
        matches!(
            self.protocol.to_ascii_lowercase().as_str(),
            "mqtts" | "ssl" | "tls" | "wss"
        )
    }
}

/// The API sends some numeric fields as strings and some as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn certificate_accepts_string_or_numeric_port() {
        let with_string: Certificate = serde_json::from_value(json!({
            "certificateAccount": "open-abc",
            "certificatePassword": "pw",
            "url": "mqtt-e.ecoflow.com",
            "port": "8883",
            "protocol": "mqtts"
        }))
        .unwrap();
        let with_number: Certificate = serde_json::from_value(json!({
            "certificateAccount": "open-abc",
            "certificatePassword": "pw",
            "url": "mqtt-e.ecoflow.com",
            "port": 8883,
            "protocol": "mqtts"
        }))
        .unwrap();

        assert_eq!(with_string, with_number);
        assert_eq!(with_string.port_number().unwrap(), 8883);
        assert_eq!(with_string.broker_url(), "mqtts://mqtt-e.ecoflow.com:8883");
        assert!(with_string.uses_tls());
    }

    #[test]
    fn envelope_code_may_be_numeric() {
        let resp: ApiResponse<AllQuotaData> =
            serde_json::from_value(json!({ "code": 0, "message": "Success", "data": {} }))
                .unwrap();
        assert!(resp.is_success());

        let resp: ApiResponse<AllQuotaData> =
            serde_json::from_value(json!({ "code": "1006", "message": "not allowed" })).unwrap();
        assert!(!resp.is_success());
        assert!(resp.data.is_none());
    }

    #[test]
    fn get_quotas_request_shape() {
        let keys = ["inv.cfgAcEnabled"];
        let body = GetQuotasRequest {
            sn: "SN1",
            params: QuotaList { quotas: &keys },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "sn": "SN1", "params": { "quotas": ["inv.cfgAcEnabled"] } })
        );
    }
}
