// Signed HTTP client for the EcoFlow open platform.
//
// Base URL: https://api-e.ecoflow.com (EU/global) or https://api-a.ecoflow.com
// Auth: per-request HMAC signature headers (see `crate::sign`)

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error};
use url::Url;

use super::cache::QuotaCache;
use super::models::{AllQuotaData, ApiResponse, Certificate, GetQuotasRequest, QuotaList};
use crate::error::Error;
use crate::sign::Signer;
use crate::transport::TransportConfig;

/// Default cloud API host.
pub const DEFAULT_API_URL: &str = "https://api-e.ecoflow.com";

const QUOTA_PATH: &str = "iot-open/sign/device/quota";
const ALL_QUOTAS_PATH: &str = "iot-open/sign/device/quota/all";
const CERTIFICATE_PATH: &str = "iot-open/sign/certification";

/// Async client for the EcoFlow open platform HTTP API.
///
/// Every request is signed with the credential pair held by the [`Signer`].
/// Single-quota reads are cached for a few seconds. No retries happen here:
/// failures are logged and returned to the caller, which decides what to do.
pub struct EcoflowClient {
    http: reqwest::Client,
    base_url: Url,
    signer: Signer,
    cache: QuotaCache,
}

impl EcoflowClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a base URL, signer and transport config.
    pub fn new(base_url: &str, signer: Signer, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::from_reqwest(base_url, http, signer)
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client, signer: Signer) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Self::normalize_base_url(base_url)?,
            signer,
            cache: QuotaCache::default(),
        })
    }

    /// Ensure the base URL ends with `/` so relative joins keep its path.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn access_key(&self) -> &str {
        self.signer.access_key()
    }

    // ── Quota reads ──────────────────────────────────────────────────

    /// Fetch every quota of a device in one call.
    ///
    /// Returns `Ok(None)` when the API reports success without a payload.
    pub async fn get_all_quotas(&self, sn: &str) -> Result<Option<AllQuotaData>, Error> {
        let resp: ApiResponse<AllQuotaData> = self
            .request_signed(Method::GET, ALL_QUOTAS_PATH, &json!({ "sn": sn }))
            .await?;
        Ok(resp.data)
    }

    /// Fetch a selection of quota keys.
    pub async fn get_quotas(&self, sn: &str, keys: &[&str]) -> Result<AllQuotaData, Error> {
        let body = serde_json::to_value(GetQuotasRequest {
            sn,
            params: QuotaList { quotas: keys },
        })
        .map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;

        let resp: ApiResponse<AllQuotaData> =
            self.request_signed(Method::POST, QUOTA_PATH, &body).await?;
        resp.data.ok_or_else(|| Error::MissingData {
            what: format!("quotas {keys:?} of {sn}"),
        })
    }

    /// Read one quota value, served from the cache while it is fresh.
    pub async fn execute_get<T: DeserializeOwned>(&self, sn: &str, key: &str) -> Result<T, Error> {
        let value = match self.cache.get(sn, key) {
            Some(value) => {
                debug!(sn, key, "quota cache hit");
                value
            }
            None => {
                let mut data = self.get_quotas(sn, &[key]).await?;
                let value = data.remove(key).ok_or_else(|| Error::MissingData {
                    what: format!("quota {key} of {sn}"),
                })?;
                self.cache.insert(sn, key, value.clone());
                value
            }
        };

        serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: value.to_string(),
        })
    }

    // ── Quota writes ─────────────────────────────────────────────────

    /// Write one quota value; the acknowledged value is cached.
    pub async fn execute_set<T: Serialize>(&self, sn: &str, key: &str, value: T) -> Result<(), Error> {
        let value = serde_json::to_value(value).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        let body = json!({ "sn": sn, "params": { key: value.clone() } });

        let _: ApiResponse<Value> = self.request_signed(Method::PUT, QUOTA_PATH, &body).await?;
        self.cache.insert(sn, key, value);
        Ok(())
    }

    /// Send a complete device-family set envelope over HTTP.
    ///
    /// The envelope must already carry `sn` and the family framing fields.
    pub async fn send_set_envelope(&self, envelope: &Value) -> Result<(), Error> {
        let _: ApiResponse<Value> = self.request_signed(Method::PUT, QUOTA_PATH, envelope).await?;
        Ok(())
    }

    // ── MQTT certificate ─────────────────────────────────────────────

    /// Acquire temporary MQTT credentials for this account.
    pub async fn acquire_certificate(&self) -> Result<Certificate, Error> {
        let resp: ApiResponse<Certificate> = self
            .request_signed(Method::GET, CERTIFICATE_PATH, &json!({}))
            .await?;
        resp.data.ok_or_else(|| Error::MissingData {
            what: "MQTT certificate".into(),
        })
    }

    // ── Request plumbing ─────────────────────────────────────────────

    /// Sign `params` and send them as query string (GET) or JSON body.
    async fn request_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &Value,
    ) -> Result<ApiResponse<T>, Error> {
        let url = self.base_url.join(path)?;
        debug!("{method} {url}");

        let signature = self.signer.sign(params)?;
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .headers(signature.headers()?)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        request = if method == Method::GET {
            request.query(&query_pairs(params))
        } else {
            request.json(params)
        };

        let result = match request.send().await {
            Ok(resp) => Self::parse_envelope(resp).await,
            Err(e) => Err(Error::Transport(e)),
        };

        result.inspect_err(|e| error!(error = %e, %method, %url, "EcoFlow API request failed"))
    }

    /// Check the HTTP status and the envelope `code`.
    async fn parse_envelope<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<ApiResponse<T>, Error> {
        let status = resp.status();
        let url = resp.url().to_string();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp.text().await?;
        let envelope: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if !envelope.is_success() {
            return Err(Error::Api {
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }
        Ok(envelope)
    }
}

/// Top-level scalar params rendered as query pairs.
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = params else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k.clone(), s.clone())),
            Value::Number(_) | Value::Bool(_) => Some((k.clone(), v.to_string())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = EcoflowClient::normalize_base_url("https://api-e.ecoflow.com").unwrap();
        assert_eq!(
            url.join(QUOTA_PATH).unwrap().as_str(),
            "https://api-e.ecoflow.com/iot-open/sign/device/quota"
        );

        let url = EcoflowClient::normalize_base_url("http://127.0.0.1:8080/proxy/").unwrap();
        assert_eq!(
            url.join(CERTIFICATE_PATH).unwrap().as_str(),
            "http://127.0.0.1:8080/proxy/iot-open/sign/certification"
        );
    }

    #[test]
    fn query_pairs_only_keep_scalars() {
        let mut pairs = query_pairs(&json!({ "sn": "SN1", "n": 2, "nested": { "x": 1 } }));
        pairs.sort();
        assert_eq!(
            pairs,
            vec![("n".to_string(), "2".to_string()), ("sn".to_string(), "SN1".to_string())]
        );
    }
}
