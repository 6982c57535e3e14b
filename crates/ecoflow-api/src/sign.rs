//! Request signing for the EcoFlow open platform.
//!
//! Every HTTP call carries four headers: `accessKey`, `nonce`, `timestamp`
//! and `sign`. The signature is an HMAC-SHA256 (lowercase hex) over the
//! canonical form of the request parameters followed by
//! `accessKey=..&nonce=..&timestamp=..`.
//!
//! Canonicalization flattens a nested JSON object into `key=value` pairs:
//! nested objects use a dotted prefix, arrays use `key[index]`, and keys are
//! sorted at every nesting level so that logically identical objects always
//! sign identically.

use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

/// Build the canonical `a=1&b.c=2&d[0]=x` form of a parameter object.
///
/// Non-object roots produce an empty string. `null` leaves are skipped.
pub fn canonicalize(params: &Value) -> String {
    let mut parts = Vec::new();
    if let Value::Object(map) = params {
        flatten_object("", map, &mut parts);
    }
    parts.join("&")
}

fn flatten_object(prefix: &str, map: &Map<String, Value>, parts: &mut Vec<String>) {
    // serde_json may be built with `preserve_order`, so never rely on map order.
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (key, value) in entries {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        flatten_value(&full_key, value, parts);
    }
}

fn flatten_value(key: &str, value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Object(map) => flatten_object(key, map, parts),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_value(&format!("{key}[{index}]"), item, parts);
            }
        }
        Value::String(s) => parts.push(format!("{key}={s}")),
        Value::Bool(_) | Value::Number(_) => parts.push(format!("{key}={value}")),
    }
}

/// HMAC-SHA256 of `message` keyed by `secret_key`, as lowercase hex.
pub fn sign(secret_key: &str, message: &str) -> Result<String, Error> {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|e| Error::InvalidSigningKey(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Append the credential/nonce/timestamp suffix to a canonical string.
pub fn string_to_sign(canonical: &str, access_key: &str, nonce: &str, timestamp: i64) -> String {
    let suffix = format!("accessKey={access_key}&nonce={nonce}&timestamp={timestamp}");
    if canonical.is_empty() {
        suffix
    } else {
        format!("{canonical}&{suffix}")
    }
}

/// Six-digit zero-padded random decimal nonce.
pub fn generate_nonce() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000_u32))
}

// ── Signature ────────────────────────────────────────────────────────

/// The four authentication headers of one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub access_key: String,
    pub nonce: String,
    pub timestamp: i64,
    pub sign: String,
}

impl Signature {
    /// Render as request headers (the signature value is marked sensitive).
    pub fn headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        // Header names are case-insensitive on the wire; `http` stores them lowercase.
        headers.insert("accesskey", header_value(&self.access_key)?);
        headers.insert("nonce", header_value(&self.nonce)?);
        headers.insert("timestamp", header_value(&self.timestamp.to_string())?);
        let mut sign = header_value(&self.sign)?;
        sign.set_sensitive(true);
        headers.insert("sign", sign);
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| Error::InvalidSigningKey(e.to_string()))
}

// ── Signer ───────────────────────────────────────────────────────────

/// Signs request parameters with one credential pair.
#[derive(Clone)]
pub struct Signer {
    access_key: String,
    secret_key: SecretString,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(access_key: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key,
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Sign `params` with a fresh nonce and the current time.
    pub fn sign(&self, params: &Value) -> Result<Signature, Error> {
        let nonce = generate_nonce();
        let timestamp = chrono::Utc::now().timestamp_millis();
        self.sign_with(params, nonce, timestamp)
    }

    /// Sign `params` with an explicit nonce and timestamp.
    pub fn sign_with(
        &self,
        params: &Value,
        nonce: String,
        timestamp: i64,
    ) -> Result<Signature, Error> {
        let message = string_to_sign(&canonicalize(params), &self.access_key, &nonce, timestamp);
        let sign = sign(self.secret_key.expose_secret(), &message)?;
        Ok(Signature {
            access_key: self.access_key.clone(),
            nonce,
            timestamp,
            sign,
        })
    }
}
