// ── Quota snapshot ──
//
// Last-known device state keyed by canonical quota name (the key the HTTP
// API uses: `inv.cfgAcEnabled`, `20_1.permanentWatts`, `bpSoc`, ...).
// Snapshots are only ever patched field by field.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// On/off flag as reported by the firmware (`0`/`1` or `false`/`true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum EnableType {
    Off,
    On,
}

impl EnableType {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(true) => Some(Self::On),
            Value::Bool(false) => Some(Self::Off),
            Value::Number(n) => match n.as_u64()? {
                0 => Some(Self::Off),
                1 => Some(Self::On),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for EnableType {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

// ── QuotaPatch ───────────────────────────────────────────────────────

/// Ordered set of field updates. `None` removes the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuotaPatch {
    entries: BTreeMap<String, Option<Value>>,
}

impl QuotaPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), Some(value.into()));
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        self.entries.insert(key.into(), None);
    }

    /// Every key of `map`, prefixed with `prefix`.
    pub fn from_params(prefix: &str, params: &Map<String, Value>) -> Self {
        let entries = params
            .iter()
            .map(|(k, v)| (format!("{prefix}{k}"), Some(v.clone())))
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<Option<&Value>> {
        self.entries.get(key).map(Option::as_ref)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `other`; its entries win on conflicting keys.
    pub fn extend(&mut self, other: QuotaPatch) {
        self.entries.extend(other.entries);
    }
}

// ── QuotaSnapshot ────────────────────────────────────────────────────

/// Per-device cached view of decoded state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QuotaSnapshot {
    values: BTreeMap<String, Value>,
}

impl QuotaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `patch` in place and return the patch that undoes it.
    ///
    /// Fields absent from `patch` are never touched.
    pub fn apply(&mut self, patch: &QuotaPatch) -> QuotaPatch {
        let mut inverse = QuotaPatch::new();
        for (key, value) in &patch.entries {
            let previous = match value {
                Some(v) => self.values.insert(key.clone(), v.clone()),
                None => self.values.remove(key),
            };
            inverse.entries.insert(key.clone(), previous);
        }
        inverse
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read; `None` when unset or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn enabled(&self, key: &str) -> Option<EnableType> {
        self.get(key).and_then(EnableType::from_value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fields whose key starts with `prefix`, with the prefix stripped.
    pub fn section(&self, prefix: &str) -> Map<String, Value> {
        self.values
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix).map(|rest| (rest.to_owned(), v.clone())))
            .collect()
    }
}
