//! Operation parameters.
//!
//! Callers hand over a tree of scalars, lists and maps. Before signing the
//! tree is flattened into dotted keys (`Filter.1.Name`) with 1-based list
//! indices, which is the shape the query-protocol services expect.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Reserved key carrying per-request transport overrides.
pub const TRANSPORT_KEY: &str = "transport";

/// Reserved key asking for the prepared request instead of a response.
pub const RETURN_RAW_KEY: &str = "returnRawRequest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ParamValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            ParamValue::Scalar(s) => !matches!(s.as_str(), "" | "0" | "false"),
            ParamValue::List(items) => !items.is_empty(),
            ParamValue::Map(map) => !map.is_empty(),
        }
    }

    fn flatten_into(&self, prefix: &str, out: &mut BTreeMap<String, String>) {
        match self {
            ParamValue::Scalar(s) => {
                out.insert(prefix.to_string(), s.clone());
            }
            ParamValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    item.flatten_into(&format!("{prefix}.{}", i + 1), out);
                }
            }
            ParamValue::Map(map) => {
                for (k, v) in map {
                    v.flatten_into(&format!("{prefix}.{k}"), out);
                }
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Scalar(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Scalar(s)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Scalar(n.to_string())
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        ParamValue::Scalar(n.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Scalar(b.to_string())
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, ParamValue>> for ParamValue {
    fn from(map: BTreeMap<String, ParamValue>) -> Self {
        ParamValue::Map(map)
    }
}

// ── Transport overrides ─────────────────────────────────────────────────

/// Per-request overrides pulled out of the `transport` parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportOptions {
    pub timeout: Option<Duration>,
    pub headers: BTreeMap<String, String>,
}

impl TransportOptions {
    fn from_value(value: &ParamValue) -> Self {
        let mut opts = Self::default();
        let ParamValue::Map(map) = value else {
            log::warn!("Ignoring non-map '{TRANSPORT_KEY}' parameter");
            return opts;
        };
        opts.timeout = map
            .get("timeout")
            .and_then(ParamValue::as_scalar)
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        if let Some(ParamValue::Map(headers)) = map.get("headers") {
            for (name, v) in headers {
                if let Some(v) = v.as_scalar() {
                    opts.headers.insert(name.clone(), v.to_string());
                }
            }
        }
        opts
    }
}

// ── Params ──────────────────────────────────────────────────────────────

/// Caller-supplied parameter tree for one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove the reserved control keys, returning the transport overrides
    /// and whether the prepared request was asked for.
    pub fn take_controls(&mut self) -> (TransportOptions, bool) {
        let transport = self
            .0
            .remove(TRANSPORT_KEY)
            .map(|v| TransportOptions::from_value(&v))
            .unwrap_or_default();
        let raw = self
            .0
            .remove(RETURN_RAW_KEY)
            .map(|v| v.truthy())
            .unwrap_or(false);
        (transport, raw)
    }

    /// Flatten into dotted keys, sorted byte-wise.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (k, v) in &self.0 {
            v.flatten_into(k, &mut out);
        }
        out
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
