//! Small helpers shared by signing and response handling.

use crate::signing::uri_encode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};

/// `2010-05-20T14:03:07Z`, the `Timestamp` format of the query protocol.
pub fn iso8601(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// `Thu, 20 May 2010 14:03:07 GMT`, the HTTP `Date` header format.
pub fn rfc1123(ts: &DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Whether `s` is valid standard-alphabet base64.
pub fn is_base64(s: &str) -> bool {
    STANDARD.decode(s.trim()).is_ok()
}

/// Join pairs into `k=v&k=v`, percent-encoding both sides. Order is kept.
pub fn to_query_string<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k.as_ref()), uri_encode(v.as_ref())))
        .collect::<Vec<_>>()
        .join("&")
}
