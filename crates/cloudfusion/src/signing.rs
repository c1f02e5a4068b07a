//! AWS query-protocol request signing (Signature Version 2 and 3).
//!
//! Both schemes compute a base64-encoded HMAC-SHA256 over a string to sign:
//!
//! * **v2** signs `POST\n{host}\n{uri}\n{canonical query}` and appends the
//!   result to the form body as `Signature`.
//! * **v3** (`AWS3-HTTPS`) signs `{Date header}{nonce}` and sends the
//!   result in the `X-Amzn-Authorization` header.
//!
//! Canonical queries are sorted by plain byte comparison of the keys, so
//! `B` sorts before `a` regardless of locale.

use crate::config::Credentials;
use crate::error::{SdkError, SdkResult};
use crate::util::{iso8601, rfc1123, to_query_string};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_METHOD: &str = "HmacSHA256";

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureVersion {
    #[default]
    V2,
    V3,
}

impl SignatureVersion {
    pub fn as_u8(self) -> u8 {
        match self {
            SignatureVersion::V2 => 2,
            SignatureVersion::V3 => 3,
        }
    }
}

impl TryFrom<u8> for SignatureVersion {
    type Error = SdkError;

    fn try_from(v: u8) -> SdkResult<Self> {
        match v {
            2 => Ok(SignatureVersion::V2),
            3 => Ok(SignatureVersion::V3),
            other => Err(SdkError::config(format!(
                "Unsupported signature version: {other}"
            ))),
        }
    }
}

/// Time and nonce a signature is computed for.
///
/// Fixing both makes signing fully deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    pub timestamp: DateTime<Utc>,
    pub nonce: String,
}

impl SigningContext {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            nonce: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn fixed(timestamp: DateTime<Utc>, nonce: &str) -> Self {
        Self {
            timestamp,
            nonce: nonce.to_string(),
        }
    }
}

/// Form body and headers produced by signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub body: String,
    pub headers: BTreeMap<String, String>,
    /// The exact string the HMAC was computed over.
    pub string_to_sign: String,
}

#[derive(Debug, Clone)]
pub struct RequestSigner {
    access_key_id: String,
    secret_access_key: String,
}

impl RequestSigner {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
        }
    }

    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self::new(&credentials.key, &credentials.secret)
    }

    /// Protocol-mandated keys for `scheme`.
    pub fn protocol_params(
        &self,
        action: &str,
        version: &str,
        scheme: SignatureVersion,
        ctx: &SigningContext,
    ) -> BTreeMap<String, String> {
        let mut p = BTreeMap::new();
        p.insert("AWSAccessKeyId".to_string(), self.access_key_id.clone());
        p.insert("Action".to_string(), action.to_string());
        p.insert("Version".to_string(), version.to_string());
        if scheme == SignatureVersion::V2 {
            p.insert("SignatureMethod".to_string(), SIGNATURE_METHOD.to_string());
            p.insert("SignatureVersion".to_string(), "2".to_string());
            p.insert("Timestamp".to_string(), iso8601(&ctx.timestamp));
        }
        p
    }

    /// Merge protocol keys over `params` and sign the result.
    ///
    /// `host_header` and `request_uri` only take part in v2 signatures.
    #[allow(clippy::too_many_arguments)]
    pub fn sign(
        &self,
        scheme: SignatureVersion,
        action: &str,
        version: &str,
        host_header: &str,
        request_uri: &str,
        mut params: BTreeMap<String, String>,
        ctx: &SigningContext,
    ) -> SdkResult<SignedPayload> {
        params.extend(self.protocol_params(action, version, scheme, ctx));
        let query = canonical_query(&params);

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string());

        match scheme {
            SignatureVersion::V2 => {
                let string_to_sign = string_to_sign_v2(host_header, request_uri, &query);
                let signature = self.signature(&string_to_sign)?;
                Ok(SignedPayload {
                    body: format!("{query}&Signature={}", uri_encode(&signature)),
                    headers,
                    string_to_sign,
                })
            }
            SignatureVersion::V3 => {
                let date = rfc1123(&ctx.timestamp);
                let string_to_sign = string_to_sign_v3(&date, &ctx.nonce);
                let signature = self.signature(&string_to_sign)?;
                headers.insert("Date".to_string(), date);
                headers.insert("x-amz-nonce".to_string(), ctx.nonce.clone());
                headers.insert(
                    "X-Amzn-Authorization".to_string(),
                    format!(
                        "AWS3-HTTPS AWSAccessKeyId={},Algorithm={SIGNATURE_METHOD},Signature={signature}",
                        self.access_key_id
                    ),
                );
                Ok(SignedPayload {
                    body: query,
                    headers,
                    string_to_sign,
                })
            }
        }
    }

    /// Base64 HMAC-SHA256 of `string_to_sign` under the secret key.
    pub fn signature(&self, string_to_sign: &str) -> SdkResult<String> {
        hmac_sha256_base64(self.secret_access_key.as_bytes(), string_to_sign.as_bytes())
    }
}

// ── Helper functions ────────────────────────────────────────────────────

pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    to_query_string(params)
}

pub fn string_to_sign_v2(host_header: &str, request_uri: &str, canonical_query: &str) -> String {
    format!("POST\n{host_header}\n{request_uri}\n{canonical_query}")
}

pub fn string_to_sign_v3(date: &str, nonce: &str) -> String {
    format!("{date}{nonce}")
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> SdkResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SdkError::signing(format!("Invalid HMAC key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn hmac_sha256_base64(key: &[u8], data: &[u8]) -> SdkResult<String> {
    Ok(STANDARD.encode(hmac_sha256(key, data)?))
}

/// Compute SHA-256 hash and return hex-encoded string.
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// RFC 3986 percent-encoding: everything except `A-Z a-z 0-9 - _ . ~`.
pub fn uri_encode(input: &str) -> String {
    use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
    const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
        .remove(b'-')
        .remove(b'_')
        .remove(b'.')
        .remove(b'~');

    utf8_percent_encode(input, RFC3986).to_string()
}
