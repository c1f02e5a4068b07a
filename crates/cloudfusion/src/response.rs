//! Response envelope returned for every completed request.

use crate::transport::HttpResponse;
use crate::xml::{self, XmlElement};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status codes [`ResponseEnvelope::is_ok`] accepts.
pub const SUCCESS_CODES: [u16; 4] = [200, 201, 204, 206];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ResponseBody {
    Raw(String),
    Document(XmlElement),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
    pub status: u16,
}

impl ResponseEnvelope {
    pub fn new(headers: BTreeMap<String, String>, body: ResponseBody, status: u16) -> Self {
        Self {
            headers,
            body,
            status,
        }
    }

    /// Build from a transport response, parsing XML-looking bodies.
    ///
    /// A body that looks like XML but fails to parse stays raw.
    pub fn from_http(response: HttpResponse) -> Self {
        let body = if looks_like_xml(&response.body) {
            match xml::parse(&response.body) {
                Ok(doc) => ResponseBody::Document(doc),
                Err(e) => {
                    log::debug!("Keeping unparseable XML body as raw text: {e}");
                    ResponseBody::Raw(response.body)
                }
            }
        } else {
            ResponseBody::Raw(response.body)
        };
        Self::new(response.headers, body, response.status)
    }

    pub fn is_ok(&self) -> bool {
        self.is_ok_with(&SUCCESS_CODES)
    }

    pub fn is_ok_with(&self, codes: &[u16]) -> bool {
        codes.contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Request ID from the response headers or the document body.
    pub fn request_id(&self) -> Option<&str> {
        self.header("x-amzn-requestid")
            .or_else(|| self.header("x-amz-request-id"))
            .or_else(|| {
                let doc = self.document()?;
                doc.text_at("ResponseMetadata/RequestId")
                    .or_else(|| doc.text_at("RequestId"))
                    .or_else(|| doc.text_at("RequestID"))
            })
    }

    pub fn document(&self) -> Option<&XmlElement> {
        match self.body {
            ResponseBody::Document(ref doc) => Some(doc),
            ResponseBody::Raw(_) => None,
        }
    }

    pub fn body_text(&self) -> Option<&str> {
        match self.body {
            ResponseBody::Raw(ref s) => Some(s),
            ResponseBody::Document(_) => None,
        }
    }
}

/// Whether a body should be parsed as an XML document: an XML
/// declaration, an `<Error>` root or an AWS `doc/` namespace.
pub fn looks_like_xml(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with("<?xml")
        || trimmed.starts_with("<Error>")
        || (trimmed.starts_with('<')
            && trimmed.contains("xmlns=\"http://")
            && trimmed.contains(".amazonaws.com/doc/"))
}
