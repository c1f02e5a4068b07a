//! Payload encoding shared by every store.
//!
//! Values are serialized to JSON and, when the store was opened with
//! compression, zlib-deflated. Decoding failures are reported as `None`
//! so callers can treat a corrupt entry as a miss.

use crate::error::{CacheError, CacheErrorKind, CacheResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};

/// Encoder/decoder bound to a store's compression setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadCodec {
    pub compress: bool,
}

impl PayloadCodec {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    pub fn encode(&self, value: &Value) -> CacheResult<Vec<u8>> {
        let json = serde_json::to_vec(value).map_err(|e| {
            CacheError::new(CacheErrorKind::Encoding, format!("Failed to serialize payload: {e}"))
        })?;

        if !self.compress {
            return Ok(json);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).map_err(|e| {
            CacheError::new(CacheErrorKind::Encoding, format!("Failed to compress payload: {e}"))
        })?;
        encoder.finish().map_err(|e| {
            CacheError::new(CacheErrorKind::Encoding, format!("Failed to finish compression: {e}"))
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> Option<Value> {
        if self.compress {
            let mut decoder = ZlibDecoder::new(bytes);
            let mut json = Vec::new();
            decoder.read_to_end(&mut json).ok()?;
            serde_json::from_slice(&json).ok()
        } else {
            serde_json::from_slice(bytes).ok()
        }
    }
}
