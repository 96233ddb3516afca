//! Raw HTTP exchange decoding.
//!
//! The engine hands back the full response bytes it read from the target
//! (start line, header lines, blank line, body). The status code arrives in a
//! separate structured field, so the start line is never reparsed here.

use crate::base::neterror::NetError;
use crate::http::orderedheaders::ResponseHeaders;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Wire line terminator. Fixed to CRLF regardless of platform.
pub const CRLF: &[u8] = b"\r\n";

/// Boundary between the header block and the body.
pub const HEADER_BOUNDARY: &[u8] = b"\r\n\r\n";

const HEADER_SEPARATOR: &str = ": ";

/// The `response` field of an inbound message.
///
/// Engines ship the exchange either as a base64 string or as a JSON array of
/// byte values. The variant follows the JSON type of the field. JVM engines
/// emit signed bytes, so list elements in `-128..=255` are accepted and
/// wrapped into `u8`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseBlob {
    Base64(String),
    Raw(Vec<u8>),
}

impl ResponseBlob {
    /// Wrap raw bytes as a base64 blob.
    pub fn encode_base64(raw: &[u8]) -> Self {
        ResponseBlob::Base64(STANDARD.encode(raw))
    }

    /// Recover the raw exchange bytes.
    pub fn into_bytes(self) -> Result<Bytes, NetError> {
        match self {
            ResponseBlob::Base64(encoded) => STANDARD
                .decode(encoded.trim())
                .map(Bytes::from)
                .map_err(|_| NetError::MalformedFrame),
            ResponseBlob::Raw(raw) => Ok(Bytes::from(raw)),
        }
    }
}

impl<'de> Deserialize<'de> for ResponseBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BlobVisitor;

        impl<'de> Visitor<'de> for BlobVisitor {
            type Value = ResponseBlob;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a base64 string or a list of byte values")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(ResponseBlob::Base64(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(ResponseBlob::Base64(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut raw = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(value) = seq.next_element::<i16>()? {
                    if !(-128..=255).contains(&value) {
                        return Err(de::Error::custom(format!("byte value {value} out of range")));
                    }
                    raw.push(value as u8);
                }
                Ok(ResponseBlob::Raw(raw))
            }
        }

        deserializer.deserialize_any(BlobVisitor)
    }
}

/// A raw exchange split into headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExchange {
    pub headers: ResponseHeaders,
    pub body: Bytes,
}

impl RawExchange {
    /// Split a raw exchange into ordered header lines and body bytes.
    ///
    /// The body is sliced out of `raw` without copying.
    pub fn parse(raw: Bytes) -> Result<Self, NetError> {
        let boundary = find(&raw, HEADER_BOUNDARY).ok_or(NetError::MalformedFrame)?;
        let body = raw.slice(boundary + HEADER_BOUNDARY.len()..);
        let header_block = &raw[..boundary];

        let mut headers = ResponseHeaders::new();

        // First line is the status line; only what follows it is headers.
        if let Some(start_end) = find(header_block, CRLF) {
            let lines = String::from_utf8_lossy(&header_block[start_end + CRLF.len()..]);
            for line in lines.split("\r\n") {
                let (name, value) = line
                    .split_once(HEADER_SEPARATOR)
                    .ok_or(NetError::MalformedFrame)?;
                headers.append(name, value);
            }
        }

        Ok(Self { headers, body })
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
