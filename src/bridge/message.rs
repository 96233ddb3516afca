//! Structured payloads carried inside frames.

use crate::base::neterror::NetError;
use crate::bridge::codec::encode_frame;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::rawresponse::ResponseBlob;
use bytes::Bytes;
use http::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reserved label of the engine's warm-up request. Never resolved.
pub const INIT_LABEL: &str = "init";

/// Protocol version the engine should use toward the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpVersion {
    #[default]
    #[serde(rename = "HTTP/1.1")]
    Http11,
    #[serde(rename = "HTTP/2")]
    Http2,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http11 => "HTTP/1.1",
            HttpVersion::Http2 => "HTTP/2",
        }
    }
}

/// Everything the engine needs to issue one request.
///
/// Built by the client at call time and held by the registry until the
/// matching reply arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path plus encoded query, relative to the session base URL.
    pub endpoint: String,
    pub headers: OrderedHeaderMap,
    pub body: Option<String>,
    pub version: HttpVersion,
}

impl RequestDescriptor {
    /// Wire message for this request under `label`.
    pub fn to_message(&self, label: &str) -> OutboundMessage {
        OutboundMessage {
            label: label.to_string(),
            version: self.version,
            method: self.method.as_str().to_string(),
            endpoint: self.endpoint.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Bridge to engine message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub label: String,
    pub version: HttpVersion,
    pub method: String,
    pub endpoint: String,
    pub headers: OrderedHeaderMap,
    pub body: Option<String>,
}

impl OutboundMessage {
    /// Serialize into a complete length-prefixed frame.
    pub fn to_frame(&self) -> Result<Bytes, NetError> {
        let payload = serde_json::to_vec(self).map_err(|e| {
            tracing::error!(error = %e, label = %self.label, "failed to serialize request");
            NetError::MalformedFrame
        })?;
        encode_frame(&payload)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, NetError> {
        serde_json::from_slice(payload).map_err(|_| NetError::MalformedFrame)
    }
}

/// Engine to bridge message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub label: String,
    pub status: u16,
    pub id: i64,
    /// Elapsed time in milliseconds as measured by the engine.
    pub time: f64,
    #[serde(default)]
    pub response: Option<ResponseBlob>,
    /// Failure text when the engine could not complete the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Just the label of an inbound payload, for frames whose other fields do
/// not decode.
#[derive(Deserialize)]
struct LabelOnly {
    label: String,
}

impl InboundMessage {
    /// Recover the label of a payload that failed [`InboundMessage::decode`].
    pub fn peek_label(payload: &[u8]) -> Option<String> {
        serde_json::from_slice::<LabelOnly>(payload)
            .ok()
            .map(|l| l.label)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, NetError> {
        serde_json::from_slice(payload).map_err(|e| {
            tracing::debug!(error = %e, "inbound payload is not a valid message");
            NetError::MalformedFrame
        })
    }

    pub fn to_frame(&self) -> Result<Bytes, NetError> {
        let payload = serde_json::to_vec(self).map_err(|_| NetError::MalformedFrame)?;
        encode_frame(&payload)
    }

    pub fn is_bootstrap(&self) -> bool {
        self.label == INIT_LABEL
    }

    pub fn elapsed(&self) -> Duration {
        if self.time.is_finite() && self.time > 0.0 {
            Duration::try_from_secs_f64(self.time / 1000.0).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    /// Classify an engine-reported failure.
    ///
    /// Unresolvable hosts end the whole bridge; anything else fails only the
    /// request it was reported for.
    pub fn fault(&self) -> Option<NetError> {
        let error = self.error.as_deref()?;
        let lowered = error.to_ascii_lowercase();
        if lowered.contains("unknownhost")
            || lowered.contains("unknown host")
            || lowered.contains("resolve host")
            || lowered.contains("host resolution")
        {
            Some(NetError::HostResolutionFailure)
        } else {
            Some(NetError::ConnectionFailed)
        }
    }
}
