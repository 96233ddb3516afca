//! Decoded HTTP response delivered to the caller.

use crate::base::neterror::NetError;
use crate::cookies::CookieMap;
use crate::http::orderedheaders::ResponseHeaders;
use crate::http::rawresponse::RawExchange;
use bytes::Bytes;
use encoding_rs::{DecoderResult, Encoding};
use http::StatusCode;
use std::time::Duration;
use url::Url;

/// How invalid byte sequences are handled when decoding body text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextErrors {
    /// Fail on the first invalid sequence.
    Strict,
    /// Substitute U+FFFD for each invalid sequence.
    #[default]
    Replace,
    /// Drop invalid sequences.
    Ignore,
}

/// HTTP response reconstructed from an engine reply.
///
/// Immutable once built. The status comes from the engine's structured
/// `status` field; the body is kept as the exact bytes the engine returned.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    id: i64,
    status: u16,
    elapsed: Duration,
    url: Url,
    headers: ResponseHeaders,
    cookies: CookieMap,
    body: Bytes,
}

impl HttpResponse {
    /// Build from a parsed exchange and the engine's structured fields.
    pub fn from_exchange(
        id: i64,
        status: u16,
        elapsed: Duration,
        url: Url,
        exchange: RawExchange,
    ) -> Self {
        let cookies = CookieMap::from_headers(&exchange.headers);
        Self {
            id,
            status,
            elapsed,
            url,
            headers: exchange.headers,
            cookies,
            body: exchange.body,
        }
    }

    /// Engine-assigned response id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Raw status as reported by the engine. Engines report `0` when no
    /// status line was received.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Status as a typed code, if it is a valid HTTP status.
    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status).ok()
    }

    /// Time the engine measured for the exchange.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Endpoint resolved against the session base URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn cookies(&self) -> &CookieMap {
        &self.cookies
    }

    /// Body bytes. Cheap to clone.
    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Body as UTF-8 text with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body as text in the named encoding (WHATWG labels, e.g. `"latin1"`).
    pub fn text_with(&self, encoding: &str, errors: TextErrors) -> Result<String, NetError> {
        let encoding =
            Encoding::for_label(encoding.as_bytes()).ok_or(NetError::EncodingNotSupported)?;

        match errors {
            TextErrors::Strict => encoding
                .decode_without_bom_handling_and_without_replacement(&self.body)
                .map(|text| text.into_owned())
                .ok_or(NetError::InvalidUtf8),
            TextErrors::Replace => Ok(encoding
                .decode_without_bom_handling(&self.body)
                .0
                .into_owned()),
            TextErrors::Ignore => Ok(decode_ignoring_errors(encoding, &self.body)),
        }
    }

    /// Body parsed as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|_| NetError::JsonParseError)
    }
}

fn decode_ignoring_errors(encoding: &'static Encoding, mut src: &[u8]) -> String {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let mut out = String::with_capacity(
        decoder
            .max_utf8_buffer_length_without_replacement(src.len())
            .unwrap_or(src.len()),
    );

    loop {
        let (result, read) = decoder.decode_to_string_without_replacement(src, &mut out, true);
        src = &src[read..];
        match result {
            DecoderResult::InputEmpty => break,
            DecoderResult::Malformed(_, _) => continue,
            DecoderResult::OutputFull => {
                let needed = decoder
                    .max_utf8_buffer_length_without_replacement(src.len())
                    .unwrap_or(src.len());
                out.reserve(needed.max(4));
            }
        }
    }
    out
}
