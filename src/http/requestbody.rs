//! Request body for POST/PUT/PATCH operations.

use crate::base::neterror::NetError;

/// Request body forms accepted by the engine.
///
/// The engine carries the body as text inside the JSON frame, so every form
/// encodes to a `String`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body (GET, HEAD, DELETE).
    #[default]
    Empty,
    /// Raw text, sent verbatim.
    Text(String),
    /// JSON document, sent with `application/json`.
    Json(serde_json::Value),
    /// URL-encoded form fields, sent with `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Text(s)
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Text(s.to_owned())
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(v: serde_json::Value) -> Self {
        RequestBody::Json(v)
    }
}

impl RequestBody {
    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// Content type implied by the body form, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Empty | RequestBody::Text(_) => None,
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::Form(_) => Some("application/x-www-form-urlencoded"),
        }
    }

    /// Encode to the text carried on the wire. `None` for an empty body.
    pub fn encode(&self) -> Result<Option<String>, NetError> {
        match self {
            RequestBody::Empty => Ok(None),
            RequestBody::Text(s) => Ok(Some(s.clone())),
            RequestBody::Json(v) => serde_json::to_string(v)
                .map(Some)
                .map_err(|_| NetError::JsonParseError),
            RequestBody::Form(fields) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                Ok(Some(encoded))
            }
        }
    }
}
