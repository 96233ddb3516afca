use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Transport Errors
    #[error("Transport to engine closed")]
    TransportClosed,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Host resolution failed")]
    HostResolutionFailure,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Address in use")]
    AddressInUse,

    // Protocol Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Malformed frame")]
    MalformedFrame,
    #[error("Invalid header")]
    InvalidHeader,

    // Bridge Errors
    #[error("Unknown correlation token")]
    UnknownCorrelation,
    #[error("Duplicate correlation token")]
    DuplicateCorrelation,
    #[error("Conflicting request body forms")]
    ConflictingBody,
    #[error("Request engine unavailable")]
    EngineUnavailable,

    // Body Errors
    #[error("JSON parse error")]
    JsonParseError,
    #[error("Encoding not supported")]
    EncodingNotSupported,
    #[error("Invalid UTF-8")]
    InvalidUtf8,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::TransportClosed => -100,
            NetError::ConnectionFailed => -104,
            NetError::HostResolutionFailure => -105,
            NetError::ConnectionTimedOut => -118,
            NetError::AddressInUse => -147,

            NetError::InvalidUrl => -300,
            NetError::MalformedFrame => -320,
            NetError::InvalidHeader => -325,

            // Bridge errors (custom codes starting at -1000)
            NetError::UnknownCorrelation => -1000,
            NetError::DuplicateCorrelation => -1001,
            NetError::ConflictingBody => -1002,
            NetError::EngineUnavailable => -1003,
            NetError::JsonParseError => -1004,
            NetError::EncodingNotSupported => -1005,
            NetError::InvalidUtf8 => -1006,
            NetError::Unknown(code) => *code,
        }
    }

    /// Whether this error ends the bridge rather than a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NetError::TransportClosed
                | NetError::HostResolutionFailure
                | NetError::EngineUnavailable
        )
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -100 => NetError::TransportClosed,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::HostResolutionFailure,
            -118 => NetError::ConnectionTimedOut,
            -147 => NetError::AddressInUse,

            -300 => NetError::InvalidUrl,
            -320 => NetError::MalformedFrame,
            -325 => NetError::InvalidHeader,

            -1000 => NetError::UnknownCorrelation,
            -1001 => NetError::DuplicateCorrelation,
            -1002 => NetError::ConflictingBody,
            -1003 => NetError::EngineUnavailable,
            -1004 => NetError::JsonParseError,
            -1005 => NetError::EncodingNotSupported,
            -1006 => NetError::InvalidUtf8,
            _ => NetError::Unknown(code),
        }
    }
}
