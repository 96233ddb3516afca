use crate::base::neterror::NetError;

#[test]
fn test_net_error_roundtrip() {
    // Transport error in the connection range
    let original = NetError::TransportClosed;
    let code = original.as_i32();
    assert_eq!(code, -100);
    let converted = NetError::from(code);
    assert!(matches!(converted, NetError::TransportClosed));

    // Bridge-specific error
    let custom = NetError::UnknownCorrelation;
    let custom_code = custom.as_i32();
    assert_eq!(custom_code, -1000);
    let custom_converted = NetError::from(custom_code);
    assert!(matches!(custom_converted, NetError::UnknownCorrelation));
}

#[test]
fn test_every_code_roundtrips() {
    let all = [
        NetError::TransportClosed,
        NetError::ConnectionFailed,
        NetError::HostResolutionFailure,
        NetError::ConnectionTimedOut,
        NetError::AddressInUse,
        NetError::InvalidUrl,
        NetError::MalformedFrame,
        NetError::InvalidHeader,
        NetError::UnknownCorrelation,
        NetError::DuplicateCorrelation,
        NetError::ConflictingBody,
        NetError::EngineUnavailable,
        NetError::JsonParseError,
        NetError::EncodingNotSupported,
        NetError::InvalidUtf8,
    ];
    for err in all {
        assert_eq!(NetError::from(err.as_i32()), err);
    }
}

#[test]
fn test_unknown_error() {
    let err = NetError::from(-9999);
    assert!(matches!(err, NetError::Unknown(-9999)));
}

#[test]
fn test_collision_avoidance() {
    // Bridge codes stay clear of Chromium's Blob range (-900 to -906)
    let blob_range = -906..=-900;

    for err in [
        NetError::UnknownCorrelation,
        NetError::DuplicateCorrelation,
        NetError::ConflictingBody,
        NetError::EngineUnavailable,
    ] {
        assert!(!blob_range.contains(&err.as_i32()));
    }
}

#[test]
fn test_fatal_classification() {
    assert!(NetError::TransportClosed.is_fatal());
    assert!(NetError::HostResolutionFailure.is_fatal());
    assert!(NetError::EngineUnavailable.is_fatal());
    assert!(!NetError::MalformedFrame.is_fatal());
    assert!(!NetError::UnknownCorrelation.is_fatal());
    assert!(!NetError::ConflictingBody.is_fatal());
}
