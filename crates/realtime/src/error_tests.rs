// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    network = { ErrorCode::NetworkUnavailable, "NETWORK_UNAVAILABLE", true },
    auth = { ErrorCode::AuthenticationRequired, "AUTHENTICATION_REQUIRED", false },
    invalid_url = { ErrorCode::InvalidUrl, "INVALID_URL", true },
    bad_request = { ErrorCode::BadRequest, "BAD_REQUEST", false },
    server = { ErrorCode::ServerError, "SERVER_ERROR", false },
    timeout = { ErrorCode::Timeout, "TIMEOUT", false },
    max_reconnect = { ErrorCode::MaxReconnectAttemptsExceeded, "MAX_RECONNECT_ATTEMPTS_EXCEEDED", false },
    decoding = { ErrorCode::DecodingError, "DECODING_ERROR", false },
    not_connected = { ErrorCode::NotConnected, "NOT_CONNECTED", true },
)]
fn code_strings(code: ErrorCode, expected: &str, local: bool) {
    assert_eq!(code.as_str(), expected);
    assert_eq!(code.to_string(), expected);
    assert_eq!(code.is_local(), local);
}

#[test]
fn refresh_failure_becomes_authentication_required() {
    let err = ApiError::from(AuthError::Rejected { status: 401, body: String::new() });
    assert_eq!(err.code(), ErrorCode::AuthenticationRequired);
    let source = std::error::Error::source(&err).map(ToString::to_string);
    assert_eq!(source.as_deref(), Some("auth server rejected the request (401): "));
}

#[test]
fn refresh_without_network_stays_network_unavailable() {
    let err = ApiError::from(AuthError::NetworkUnavailable);
    assert_eq!(err.code(), ErrorCode::NetworkUnavailable);
}

#[test]
fn decoding_error_keeps_cause() -> anyhow::Result<()> {
    let Err(cause) = serde_json::from_str::<u32>("\"nope\"") else {
        anyhow::bail!("expected a decode failure");
    };
    let err = ApiError::Decoding(cause);
    assert_eq!(err.code(), ErrorCode::DecodingError);
    assert!(std::error::Error::source(&err).is_some());
    Ok(())
}

#[test]
fn describe_prefixes_code() {
    let err = ConnectionError::MaxReconnectAttemptsExceeded { attempts: 3 };
    assert_eq!(
        describe(err.code(), &err),
        "MAX_RECONNECT_ATTEMPTS_EXCEEDED: gave up after 3 reconnect attempts"
    );
}

#[test]
fn transport_timeout_maps_to_timeout() {
    let err = ConnectionError::from(TransportError::Timeout);
    assert_eq!(err.code(), ErrorCode::Timeout);
}
