// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Machine-readable error kinds shared by the REST and socket paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NetworkUnavailable,
    AuthenticationRequired,
    InvalidUrl,
    BadRequest,
    ServerError,
    Timeout,
    MaxReconnectAttemptsExceeded,
    DecodingError,
    NotConnected,
    Transport,
    Storage,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable => "NETWORK_UNAVAILABLE",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::InvalidUrl => "INVALID_URL",
            Self::BadRequest => "BAD_REQUEST",
            Self::ServerError => "SERVER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::MaxReconnectAttemptsExceeded => "MAX_RECONNECT_ATTEMPTS_EXCEEDED",
            Self::DecodingError => "DECODING_ERROR",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Transport => "TRANSPORT",
            Self::Storage => "STORAGE",
        }
    }

    /// Local errors are raised before any network attempt and are never retried.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable | Self::InvalidUrl | Self::NotConnected | Self::Storage
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from [`crate::http::AuthenticatedExecutor`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("authentication required")]
    AuthenticationRequired {
        #[source]
        cause: Option<AuthError>,
    },
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("bad request ({status}): {body}")]
    BadRequest { status: u16, body: String },
    #[error("server error ({status}): {body}")]
    ServerError { status: u16, body: String },
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decoding(#[source] serde_json::Error),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("credential storage failed: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NetworkUnavailable => ErrorCode::NetworkUnavailable,
            Self::AuthenticationRequired { .. } => ErrorCode::AuthenticationRequired,
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::BadRequest { .. } => ErrorCode::BadRequest,
            Self::ServerError { .. } => ErrorCode::ServerError,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Decoding(_) => ErrorCode::DecodingError,
            Self::Transport(_) => ErrorCode::Transport,
            Self::Storage(_) => ErrorCode::Storage,
        }
    }

    /// Classify a `reqwest` send error, keeping it as the source.
    pub fn from_send(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Transport(err)
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NetworkUnavailable => Self::NetworkUnavailable,
            other => Self::AuthenticationRequired { cause: Some(other) },
        }
    }
}

/// Errors from login and token refresh.
///
/// `Clone` so a single refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("no refresh token stored")]
    NoRefreshToken,
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("auth server rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("auth request failed: {0}")]
    Transport(#[source] Arc<reqwest::Error>),
    #[error("failed to decode auth response: {0}")]
    Decoding(#[source] Arc<serde_json::Error>),
    #[error("credential storage failed: {0}")]
    Storage(String),
    #[error("credentials changed while the request was in flight")]
    Superseded,
    #[error("refresh task ended without a result")]
    Aborted,
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoRefreshToken | Self::Rejected { .. } | Self::Superseded | Self::Aborted => {
                ErrorCode::AuthenticationRequired
            }
            Self::NetworkUnavailable => ErrorCode::NetworkUnavailable,
            Self::Transport(e) if e.is_timeout() => ErrorCode::Timeout,
            Self::Transport(_) => ErrorCode::Transport,
            Self::Decoding(_) => ErrorCode::DecodingError,
            Self::Storage(_) => ErrorCode::Storage,
        }
    }
}

/// Errors surfaced by a [`crate::transport::Transport`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport connect failed: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("transport connect timed out")]
    Timeout,
}

/// Errors from [`crate::connection::ConnectionManager`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("timed out")]
    Timeout,
    #[error("gave up after {attempts} reconnect attempts")]
    MaxReconnectAttemptsExceeded { attempts: u32 },
    #[error("not connected")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("credential storage failed: {0}")]
    Storage(String),
    /// Outcome of an attempt another `connect()` call started and this one joined.
    #[error("{message}")]
    Joined { code: ErrorCode, message: String },
}

impl ConnectionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NetworkUnavailable => ErrorCode::NetworkUnavailable,
            Self::AuthenticationRequired => ErrorCode::AuthenticationRequired,
            Self::Timeout | Self::Transport(TransportError::Timeout) => ErrorCode::Timeout,
            Self::MaxReconnectAttemptsExceeded { .. } => ErrorCode::MaxReconnectAttemptsExceeded,
            Self::NotConnected => ErrorCode::NotConnected,
            Self::Transport(_) => ErrorCode::Transport,
            Self::Storage(_) => ErrorCode::Storage,
            Self::Joined { code, .. } => *code,
        }
    }
}

/// A frame payload did not match the shape a subscriber expected.
#[derive(Debug, thiserror::Error)]
#[error("payload of `{event}` did not decode: {source}")]
pub struct DecodeError {
    pub event: String,
    #[source]
    pub source: serde_json::Error,
}

impl DecodeError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::DecodingError
    }
}

/// Render an error as the single user-visible `last_error` string.
///
/// Keeps the kind prefix so the UI can still tell failures apart.
pub fn describe(code: ErrorCode, err: &dyn std::error::Error) -> String {
    format!("{code}: {err}")
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
