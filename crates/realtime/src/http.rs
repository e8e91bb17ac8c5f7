// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated REST calls with one refresh-and-retry on `401`.

use std::sync::Once;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::credential::refresh::TokenRefresher;
use crate::credential::TokenStore;
use crate::error::ApiError;
use crate::network::NetworkMonitor;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build the shared HTTP client with a per-request timeout.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    ensure_crypto();
    reqwest::Client::builder().timeout(timeout).build().unwrap_or_default()
}

/// A REST call that can be sent more than once.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Sends [`ApiRequest`]s with the stored bearer token.
///
/// A `401` triggers one token refresh and one resend of the original
/// request. Whatever the resend returns is final.
#[derive(Clone)]
pub struct AuthenticatedExecutor {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
    refresher: TokenRefresher,
    network: NetworkMonitor,
}

impl AuthenticatedExecutor {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: TokenStore,
        refresher: TokenRefresher,
        network: NetworkMonitor,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, tokens, refresher, network }
    }

    /// Execute `request` and decode the response body as `T`.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let url = self.url(&request.path)?;
        let Some(pair) = self.tokens.try_get().map_err(|e| ApiError::Storage(e.to_string()))? else {
            return Err(ApiError::AuthenticationRequired { cause: None });
        };
        if !self.network.is_reachable() {
            return Err(ApiError::NetworkUnavailable);
        }

        let resp = self.send(&url, request, &pair.access_token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return decode_response(resp).await;
        }

        tracing::debug!(path = %request.path, "request unauthorized, refreshing token");
        let fresh = self.refresher.refresh_stale(&pair.access_token).await?;
        let retry = self.send(&url, request, &fresh.access_token).await?;
        decode_response(retry).await
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, ApiError> {
        let raw = format!("{}{}", self.base_url, path);
        reqwest::Url::parse(&raw)
            .map_err(|e| ApiError::InvalidUrl { url: raw.clone(), reason: e.to_string() })
    }

    async fn send(
        &self,
        url: &reqwest::Url,
        request: &ApiRequest,
        access_token: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let mut req = self
            .http
            .request(request.method.clone(), url.clone())
            .bearer_auth(access_token);
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(ref body) = request.body {
            req = req.json(body);
        }
        req.send().await.map_err(ApiError::from_send)
    }
}

/// Map a response to `T` or the matching [`ApiError`].
async fn decode_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::AuthenticationRequired { cause: None });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let status = status.as_u16();
        return Err(if status >= 500 {
            ApiError::ServerError { status, body }
        } else {
            ApiError::BadRequest { status, body }
        });
    }

    let bytes = resp.bytes().await.map_err(ApiError::from_send)?;
    let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    serde_json::from_slice(bytes).map_err(ApiError::Decoding)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
