// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight access token refresh.
//!
//! Concurrent callers share one in-flight refresh. The refresh runs on its
//! own task, so a caller that gives up does not cancel it for the others.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::credential::{ClearReason, TokenPair, TokenResponse, TokenStore};
use crate::error::AuthError;
use crate::network::NetworkMonitor;

type InFlight = Shared<BoxFuture<'static, Result<TokenPair, AuthError>>>;

/// Refreshes the stored access token via `POST /auth/refresh`.
#[derive(Clone)]
pub struct TokenRefresher {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    refresh_url: String,
    tokens: TokenStore,
    network: NetworkMonitor,
    in_flight: Mutex<Option<InFlight>>,
}

enum Start {
    Join(InFlight),
    Ready(Result<TokenPair, AuthError>),
}

impl TokenRefresher {
    pub fn new(
        http: reqwest::Client,
        refresh_url: impl Into<String>,
        tokens: TokenStore,
        network: NetworkMonitor,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                refresh_url: refresh_url.into(),
                tokens,
                network,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Refresh the access token, joining a refresh already in flight.
    pub async fn refresh(&self) -> Result<TokenPair, AuthError> {
        match self.start(None) {
            Start::Join(fut) => fut.await,
            Start::Ready(result) => result,
        }
    }

    /// Refresh after `failed_access_token` was rejected.
    ///
    /// If the store already holds a different access token, a refresh for
    /// the failed one has completed and its result is returned directly.
    pub async fn refresh_stale(&self, failed_access_token: &str) -> Result<TokenPair, AuthError> {
        match self.start(Some(failed_access_token)) {
            Start::Join(fut) => fut.await,
            Start::Ready(result) => result,
        }
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    fn start(&self, stale: Option<&str>) -> Start {
        let mut slot = self.inner.in_flight.lock();
        if let Some(fut) = slot.as_ref() {
            return Start::Join(fut.clone());
        }

        let (pair, epoch) = match self.inner.tokens.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => return Start::Ready(Err(AuthError::Storage(e.to_string()))),
        };
        if let (Some(stale), Some(pair)) = (stale, pair.as_ref()) {
            if pair.access_token != stale {
                tracing::debug!("access token already refreshed, reusing it");
                return Start::Ready(Ok(pair.clone()));
            }
        }
        let Some(refresh_token) = pair.map(|p| p.refresh_token).filter(|t| !t.is_empty()) else {
            return Start::Ready(Err(AuthError::NoRefreshToken));
        };
        if !self.inner.network.is_reachable() {
            return Start::Ready(Err(AuthError::NetworkUnavailable));
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let result = inner.run(&refresh_token, epoch).await;
            *inner.in_flight.lock() = None;
            result
        });
        let fut = async move { handle.await.unwrap_or(Err(AuthError::Aborted)) }.boxed().shared();
        *slot = Some(fut.clone());
        Start::Join(fut)
    }
}

impl Inner {
    async fn run(&self, refresh_token: &str, epoch: u64) -> Result<TokenPair, AuthError> {
        tracing::debug!(url = %self.refresh_url, "refreshing access token");
        let pair = match do_refresh(&self.http, &self.refresh_url, refresh_token).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(err = %e, "token refresh failed, clearing credentials");
                self.tokens.clear_if_epoch(epoch, ClearReason::RefreshFailed);
                return Err(e);
            }
        };

        match self.tokens.set_if_epoch(&pair, epoch) {
            Ok(true) => {
                tracing::info!("access token refreshed");
                Ok(pair)
            }
            Ok(false) => {
                tracing::warn!("credentials changed during refresh, discarding result");
                Err(AuthError::Superseded)
            }
            Err(e) => {
                tracing::warn!(err = %e, "failed to store refreshed credentials");
                self.tokens.clear_if_epoch(epoch, ClearReason::RefreshFailed);
                Err(AuthError::Storage(e.to_string()))
            }
        }
    }
}

/// Perform a single refresh request.
pub async fn do_refresh(
    client: &reqwest::Client,
    refresh_url: &str,
    refresh_token: &str,
) -> Result<TokenPair, AuthError> {
    let resp = client
        .post(refresh_url)
        .json(&serde_json::json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .map_err(|e| AuthError::Transport(Arc::new(e)))?;
    read_token_response(resp).await
}

/// Decode a login/refresh response into a [`TokenPair`].
pub(crate) async fn read_token_response(resp: reqwest::Response) -> Result<TokenPair, AuthError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::Rejected { status: status.as_u16(), body });
    }

    let bytes = resp.bytes().await.map_err(|e| AuthError::Transport(Arc::new(e)))?;
    let token: TokenResponse =
        serde_json::from_slice(&bytes).map_err(|e| AuthError::Decoding(Arc::new(e)))?;
    Ok(token.into())
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
