// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exchange an identity-provider token for an API token pair.

use std::sync::Arc;

use crate::credential::refresh::read_token_response;
use crate::credential::{TokenPair, TokenStore};
use crate::error::AuthError;
use crate::network::NetworkMonitor;

/// Client for `POST /auth/login`.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    login_url: String,
    tokens: TokenStore,
    network: NetworkMonitor,
}

impl AuthClient {
    pub fn new(
        http: reqwest::Client,
        login_url: impl Into<String>,
        tokens: TokenStore,
        network: NetworkMonitor,
    ) -> Self {
        Self { http, login_url: login_url.into(), tokens, network }
    }

    /// Sign in with an identity-provider token and persist the returned pair.
    pub async fn login(&self, idp_token: &str) -> Result<TokenPair, AuthError> {
        if !self.network.is_reachable() {
            return Err(AuthError::NetworkUnavailable);
        }

        let resp = self
            .http
            .post(&self.login_url)
            .json(&serde_json::json!({ "token": idp_token }))
            .send()
            .await
            .map_err(|e| AuthError::Transport(Arc::new(e)))?;
        let pair = read_token_response(resp).await?;

        self.tokens.set(&pair).map_err(|e| AuthError::Storage(e.to_string()))?;
        tracing::info!("signed in");
        Ok(pair)
    }
}
