// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Potluck realtime: credentials, authenticated REST and the live socket.

pub mod config;
pub mod connection;
pub mod credential;
pub mod error;
pub mod http;
pub mod network;
pub mod rooms;
pub mod router;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use futures_util::stream::{SelectAll, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionOptions};
use crate::credential::login::AuthClient;
use crate::credential::persist::{FileStore, KeyValueStore};
use crate::credential::refresh::TokenRefresher;
use crate::credential::{TokenPair, TokenStore};
use crate::error::{ApiError, AuthError};
use crate::http::{build_http_client, ApiRequest, AuthenticatedExecutor};
use crate::network::NetworkMonitor;
use crate::rooms::RoomRegistry;
use crate::router::EventRouter;
use crate::transport::ws::WsTransport;
use crate::transport::Transport;

/// One explicitly constructed client session. Nothing here is global;
/// build one per app session (or per test) and pass it around.
pub struct Client {
    config: ClientConfig,
    tokens: TokenStore,
    network: NetworkMonitor,
    refresher: TokenRefresher,
    auth: AuthClient,
    executor: AuthenticatedExecutor,
    connection: ConnectionManager,
}

impl Client {
    /// Client over the WebSocket transport. Must be called inside a Tokio runtime.
    pub fn new(
        config: ClientConfig,
        store: impl KeyValueStore + 'static,
        network: NetworkMonitor,
    ) -> Self {
        Self::with_transport(config, store, network, Arc::new(WsTransport::new()))
    }

    pub fn with_transport(
        config: ClientConfig,
        store: impl KeyValueStore + 'static,
        network: NetworkMonitor,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let http = build_http_client(config.request_timeout());
        let tokens = TokenStore::new(store);
        let refresher =
            TokenRefresher::new(http.clone(), config.refresh_url(), tokens.clone(), network.clone());
        let auth = AuthClient::new(http.clone(), config.login_url(), tokens.clone(), network.clone());
        let executor = AuthenticatedExecutor::new(
            http,
            config.base(),
            tokens.clone(),
            refresher.clone(),
            network.clone(),
        );
        let connection = ConnectionManager::new(
            ConnectionOptions::from_config(&config),
            transport,
            tokens.clone(),
            network.clone(),
            EventRouter::new(),
            RoomRegistry::new(),
        );
        Self { config, tokens, network, refresher, auth, executor, connection }
    }

    /// Exchange an identity-provider token for an API session.
    pub async fn login(&self, idp_token: &str) -> Result<TokenPair, AuthError> {
        self.auth.login(idp_token).await
    }

    /// Full sign-out: forget rooms, clear credentials, close the socket.
    pub fn logout(&self) {
        self.connection.rooms().clear();
        self.tokens.clear();
        self.connection.disconnect();
    }

    pub fn is_signed_in(&self) -> bool {
        self.tokens.get().is_some()
    }

    /// Authenticated REST call; see [`AuthenticatedExecutor::execute`].
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        self.executor.execute(request).await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    pub fn executor(&self) -> &AuthenticatedExecutor {
        &self.executor
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

/// What the diagnostic binary should do once connected.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub idp_token: Option<String>,
    pub rooms: Vec<String>,
    pub events: Vec<String>,
}

/// Connect, join rooms and print subscribed frames as JSON lines until Ctrl-C.
pub async fn run(config: ClientConfig, opts: RunOptions) -> anyhow::Result<()> {
    let store = FileStore::in_dir(&config.resolved_state_dir(), "potluck");
    tracing::debug!(path = %store.path().display(), "credential store");
    let client = Client::new(config, store, NetworkMonitor::default());

    if let Some(ref idp_token) = opts.idp_token {
        client.login(idp_token).await?;
    }
    if client.tokens().try_get()?.is_none() {
        anyhow::bail!("no stored session; pass --idp-token to sign in");
    }

    let conn = client.connection();
    let mut frames = SelectAll::new();
    for event in &opts.events {
        frames.push(conn.router().subscribe(event.as_str()));
    }
    conn.connect().await?;
    for room in &opts.rooms {
        conn.join_room(room, Value::Null);
    }

    let mut state = conn.watch_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                match conn.last_error() {
                    Some(err) => tracing::info!(state = %current, last_error = %err, "connection"),
                    None => tracing::info!(state = %current, "connection"),
                }
            }
            Some(frame) = frames.next(), if !frames.is_empty() => {
                let line = serde_json::json!({ "event": frame.event, "data": frame.data });
                println!("{line}");
            }
        }
    }

    conn.disconnect();
    Ok(())
}
