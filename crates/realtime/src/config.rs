// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for the realtime connectivity core.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the API server (e.g. `https://api.example.com`).
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "POTLUCK_BASE_URL")]
    pub base_url: String,

    /// Path of the realtime socket endpoint, relative to the base URL.
    #[arg(long, default_value = "/socket", env = "POTLUCK_WS_PATH")]
    pub ws_path: String,

    /// Reconnect attempts after an unsolicited disconnect before giving up.
    #[arg(long, default_value_t = 5, env = "POTLUCK_MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: u32,

    /// Base reconnect delay in milliseconds (doubled per attempt).
    #[arg(long, default_value_t = 1000, env = "POTLUCK_RECONNECT_BASE_MS")]
    pub reconnect_base_ms: u64,

    /// Ceiling for the reconnect delay in milliseconds.
    #[arg(long, default_value_t = 30000, env = "POTLUCK_RECONNECT_MAX_MS")]
    pub reconnect_max_ms: u64,

    /// Timeout for a single REST request in milliseconds.
    #[arg(long, default_value_t = 10000, env = "POTLUCK_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Default timeout for acknowledged emits in milliseconds.
    #[arg(long, default_value_t = 5000, env = "POTLUCK_ACK_TIMEOUT_MS")]
    pub ack_timeout_ms: u64,

    /// Timeout for opening the realtime transport in milliseconds.
    #[arg(long, default_value_t = 10000, env = "POTLUCK_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,

    /// Directory for persisted credentials. Defaults to the XDG state dir.
    #[arg(long, env = "POTLUCK_STATE_DIR")]
    pub state_dir: Option<std::path::PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_owned(),
            ws_path: "/socket".to_owned(),
            max_reconnect_attempts: 5,
            reconnect_base_ms: 1000,
            reconnect_max_ms: 30000,
            request_timeout_ms: 10000,
            ack_timeout_ms: 5000,
            connect_timeout_ms: 10000,
            state_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `POST /auth/login` endpoint.
    pub fn login_url(&self) -> String {
        format!("{}/auth/login", self.base())
    }

    /// `POST /auth/refresh` endpoint.
    pub fn refresh_url(&self) -> String {
        format!("{}/auth/refresh", self.base())
    }

    /// Realtime socket URL, with the scheme switched to `ws`/`wss`.
    pub fn ws_url(&self) -> String {
        crate::transport::ws::build_ws_url(self.base(), &self.ws_path)
    }

    /// Resolve the credential directory, falling back to [`crate::credential::state_dir`].
    pub fn resolved_state_dir(&self) -> std::path::PathBuf {
        self.state_dir.clone().unwrap_or_else(crate::credential::state_dir)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
