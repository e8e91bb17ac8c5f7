// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential storage, login, and single-flight token refresh.
//!
//! [`TokenStore`] is the only owner of the access/refresh pair. Everything
//! else reads it per request or per handshake and never keeps a copy.

pub mod login;
pub mod persist;
pub mod refresh;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::credential::persist::KeyValueStore;

/// Fixed key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Fixed key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// An access/refresh token pair. Both values are opaque.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: refresh_token.into() }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Body returned by `/auth/login` and `/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl From<TokenResponse> for TokenPair {
    fn from(resp: TokenResponse) -> Self {
        Self { access_token: resp.token, refresh_token: resp.refresh_token }
    }
}

/// Why the token store was cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    /// Explicit sign-out by the user.
    SignOut,
    /// The refresh endpoint failed or rejected the refresh token.
    RefreshFailed,
    /// The realtime server sent `auth_error`.
    ServerRejected,
}

/// Thread-safe owner of the persisted token pair.
///
/// Every write advances an epoch; `*_if_epoch` variants only apply when no
/// other write happened since the epoch was observed.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    backend: Box<dyn KeyValueStore>,
    /// Guards the backend and holds the write epoch.
    epoch: Mutex<u64>,
    cleared_tx: broadcast::Sender<ClearReason>,
}

impl TokenStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        let (cleared_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(StoreInner {
                backend: Box::new(backend),
                epoch: Mutex::new(0),
                cleared_tx,
            }),
        }
    }

    /// Current pair, if both halves are stored.
    ///
    /// An unreadable backend is logged and reads as signed out. Paths that
    /// must report it use [`TokenStore::try_get`].
    pub fn get(&self) -> Option<TokenPair> {
        self.try_get().unwrap_or_else(|e| {
            tracing::warn!(err = %e, "failed to read credentials");
            None
        })
    }

    /// Current pair, or the backend's read failure.
    pub fn try_get(&self) -> anyhow::Result<Option<TokenPair>> {
        let _guard = self.inner.epoch.lock();
        self.read_pair()
    }

    /// Current pair together with the epoch it was read at.
    pub fn snapshot(&self) -> anyhow::Result<(Option<TokenPair>, u64)> {
        let guard = self.inner.epoch.lock();
        Ok((self.read_pair()?, *guard))
    }

    pub fn epoch(&self) -> u64 {
        *self.inner.epoch.lock()
    }

    /// Atomically replace the stored pair.
    pub fn set(&self, pair: &TokenPair) -> anyhow::Result<()> {
        let mut epoch = self.inner.epoch.lock();
        self.write_pair(pair)?;
        *epoch += 1;
        Ok(())
    }

    /// Replace the pair only if nothing was written since `expected`.
    ///
    /// Returns `Ok(false)` when the store moved on in the meantime.
    pub fn set_if_epoch(&self, pair: &TokenPair, expected: u64) -> anyhow::Result<bool> {
        let mut epoch = self.inner.epoch.lock();
        if *epoch != expected {
            return Ok(false);
        }
        self.write_pair(pair)?;
        *epoch += 1;
        Ok(true)
    }

    /// Clear both tokens as an explicit sign-out.
    pub fn clear(&self) -> bool {
        self.clear_with(ClearReason::SignOut)
    }

    /// Clear both tokens. Notifies subscribers only when a pair was stored.
    ///
    /// Returns whether anything was cleared.
    pub fn clear_with(&self, reason: ClearReason) -> bool {
        let had_value = {
            let mut epoch = self.inner.epoch.lock();
            // Unreadable contents still count as stored.
            let had_value = self.read_pair().map_or(true, |pair| pair.is_some());
            self.remove_pair();
            *epoch += 1;
            had_value
        };
        if had_value {
            tracing::info!(?reason, "credentials cleared");
            let _ = self.inner.cleared_tx.send(reason);
        }
        had_value
    }

    /// Clear only if nothing was written since `expected`.
    pub fn clear_if_epoch(&self, expected: u64, reason: ClearReason) -> bool {
        let had_value = {
            let mut epoch = self.inner.epoch.lock();
            if *epoch != expected {
                return false;
            }
            // Unreadable contents still count as stored.
            let had_value = self.read_pair().map_or(true, |pair| pair.is_some());
            self.remove_pair();
            *epoch += 1;
            had_value
        };
        if had_value {
            tracing::info!(?reason, "credentials cleared");
            let _ = self.inner.cleared_tx.send(reason);
        }
        had_value
    }

    /// Subscribe to clear notifications.
    pub fn subscribe_cleared(&self) -> broadcast::Receiver<ClearReason> {
        self.inner.cleared_tx.subscribe()
    }

    fn read_pair(&self) -> anyhow::Result<Option<TokenPair>> {
        let read = |key: &str| -> anyhow::Result<Option<String>> {
            Ok(self.inner.backend.get(key)?.filter(|v| !v.is_empty()))
        };
        let (Some(access_token), Some(refresh_token)) = (read(ACCESS_TOKEN_KEY)?, read(REFRESH_TOKEN_KEY)?)
        else {
            return Ok(None);
        };
        Ok(Some(TokenPair { access_token, refresh_token }))
    }

    fn write_pair(&self, pair: &TokenPair) -> anyhow::Result<()> {
        self.inner.backend.set_many(&[
            (ACCESS_TOKEN_KEY, &pair.access_token),
            (REFRESH_TOKEN_KEY, &pair.refresh_token),
        ])
    }

    fn remove_pair(&self) {
        if let Err(e) = self.inner.backend.remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]) {
            tracing::warn!(err = %e, "failed to remove persisted credentials");
        }
    }
}

/// Resolve the state directory for persisted credentials.
///
/// Checks `POTLUCK_STATE_DIR`, then `$XDG_STATE_HOME/potluck`,
/// then `$HOME/.local/state/potluck`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("POTLUCK_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("potluck");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/potluck");
    }
    PathBuf::from(".potluck")
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
