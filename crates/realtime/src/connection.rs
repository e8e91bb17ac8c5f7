// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The long-lived realtime connection and its reconnect state machine.
//!
//! ```text
//! Disconnected --connect()--> Connecting --opened--> Connected
//!      ^                          |                     |
//!      |<------ open failed ------+        unsolicited close, reachable
//!      |                                                v
//!      |<---- attempts exhausted / network lost --- Reconnecting
//! ```
//!
//! Clearing the token store from anywhere forces `Disconnected`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::credential::{ClearReason, TokenStore};
use crate::error::{describe, ConnectionError, ErrorCode, TransportError};
use crate::network::NetworkMonitor;
use crate::rooms::{join_frame, leave_frame, RoomRegistry};
use crate::router::EventRouter;
use crate::transport::frame::{Inbound, WireFrame, AUTHENTICATE};
use crate::transport::Transport;

/// Observable connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exponential backoff with a ceiling and a bounded attempt count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub ceiling: Duration,
}

impl ReconnectPolicy {
    /// `base * 2^attempt`, clamped to `ceiling`.
    pub fn delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.ceiling, |d| d.min(self.ceiling))
    }
}

/// Everything the manager needs from configuration.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub url: String,
    pub policy: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

impl ConnectionOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            url: config.ws_url(),
            policy: ReconnectPolicy {
                max_attempts: config.max_reconnect_attempts,
                base: config.reconnect_base(),
                ceiling: config.reconnect_max(),
            },
            connect_timeout: config.connect_timeout(),
            ack_timeout: config.ack_timeout(),
        }
    }
}

/// Who started a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    Network,
    /// Reconnect timer for the given session generation.
    Timer(u64),
}

struct Session {
    outbound: Option<mpsc::UnboundedSender<WireFrame>>,
    /// Owns the current link's I/O task, connect attempt or reconnect timer.
    cancel: CancellationToken,
    attempts: u32,
    /// Bumped whenever the current session is replaced; stale tasks compare it.
    generation: u64,
    /// Set by `connect()`, cleared by `disconnect()`, token clear or exhaustion.
    wants_connection: bool,
    /// Why the attempt of the given generation failed, for callers that joined it.
    failure: Option<(u64, ErrorCode, String)>,
}

/// What a `connect()` call does once it has looked at the session.
enum Attempt {
    Open(u64, CancellationToken),
    /// Another call is already opening the given generation.
    Join(u64, watch::Receiver<ConnectionState>),
}

struct Shared {
    opts: ConnectionOptions,
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    network: NetworkMonitor,
    router: EventRouter,
    rooms: RoomRegistry,
    state_tx: watch::Sender<ConnectionState>,
    error_tx: watch::Sender<Option<String>>,
    session: Mutex<Session>,
    pending_acks: Mutex<HashMap<u64, oneshot::Sender<Vec<Value>>>>,
    next_ack: AtomicU64,
    lifecycle: CancellationToken,
}

/// Owns the realtime connection. Dropping it stops every background task.
///
/// Must be created inside a Tokio runtime.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        opts: ConnectionOptions,
        transport: Arc<dyn Transport>,
        tokens: TokenStore,
        network: NetworkMonitor,
        router: EventRouter,
        rooms: RoomRegistry,
    ) -> Self {
        let lifecycle = CancellationToken::new();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (error_tx, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            opts,
            transport,
            tokens,
            network,
            router,
            rooms,
            state_tx,
            error_tx,
            session: Mutex::new(Session {
                outbound: None,
                cancel: lifecycle.child_token(),
                attempts: 0,
                generation: 0,
                wants_connection: false,
                failure: None,
            }),
            pending_acks: Mutex::new(HashMap::new()),
            next_ack: AtomicU64::new(1),
            lifecycle,
        });

        spawn_cleared_watcher(Arc::clone(&shared));
        spawn_network_watcher(Arc::clone(&shared));
        Self { shared }
    }

    /// Open the connection. A no-op when already connected; while another
    /// call is connecting, waits for that attempt and returns its outcome.
    ///
    /// A failure here is surfaced and not retried automatically.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.shared.connect(Origin::Caller).await
    }

    /// Close the connection and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.shared.shutdown("disconnect requested");
    }

    /// `disconnect()` then `connect()`, with a fresh attempt budget.
    pub async fn reconnect(&self) -> Result<(), ConnectionError> {
        self.disconnect();
        self.connect().await
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.error_tx.borrow().clone()
    }

    pub fn watch_last_error(&self) -> watch::Receiver<Option<String>> {
        self.shared.error_tx.subscribe()
    }

    /// Reconnect attempts scheduled since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.session.lock().attempts
    }

    pub fn router(&self) -> &EventRouter {
        &self.shared.router
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.shared.rooms
    }

    /// Fire-and-forget. Returns `false` if the frame was dropped because
    /// the connection is not up.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> bool {
        let session = self.shared.session.lock();
        match self.shared.live_outbound(&session) {
            Some(tx) => tx.send(WireFrame::event(event, args)).is_ok(),
            None => {
                tracing::debug!(event, "not connected, dropping frame");
                false
            }
        }
    }

    /// Emit and wait for the server's acknowledgment.
    ///
    /// `timeout` defaults to the configured ack timeout. A timeout does not
    /// tear the connection down.
    pub async fn emit_with_ack(
        &self,
        event: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Value>, ConnectionError> {
        let id = self.shared.next_ack.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let session = self.shared.session.lock();
            let Some(outbound) = self.shared.live_outbound(&session) else {
                return Err(ConnectionError::NotConnected);
            };
            self.shared.pending_acks.lock().insert(id, tx);
            if outbound.send(WireFrame::event(event, args).with_ack(id)).is_err() {
                self.shared.pending_acks.lock().remove(&id);
                return Err(ConnectionError::NotConnected);
            }
        }

        let wait = timeout.unwrap_or(self.shared.opts.ack_timeout);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(data)) => Ok(data),
            // Link closed before the reply arrived.
            Ok(Err(_)) => Err(ConnectionError::NotConnected),
            Err(_) => {
                self.shared.pending_acks.lock().remove(&id);
                tracing::debug!(event, ack = id, "ack timed out");
                Err(ConnectionError::Timeout)
            }
        }
    }

    /// Track a room and send its join frame if connected.
    ///
    /// Returns `false` for a room that is already tracked; no frame is sent.
    pub fn join_room(&self, room_id: &str, payload: Value) -> bool {
        let session = self.shared.session.lock();
        if !self.shared.rooms.join(room_id, payload.clone()) {
            tracing::debug!(room = room_id, "already joined");
            return false;
        }
        if let Some(tx) = self.shared.live_outbound(&session) {
            let _ = tx.send(join_frame(room_id, &payload));
        }
        true
    }

    /// Stop tracking a room and send its leave frame if connected.
    pub fn leave_room(&self, room_id: &str) -> bool {
        let session = self.shared.session.lock();
        if !self.shared.rooms.leave(room_id) {
            return false;
        }
        if let Some(tx) = self.shared.live_outbound(&session) {
            let _ = tx.send(leave_frame(room_id));
        }
        true
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.lifecycle.cancel();
    }
}

impl Shared {
    fn live_outbound<'a>(&self, session: &'a Session) -> Option<&'a mpsc::UnboundedSender<WireFrame>> {
        if *self.state_tx.borrow() == ConnectionState::Connected {
            session.outbound.as_ref()
        } else {
            None
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            tracing::debug!(state = %next, "connection state changed");
        }
    }

    fn set_error(&self, code: ErrorCode, err: &dyn std::error::Error) {
        self.error_tx.send_replace(Some(describe(code, err)));
    }

    fn fail(&self, err: ConnectionError) -> ConnectionError {
        self.set_error(err.code(), &err);
        err
    }

    /// Replace the current session. Returns the new generation and token.
    fn renew(&self, session: &mut Session) -> (u64, CancellationToken) {
        session.cancel.cancel();
        session.cancel = self.lifecycle.child_token();
        session.generation += 1;
        session.outbound = None;
        self.pending_acks.lock().clear();
        (session.generation, session.cancel.clone())
    }

    /// Tear down the link or timer and stay down until the next `connect()`.
    fn shutdown(&self, why: &'static str) {
        let mut session = self.session.lock();
        session.wants_connection = false;
        let was = *self.state_tx.borrow();
        self.renew(&mut session);
        self.set_state(ConnectionState::Disconnected);
        if was != ConnectionState::Disconnected {
            tracing::info!(reason = why, "disconnected");
        }
    }

    async fn connect(self: &Arc<Self>, origin: Origin) -> Result<(), ConnectionError> {
        let attempt = {
            let mut session = self.session.lock();
            if let Origin::Timer(expected) = origin {
                if session.generation != expected {
                    return Ok(());
                }
            }
            let current = *self.state_tx.borrow();
            match current {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting if matches!(origin, Origin::Timer(_)) => return Ok(()),
                ConnectionState::Connecting => {
                    Attempt::Join(session.generation, self.state_tx.subscribe())
                }
                ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                    self.begin(&mut session, origin)?
                }
            }
        };
        let (generation, cancel) = match attempt {
            Attempt::Open(generation, cancel) => (generation, cancel),
            Attempt::Join(generation, state) => return self.join(generation, state).await,
        };
        self.open(origin, generation, cancel).await
    }

    /// Check preconditions and move to `Connecting` under the session lock.
    fn begin(&self, session: &mut Session, origin: Origin) -> Result<Attempt, ConnectionError> {
        let precondition = match self.tokens.try_get() {
            Err(e) => Some(ConnectionError::Storage(e.to_string())),
            Ok(None) => Some(ConnectionError::AuthenticationRequired),
            Ok(Some(_)) if !self.network.is_reachable() => Some(ConnectionError::NetworkUnavailable),
            Ok(Some(_)) => None,
        };
        if let Some(err) = precondition {
            if matches!(origin, Origin::Timer(_)) {
                self.renew(session);
                self.set_state(ConnectionState::Disconnected);
            }
            return Err(self.fail(err));
        }

        session.wants_connection = true;
        // Timer attempts keep counting; every other origin starts over.
        if !matches!(origin, Origin::Timer(_)) {
            session.attempts = 0;
        }
        let (generation, cancel) = self.renew(session);
        self.set_state(ConnectionState::Connecting);
        Ok(Attempt::Open(generation, cancel))
    }

    /// Wait for the attempt of `generation` to settle and report its outcome.
    async fn join(
        &self,
        generation: u64,
        mut state: watch::Receiver<ConnectionState>,
    ) -> Result<(), ConnectionError> {
        let settled = state
            .wait_for(|s| *s != ConnectionState::Connecting)
            .await
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected);
        if settled == ConnectionState::Connected {
            return Ok(());
        }
        match self.session.lock().failure.clone() {
            Some((failed, code, message)) if failed == generation => {
                Err(ConnectionError::Joined { code, message })
            }
            // Aborted by disconnect() or a token clear.
            _ => Err(ConnectionError::NotConnected),
        }
    }

    /// Open the link for a session already in `Connecting`.
    async fn open(
        self: &Arc<Self>,
        origin: Origin,
        generation: u64,
        cancel: CancellationToken,
    ) -> Result<(), ConnectionError> {
        tracing::debug!(url = %self.opts.url, ?origin, "opening connection");
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectionError::NotConnected),
            r = tokio::time::timeout(self.opts.connect_timeout, self.transport.open(&self.opts.url)) => {
                r.unwrap_or(Err(TransportError::Timeout))
            }
        };

        let mut session = self.session.lock();
        if session.generation != generation || cancel.is_cancelled() {
            // Superseded by disconnect() or a newer attempt while opening.
            return Err(ConnectionError::NotConnected);
        }

        let link = match opened {
            Ok(link) => link,
            Err(e) => {
                let err = ConnectionError::from(e);
                tracing::warn!(err = %err, ?origin, "connect failed");
                self.set_error(err.code(), &err);
                session.failure = Some((generation, err.code(), err.to_string()));
                let timer = matches!(origin, Origin::Timer(_));
                if timer && self.network.is_reachable() {
                    self.schedule_reconnect(&mut session);
                } else {
                    // Caller-initiated attempts are never retried behind the caller's back.
                    if !timer {
                        session.wants_connection = false;
                    }
                    self.renew(&mut session);
                    self.set_state(ConnectionState::Disconnected);
                }
                return Err(err);
            }
        };

        // Tokens may have been cleared while the link was opening.
        let pair = match self.tokens.try_get() {
            Ok(Some(pair)) => Ok(pair),
            Ok(None) => Err(ConnectionError::AuthenticationRequired),
            Err(e) => Err(ConnectionError::Storage(e.to_string())),
        };
        let pair = match pair {
            Ok(pair) => pair,
            Err(err) => {
                session.wants_connection = false;
                session.failure = Some((generation, err.code(), err.to_string()));
                self.renew(&mut session);
                self.set_state(ConnectionState::Disconnected);
                return Err(self.fail(err));
            }
        };

        let reply_tx = link.outbound.clone();
        let _ = link
            .outbound
            .send(WireFrame::event(AUTHENTICATE, vec![serde_json::json!({ "token": pair.access_token })]));
        let rejoin = self.rooms.rejoin_all();
        let rooms = rejoin.len();
        for frame in rejoin {
            let _ = link.outbound.send(frame);
        }

        session.outbound = Some(link.outbound);
        session.attempts = 0;
        self.set_state(ConnectionState::Connected);
        self.error_tx.send_replace(None);
        tracing::info!(url = %self.opts.url, rooms, "connected");

        let this = Arc::clone(self);
        tokio::spawn(this.run_link(link.inbound, reply_tx, cancel, generation));
        Ok(())
    }

    /// Pump inbound frames until the link closes or the session is replaced.
    async fn run_link(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<WireFrame>,
        reply_tx: mpsc::UnboundedSender<WireFrame>,
        cancel: CancellationToken,
        generation: u64,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                frame = inbound.recv() => match frame {
                    Some(wire) => self.handle_inbound(wire, &reply_tx),
                    None => break,
                },
            }
        }
        drop(reply_tx);
        self.on_link_closed(generation);
    }

    fn handle_inbound(&self, wire: WireFrame, reply_tx: &mpsc::UnboundedSender<WireFrame>) {
        match Inbound::classify(wire, reply_tx) {
            None => tracing::debug!("ignoring frame with neither event nor ack"),
            Some(Inbound::AckReply { id, data }) => match self.pending_acks.lock().remove(&id) {
                Some(tx) => {
                    let _ = tx.send(data);
                }
                None => tracing::debug!(ack = id, "ack reply with no waiter"),
            },
            Some(Inbound::AuthSuccess(frame)) => {
                tracing::info!("socket authenticated");
                self.router.dispatch(frame);
            }
            Some(Inbound::AuthError { message, frame }) => {
                tracing::warn!(message = %message, "server rejected socket authentication");
                self.router.dispatch(frame);
                self.error_tx.send_replace(Some(format!(
                    "{}: {message}",
                    ErrorCode::AuthenticationRequired
                )));
                self.tokens.clear_with(ClearReason::ServerRejected);
                // The clear watcher also disconnects; doing it here covers an already-empty store.
                self.shutdown("authentication rejected");
            }
            Some(Inbound::Event(frame)) => {
                tracing::debug!(event = %frame.event, "frame received");
                self.router.dispatch(frame);
            }
        }
    }

    /// The remote side closed or the link failed.
    fn on_link_closed(self: &Arc<Self>, generation: u64) {
        let mut session = self.session.lock();
        if session.generation != generation {
            return;
        }
        session.outbound = None;
        self.pending_acks.lock().clear();

        if session.wants_connection && self.network.is_reachable() {
            tracing::info!("connection lost, reconnecting");
            self.schedule_reconnect(&mut session);
        } else {
            tracing::info!("connection lost while offline");
            self.renew(&mut session);
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Arm the single reconnect timer, or give up once the budget is spent.
    fn schedule_reconnect(self: &Arc<Self>, session: &mut Session) {
        let max = self.opts.policy.max_attempts;
        if session.attempts >= max {
            session.wants_connection = false;
            self.renew(session);
            self.set_state(ConnectionState::Disconnected);
            let err = ConnectionError::MaxReconnectAttemptsExceeded { attempts: session.attempts };
            tracing::warn!(attempts = session.attempts, "reconnect attempts exhausted");
            self.set_error(err.code(), &err);
            return;
        }

        let delay = self.opts.policy.delay(session.attempts);
        session.attempts += 1;
        // Renewing cancels any timer still pending.
        let (generation, cancel) = self.renew(session);
        self.set_state(ConnectionState::Reconnecting);
        tracing::info!(attempt = session.attempts, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Err(e) = this.connect(Origin::Timer(generation)).await {
                tracing::debug!(err = %e, "reconnect attempt failed");
            }
        });
    }

    fn on_network_lost(&self) {
        let mut session = self.session.lock();
        if *self.state_tx.borrow() == ConnectionState::Reconnecting {
            tracing::info!("network lost, cancelling reconnect");
            self.renew(&mut session);
            self.set_state(ConnectionState::Disconnected);
        }
    }

    async fn on_network_restored(self: &Arc<Self>) {
        let resume = {
            let session = self.session.lock();
            session.wants_connection && *self.state_tx.borrow() == ConnectionState::Disconnected
        };
        if resume {
            tracing::info!("network restored, reconnecting");
            if let Err(e) = self.connect(Origin::Network).await {
                tracing::warn!(err = %e, "reconnect after network restore failed");
            }
        }
    }
}

/// Force-disconnect whenever the token store is cleared.
fn spawn_cleared_watcher(shared: Arc<Shared>) {
    let mut cleared = shared.tokens.subscribe_cleared();
    let lifecycle = shared.lifecycle.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = lifecycle.cancelled() => break,
                r = cleared.recv() => match r {
                    Ok(reason) => {
                        tracing::debug!(?reason, "tokens cleared");
                        shared.shutdown("tokens cleared");
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => shared.shutdown("tokens cleared"),
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

/// Follow reachability: resume when it returns, stop retrying when it goes.
fn spawn_network_watcher(shared: Arc<Shared>) {
    let mut reachable = shared.network.subscribe();
    let lifecycle = shared.lifecycle.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = lifecycle.cancelled() => break,
                changed = reachable.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let up = *reachable.borrow_and_update();
            if up {
                shared.on_network_restored().await;
            } else {
                shared.on_network_lost();
            }
        }
    });
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
