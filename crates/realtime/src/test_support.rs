// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: an in-process transport the tests can script.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::transport::frame::WireFrame;
use crate::transport::{Link, Transport};

#[derive(Default)]
struct Control {
    opens: AtomicU32,
    failures: AtomicU32,
    always_fail: AtomicBool,
    hang: AtomicBool,
    urls: Mutex<Vec<String>>,
}

/// Transport whose links terminate in [`ServerEnd`]s handed to the test.
#[derive(Clone)]
pub struct MemoryTransport {
    control: Arc<Control>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

/// Test-side handle for scripting a [`MemoryTransport`].
pub struct MemoryServer {
    control: Arc<Control>,
    accepted: mpsc::UnboundedReceiver<ServerEnd>,
}

/// Server side of one open link.
pub struct ServerEnd {
    pub url: String,
    to_client: mpsc::UnboundedSender<WireFrame>,
    from_client: mpsc::UnboundedReceiver<WireFrame>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryServer) {
        let control = Arc::new(Control::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { control: Arc::clone(&control), accepted: tx },
            MemoryServer { control, accepted: rx },
        )
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<Link, TransportError> {
        self.control.opens.fetch_add(1, Ordering::SeqCst);
        self.control.urls.lock().push(url.to_owned());

        if self.control.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.control.always_fail.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }
        let failing = self
            .control
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let end = ServerEnd { url: url.to_owned(), to_client: in_tx, from_client: out_rx };
        if self.accepted.send(end).is_err() {
            return Err(TransportError::Connect("memory server dropped".into()));
        }
        Ok(Link { outbound: out_tx, inbound: in_rx })
    }
}

impl MemoryServer {
    /// Wait for the next link the client opens.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accepted.recv().await
    }

    /// Next already-opened link, without waiting.
    pub fn try_accept(&mut self) -> Option<ServerEnd> {
        self.accepted.try_recv().ok()
    }

    /// Number of `open` calls so far, failed ones included.
    pub fn opens(&self) -> u32 {
        self.control.opens.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.control.urls.lock().clone()
    }

    /// Fail the next `n` opens.
    pub fn fail_next(&self, n: u32) {
        self.control.failures.store(n, Ordering::SeqCst);
    }

    /// Fail every open until turned off.
    pub fn set_always_fail(&self, on: bool) {
        self.control.always_fail.store(on, Ordering::SeqCst);
    }

    /// Make opens never complete.
    pub fn set_hang(&self, on: bool) {
        self.control.hang.store(on, Ordering::SeqCst);
    }
}

impl ServerEnd {
    /// Push a frame to the client. Returns `false` if the client side is gone.
    pub fn send(&self, frame: WireFrame) -> bool {
        self.to_client.send(frame).is_ok()
    }

    /// Next frame from the client; `None` once the client closed the link.
    pub async fn recv(&mut self) -> Option<WireFrame> {
        self.from_client.recv().await
    }

    /// Drain whatever the client has sent so far.
    pub fn drain(&mut self) -> Vec<WireFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the client dropped its outbound side.
    pub fn is_closed_by_client(&self) -> bool {
        self.to_client.is_closed()
    }
}
