// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out of inbound frames to per-event subscribers.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::transport::frame::Frame;

/// Routes frames by event name. Cheap to clone; clones share subscribers.
///
/// Listeners are held here rather than on the transport, so subscribing
/// before any connection exists is fine.
#[derive(Clone, Default)]
pub struct EventRouter {
    handlers: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Frame>>>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new independent listener for `event`.
    pub fn subscribe(&self, event: impl Into<String>) -> Subscription {
        let event = event.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.handlers.lock().entry(event.clone()).or_default().push(tx);
        tracing::debug!(event = %event, "subscribed");
        Subscription { event, inner: UnboundedReceiverStream::new(rx) }
    }

    /// Drop every listener for `event`. Their streams end.
    pub fn unsubscribe(&self, event: &str) {
        if self.handlers.lock().remove(event).is_some() {
            tracing::debug!(event, "unsubscribed");
        }
    }

    /// Deliver `frame` to every live listener of its event.
    ///
    /// Returns the number of listeners that received it. Listeners whose
    /// stream was dropped are pruned here.
    pub fn dispatch(&self, frame: Frame) -> usize {
        let mut handlers = self.handlers.lock();
        let Some(list) = handlers.get_mut(&frame.event) else {
            tracing::debug!(event = %frame.event, "no subscribers");
            return 0;
        };
        list.retain(|tx| tx.send(frame.clone()).is_ok());
        let delivered = list.len();
        if list.is_empty() {
            handlers.remove(&frame.event);
        }
        delivered
    }

    /// Live listener count for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .get(event)
            .map_or(0, |list| list.iter().filter(|tx| !tx.is_closed()).count())
    }
}

/// Stream of frames for one event name.
pub struct Subscription {
    event: String,
    inner: UnboundedReceiverStream<Frame>,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Next frame; `None` after [`EventRouter::unsubscribe`].
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inner.next().await
    }
}

impl Stream for Subscription {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
