// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire frames and their classification.
//!
//! Frames are JSON text: `{"event": "...", "data": [...], "ack": 7}`.
//! An ack reply carries no event: `{"ack": 7, "data": [...]}`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::DecodeError;

pub const AUTHENTICATE: &str = "authenticate";
pub const AUTH_SUCCESS: &str = "auth_success";
pub const AUTH_ERROR: &str = "auth_error";
pub const JOIN_ROOM: &str = "join_room";
pub const LEAVE_ROOM: &str = "leave_room";

/// One frame as it travels over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl WireFrame {
    pub fn event(name: impl Into<String>, data: Vec<Value>) -> Self {
        Self { event: Some(name.into()), data, ack: None }
    }

    pub fn ack_reply(id: u64, data: Vec<Value>) -> Self {
        Self { event: None, data, ack: Some(id) }
    }

    pub fn with_ack(mut self, id: u64) -> Self {
        self.ack = Some(id);
        self
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Inbound frames sorted into the shapes the core reacts to.
#[derive(Debug, Clone)]
pub enum Inbound {
    AuthSuccess(Frame),
    AuthError { message: String, frame: Frame },
    AckReply { id: u64, data: Vec<Value> },
    /// Any application event; the payload stays unstructured JSON.
    Event(Frame),
}

impl Inbound {
    /// Classify a wire frame. `reply_tx` backs the acknowledger of frames
    /// that ask for one. Returns `None` for frames with neither event nor ack.
    pub fn classify(wire: WireFrame, reply_tx: &mpsc::UnboundedSender<WireFrame>) -> Option<Self> {
        let Some(event) = wire.event else {
            return wire.ack.map(|id| Self::AckReply { id, data: wire.data });
        };

        let ack = wire.ack.map(|id| Acknowledger::new(id, reply_tx.clone()));
        let frame = Frame { event, data: wire.data, ack };
        match frame.event.as_str() {
            AUTH_SUCCESS => Some(Self::AuthSuccess(frame)),
            AUTH_ERROR => {
                let message = auth_error_message(frame.payload());
                Some(Self::AuthError { message, frame })
            }
            _ => Some(Self::Event(frame)),
        }
    }
}

fn auth_error_message(payload: Option<&Value>) -> String {
    match payload {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| v.to_string()),
        None => "authentication rejected".to_owned(),
    }
}

/// An inbound event as handed to subscribers.
#[derive(Debug, Clone)]
pub struct Frame {
    pub event: String,
    pub data: Vec<Value>,
    ack: Option<Acknowledger>,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Vec<Value>) -> Self {
        Self { event: event.into(), data, ack: None }
    }

    /// Primary payload (first element of the data array).
    pub fn payload(&self) -> Option<&Value> {
        self.data.first()
    }

    /// Decode the primary payload into `T`. A missing payload decodes as `null`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let value = self.payload().cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|source| DecodeError { event: self.event.clone(), source })
    }

    /// Whether the sender asked for an acknowledgment.
    pub fn wants_ack(&self) -> bool {
        self.ack.is_some()
    }

    /// Acknowledge this frame. Returns `false` when no ack was requested,
    /// the frame was already acknowledged, or the transport is gone.
    pub fn ack(&self, data: Vec<Value>) -> bool {
        match self.ack {
            Some(ref acker) => acker.send(data),
            None => false,
        }
    }
}

/// Reply handle shared by every copy of one inbound frame.
#[derive(Debug, Clone)]
pub struct Acknowledger {
    id: u64,
    tx: mpsc::UnboundedSender<WireFrame>,
    sent: Arc<AtomicBool>,
}

impl Acknowledger {
    fn new(id: u64, tx: mpsc::UnboundedSender<WireFrame>) -> Self {
        Self { id, tx, sent: Arc::new(AtomicBool::new(false)) }
    }

    fn send(&self, data: Vec<Value>) -> bool {
        if self.sent.swap(true, Ordering::SeqCst) {
            tracing::debug!(ack = self.id, "frame already acknowledged");
            return false;
        }
        self.tx.send(WireFrame::ack_reply(self.id, data)).is_ok()
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
