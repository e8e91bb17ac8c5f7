// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracked room memberships, replayed on every connect.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::transport::frame::{WireFrame, JOIN_ROOM, LEAVE_ROOM};

/// Rooms the client wants to be in, in registration order.
///
/// The registry only tracks intent. The connection manager turns the
/// frames built here into network traffic.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<Mutex<IndexMap<String, Value>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `room_id` with its join context. Returns `false` when the room
    /// was already tracked; the original context is kept and no frame is due.
    pub fn join(&self, room_id: &str, payload: Value) -> bool {
        let mut rooms = self.rooms.lock();
        if rooms.contains_key(room_id) {
            return false;
        }
        rooms.insert(room_id.to_owned(), payload);
        true
    }

    /// Stop tracking `room_id`. Returns whether it was tracked.
    pub fn leave(&self, room_id: &str) -> bool {
        // shift_remove keeps the remaining rooms in registration order
        self.rooms.lock().shift_remove(room_id).is_some()
    }

    /// One join frame per tracked room, in registration order.
    pub fn rejoin_all(&self) -> Vec<WireFrame> {
        self.rooms.lock().iter().map(|(id, payload)| join_frame(id, payload)).collect()
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.lock().contains_key(room_id)
    }

    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.lock().is_empty()
    }

    /// Forget every room (full logout).
    pub fn clear(&self) {
        self.rooms.lock().clear();
    }
}

/// `join_room` frame carrying `{roomId, ...context}`.
///
/// Object contexts are flattened next to `roomId`; any other non-null
/// context travels under `context`.
pub fn join_frame(room_id: &str, payload: &Value) -> WireFrame {
    let mut body = Map::new();
    body.insert("roomId".to_owned(), Value::String(room_id.to_owned()));
    match payload {
        Value::Object(fields) => {
            for (k, v) in fields {
                if k != "roomId" {
                    body.insert(k.clone(), v.clone());
                }
            }
        }
        Value::Null => {}
        other => {
            body.insert("context".to_owned(), other.clone());
        }
    }
    WireFrame::event(JOIN_ROOM, vec![Value::Object(body)])
}

/// `leave_room` frame carrying `{roomId}`.
pub fn leave_frame(room_id: &str) -> WireFrame {
    WireFrame::event(LEAVE_ROOM, vec![serde_json::json!({ "roomId": room_id })])
}

#[cfg(test)]
#[path = "rooms_tests.rs"]
mod tests;
