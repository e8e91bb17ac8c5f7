// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

fn joined_rooms(frames: &[WireFrame]) -> Vec<Value> {
    frames
        .iter()
        .filter_map(|f| f.data.first())
        .filter_map(|p| p.get("roomId").cloned())
        .collect()
}

#[test]
fn duplicate_join_keeps_first_context() {
    let rooms = RoomRegistry::new();
    assert!(rooms.join("potluck-1", json!({ "role": "host" })));
    assert!(!rooms.join("potluck-1", json!({ "role": "guest" })));
    assert_eq!(rooms.len(), 1);

    let frames = rooms.rejoin_all();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data, vec![json!({ "roomId": "potluck-1", "role": "host" })]);
}

#[test]
fn rejoin_follows_registration_order() {
    let rooms = RoomRegistry::new();
    for id in ["c", "a", "b", "d"] {
        rooms.join(id, Value::Null);
    }
    assert!(rooms.leave("a"));

    let frames = rooms.rejoin_all();
    assert!(frames.iter().all(|f| f.event.as_deref() == Some(JOIN_ROOM)));
    assert_eq!(joined_rooms(&frames), vec![json!("c"), json!("b"), json!("d")]);
    assert_eq!(rooms.room_ids(), vec!["c", "b", "d"]);
}

#[test]
fn leave_untracked_room_reports_false() {
    let rooms = RoomRegistry::new();
    assert!(!rooms.leave("nowhere"));
    assert!(rooms.is_empty());
}

#[test]
fn clear_forgets_everything() {
    let rooms = RoomRegistry::new();
    rooms.join("a", Value::Null);
    rooms.join("b", Value::Null);
    rooms.clear();
    assert!(rooms.rejoin_all().is_empty());
    assert!(!rooms.contains("a"));
}

#[yare::parameterized(
    null_context = { Value::Null, json!({ "roomId": "r1" }) },
    object_context = { json!({ "potluckId": 9 }), json!({ "roomId": "r1", "potluckId": 9 }) },
    room_id_not_overridden = { json!({ "roomId": "evil" }), json!({ "roomId": "r1" }) },
    scalar_context = { json!("dessert"), json!({ "roomId": "r1", "context": "dessert" }) },
)]
fn join_frame_body(context: Value, expected: Value) {
    let frame = join_frame("r1", &context);
    assert_eq!(frame.event.as_deref(), Some(JOIN_ROOM));
    assert_eq!(frame.data, vec![expected]);
}

#[test]
fn leave_frame_body() {
    let frame = leave_frame("r1");
    assert_eq!(frame.event.as_deref(), Some(LEAVE_ROOM));
    assert_eq!(frame.data, vec![json!({ "roomId": "r1" })]);
}
