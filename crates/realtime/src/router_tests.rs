// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use futures_util::StreamExt;
use serde_json::json;

use super::*;

#[tokio::test]
async fn subscribe_before_any_transport() -> anyhow::Result<()> {
    let router = EventRouter::new();
    let mut sub = router.subscribe("dish_added");
    assert_eq!(sub.event(), "dish_added");

    assert_eq!(router.dispatch(Frame::new("dish_added", vec![json!({ "id": 1 })])), 1);
    let frame = sub.recv().await.ok_or_else(|| anyhow::anyhow!("stream ended"))?;
    assert_eq!(frame.payload(), Some(&json!({ "id": 1 })));
    Ok(())
}

#[tokio::test]
async fn fan_out_to_independent_subscribers() -> anyhow::Result<()> {
    let router = EventRouter::new();
    let mut a = router.subscribe("vote_cast");
    let mut b = router.subscribe("vote_cast");
    let mut other = router.subscribe("chat");

    assert_eq!(router.dispatch(Frame::new("vote_cast", vec![json!(1)])), 2);

    assert_eq!(a.recv().await.map(|f| f.data), Some(vec![json!(1)]));
    assert_eq!(b.recv().await.map(|f| f.data), Some(vec![json!(1)]));
    router.unsubscribe("chat");
    assert!(other.recv().await.is_none());
    Ok(())
}

#[tokio::test]
async fn dispatch_preserves_arrival_order() -> anyhow::Result<()> {
    let router = EventRouter::new();
    let sub = router.subscribe("tick");
    for n in 0..20 {
        router.dispatch(Frame::new("tick", vec![json!(n)]));
    }
    router.unsubscribe("tick");

    let seen: Vec<_> = sub.map(|f| f.data[0].clone()).collect().await;
    let expected: Vec<_> = (0..20).map(|n| json!(n)).collect();
    assert_eq!(seen, expected);
    Ok(())
}

#[test]
fn dropped_subscription_is_pruned() {
    let router = EventRouter::new();
    let keep = router.subscribe("chat");
    let gone = router.subscribe("chat");
    assert_eq!(router.subscriber_count("chat"), 2);

    drop(gone);
    assert_eq!(router.subscriber_count("chat"), 1);
    assert_eq!(router.dispatch(Frame::new("chat", vec![])), 1);

    drop(keep);
    assert_eq!(router.dispatch(Frame::new("chat", vec![])), 0);
    assert_eq!(router.subscriber_count("chat"), 0);
}

#[test]
fn unknown_event_and_unsubscribe_are_harmless() {
    let router = EventRouter::new();
    router.unsubscribe("never_subscribed");
    assert_eq!(router.dispatch(Frame::new("nobody", vec![])), 0);
}
