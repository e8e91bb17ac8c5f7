// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

fn classify(text: &str) -> anyhow::Result<(Option<Inbound>, mpsc::UnboundedReceiver<WireFrame>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    Ok((Inbound::classify(WireFrame::decode(text)?, &tx), rx))
}

#[test]
fn encode_omits_empty_fields() -> anyhow::Result<()> {
    let text = WireFrame::event("vote", vec![]).encode()?;
    assert_eq!(text, r#"{"event":"vote"}"#);

    let text = WireFrame::event("vote", vec![json!({ "dish": 3 })]).with_ack(9).encode()?;
    let parsed: Value = serde_json::from_str(&text)?;
    assert_eq!(parsed, json!({ "event": "vote", "data": [{ "dish": 3 }], "ack": 9 }));
    Ok(())
}

#[test]
fn application_event_is_unstructured() -> anyhow::Result<()> {
    let (inbound, _rx) = classify(r#"{"event":"vote_cast","data":[{"dish":"soup"}]}"#)?;
    let Some(Inbound::Event(frame)) = inbound else {
        anyhow::bail!("expected an event, got {inbound:?}");
    };
    assert_eq!(frame.event, "vote_cast");
    assert_eq!(frame.payload(), Some(&json!({ "dish": "soup" })));
    assert!(!frame.wants_ack());
    Ok(())
}

#[test]
fn ack_reply_has_no_event() -> anyhow::Result<()> {
    let (inbound, _rx) = classify(r#"{"ack":4,"data":["ok"]}"#)?;
    let Some(Inbound::AckReply { id, data }) = inbound else {
        anyhow::bail!("expected an ack reply, got {inbound:?}");
    };
    assert_eq!(id, 4);
    assert_eq!(data, vec![json!("ok")]);
    Ok(())
}

#[test]
fn empty_frame_is_dropped() -> anyhow::Result<()> {
    let (inbound, _rx) = classify("{}")?;
    assert!(inbound.is_none());
    Ok(())
}

#[yare::parameterized(
    object_message = { r#"{"event":"auth_error","data":[{"message":"expired"}]}"#, "expired" },
    string_payload = { r#"{"event":"auth_error","data":["bad token"]}"#, "bad token" },
    no_payload = { r#"{"event":"auth_error"}"#, "authentication rejected" },
)]
fn auth_error_message_extraction(text: &str, expected: &str) -> anyhow::Result<()> {
    let (inbound, _rx) = classify(text)?;
    let Some(Inbound::AuthError { message, .. }) = inbound else {
        anyhow::bail!("expected auth_error, got {inbound:?}");
    };
    assert_eq!(message, expected);
    Ok(())
}

#[test]
fn auth_success_is_recognised() -> anyhow::Result<()> {
    let (inbound, _rx) = classify(r#"{"event":"auth_success","data":[{"userId":"u1"}]}"#)?;
    assert!(matches!(inbound, Some(Inbound::AuthSuccess(_))));
    Ok(())
}

#[test]
fn decode_preserves_cause() {
    #[derive(Debug, serde::Deserialize)]
    struct Vote {
        #[allow(dead_code)]
        dish: u32,
    }

    let frame = Frame::new("vote_cast", vec![json!({ "dish": "soup" })]);
    let err = frame.decode::<Vote>().err();
    assert!(err.is_some());
    if let Some(err) = err {
        assert_eq!(err.event, "vote_cast");
        assert!(std::error::Error::source(&err).is_some());
    }
}

#[test]
fn decode_success() -> anyhow::Result<()> {
    let frame = Frame::new("tally", vec![json!([1, 2, 3])]);
    let tally: Vec<u32> = frame.decode()?;
    assert_eq!(tally, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn ack_is_sent_once_across_copies() -> anyhow::Result<()> {
    let (inbound, mut rx) = classify(r#"{"event":"ping_room","data":[],"ack":12}"#)?;
    let Some(Inbound::Event(frame)) = inbound else {
        anyhow::bail!("expected an event");
    };
    let copy = frame.clone();
    assert!(frame.wants_ack());

    assert!(copy.ack(vec![json!("pong")]));
    assert!(!frame.ack(vec![json!("again")]));

    assert_eq!(rx.try_recv()?, WireFrame::ack_reply(12, vec![json!("pong")]));
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[test]
fn ack_without_request_is_noop() {
    let frame = Frame::new("tally", vec![]);
    assert!(!frame.ack(vec![]));
}
