// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport over tokio-tungstenite.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::frame::WireFrame;
use super::{Link, Transport};
use crate::error::TransportError;

/// Text-frame JSON over WebSocket.
#[derive(Debug, Default, Clone)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<Link, TransportError> {
        crate::http::ensure_crypto();
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(Box::new(e)))?;
        tracing::debug!(url, "websocket open");

        let (mut write, mut read) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WireFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<WireFrame>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        let Some(frame) = outgoing else {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        };
                        let text = match frame.encode() {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::warn!(err = %e, "dropping unencodable frame");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            tracing::debug!(err = %e, "websocket send failed");
                            break;
                        }
                    }
                    _ = in_tx.closed() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => match WireFrame::decode(&text) {
                                Ok(frame) => {
                                    if in_tx.send(frame).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => tracing::warn!(err = %e, "ignoring malformed frame"),
                            },
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::debug!("websocket closed by peer");
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::debug!(err = %e, "websocket read error");
                                break;
                            }
                            _ => {} // ping/pong/binary ignored
                        }
                    }
                }
            }
        });

        Ok(Link { outbound: out_tx, inbound: in_rx })
    }
}

/// Build a WebSocket URL from an HTTP base URL and a socket path.
pub fn build_ws_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_owned()
    };

    if path.is_empty() {
        ws_base
    } else if path.starts_with('/') {
        format!("{ws_base}{path}")
    } else {
        format!("{ws_base}/{path}")
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
