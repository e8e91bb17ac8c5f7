// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duplex frame links. The connection manager only sees [`Transport`].

pub mod frame;
pub mod ws;

use tokio::sync::mpsc;

use crate::error::TransportError;
use frame::WireFrame;

/// An open duplex link.
///
/// Dropping either half closes the link. `inbound` yielding `None` means
/// the remote side closed or the link failed.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<WireFrame>,
    pub inbound: mpsc::UnboundedReceiver<WireFrame>,
}

/// Opens links to a realtime endpoint.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Link, TransportError>;
}
