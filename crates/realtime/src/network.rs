// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network reachability, fed by the platform layer.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared reachability flag. Clones observe the same value.
#[derive(Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(reachable: bool) -> Self {
        let (tx, _) = watch::channel(reachable);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a reachability change. Repeated values do not notify.
    pub fn set_reachable(&self, reachable: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == reachable {
                return false;
            }
            *current = reachable;
            true
        });
        if changed {
            tracing::info!(reachable, "network reachability changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::NetworkMonitor;

    #[tokio::test]
    async fn subscribers_see_changes_only() -> anyhow::Result<()> {
        let monitor = NetworkMonitor::default();
        let mut rx = monitor.subscribe();
        assert!(monitor.is_reachable());

        monitor.set_reachable(true);
        assert!(!rx.has_changed()?);

        monitor.set_reachable(false);
        rx.changed().await?;
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.clone().is_reachable());
        Ok(())
    }
}
