// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use super::*;
use crate::credential::persist::MemoryStore;

#[derive(Clone)]
struct RefreshServer {
    calls: Arc<AtomicU32>,
    status: StatusCode,
    delay: Duration,
}

async fn refresh_handler(
    State(s): State<RefreshServer>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let n = s.calls.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(s.delay).await;
    if s.status != StatusCode::OK {
        return (s.status, Json(serde_json::json!({ "error": "rejected" })));
    }
    let echoed = body["refreshToken"].as_str().unwrap_or_default().to_owned();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "token": format!("T{}", n + 1), "refreshToken": format!("{echoed}+") })),
    )
}

async fn spawn_refresh_server(
    status: StatusCode,
    delay: Duration,
) -> anyhow::Result<(String, Arc<AtomicU32>)> {
    let calls = Arc::new(AtomicU32::new(0));
    let state = RefreshServer { calls: Arc::clone(&calls), status, delay };
    let router = Router::new().route("/auth/refresh", post(refresh_handler)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((format!("http://{addr}/auth/refresh"), calls))
}

fn refresher(url: &str, tokens: &TokenStore, network: &NetworkMonitor) -> TokenRefresher {
    let http = crate::http::build_http_client(Duration::from_secs(5));
    TokenRefresher::new(http, url, tokens.clone(), network.clone())
}

#[tokio::test]
async fn missing_refresh_token_fails_fast() {
    let tokens = TokenStore::new(MemoryStore::new());
    let r = refresher("http://127.0.0.1:9/auth/refresh", &tokens, &NetworkMonitor::default());
    assert!(matches!(r.refresh().await, Err(AuthError::NoRefreshToken)));
}

#[tokio::test]
async fn unreachable_network_fails_fast_and_keeps_tokens() -> anyhow::Result<()> {
    let tokens = TokenStore::new(MemoryStore::new());
    tokens.set(&TokenPair::new("T1", "R1"))?;
    let network = NetworkMonitor::new(false);
    let r = refresher("http://127.0.0.1:9/auth/refresh", &tokens, &network);

    assert!(matches!(r.refresh().await, Err(AuthError::NetworkUnavailable)));
    assert_eq!(tokens.get(), Some(TokenPair::new("T1", "R1")));
    Ok(())
}

#[tokio::test]
async fn success_stores_new_pair() -> anyhow::Result<()> {
    let (url, calls) = spawn_refresh_server(StatusCode::OK, Duration::ZERO).await?;
    let tokens = TokenStore::new(MemoryStore::new());
    tokens.set(&TokenPair::new("T1", "R1"))?;
    let r = refresher(&url, &tokens, &NetworkMonitor::default());

    let pair = r.refresh().await?;
    assert_eq!(pair, TokenPair::new("T2", "R1+"));
    assert_eq!(tokens.get(), Some(pair));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!r.is_refreshing());
    Ok(())
}

#[tokio::test]
async fn concurrent_callers_share_one_request() -> anyhow::Result<()> {
    let (url, calls) = spawn_refresh_server(StatusCode::OK, Duration::from_millis(100)).await?;
    let tokens = TokenStore::new(MemoryStore::new());
    tokens.set(&TokenPair::new("T1", "R1"))?;
    let r = refresher(&url, &tokens, &NetworkMonitor::default());

    let results = futures_util::future::join_all((0..8).map(|_| r.refresh())).await;
    for result in results {
        assert_eq!(result?, TokenPair::new("T2", "R1+"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn stale_caller_reuses_completed_refresh() -> anyhow::Result<()> {
    let (url, calls) = spawn_refresh_server(StatusCode::OK, Duration::ZERO).await?;
    let tokens = TokenStore::new(MemoryStore::new());
    tokens.set(&TokenPair::new("T1", "R1"))?;
    let r = refresher(&url, &tokens, &NetworkMonitor::default());

    let first = r.refresh_stale("T1").await?;
    let late = r.refresh_stale("T1").await?;
    assert_eq!(first, late);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn rejection_clears_both_tokens() -> anyhow::Result<()> {
    let (url, _calls) = spawn_refresh_server(StatusCode::UNAUTHORIZED, Duration::ZERO).await?;
    let tokens = TokenStore::new(MemoryStore::new());
    tokens.set(&TokenPair::new("T1", "R1"))?;
    let mut cleared = tokens.subscribe_cleared();
    let r = refresher(&url, &tokens, &NetworkMonitor::default());

    let err = r.refresh().await.err();
    assert!(matches!(err, Some(AuthError::Rejected { status: 401, .. })), "got {err:?}");
    assert_eq!(tokens.get(), None);
    assert_eq!(cleared.try_recv()?, ClearReason::RefreshFailed);
    Ok(())
}

#[tokio::test]
async fn transport_failure_clears_tokens() -> anyhow::Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let tokens = TokenStore::new(MemoryStore::new());
    tokens.set(&TokenPair::new("T1", "R1"))?;
    let r = refresher(&format!("http://{addr}/auth/refresh"), &tokens, &NetworkMonitor::default());

    assert!(matches!(r.refresh().await, Err(AuthError::Transport(_))));
    assert_eq!(tokens.get(), None);
    Ok(())
}

#[tokio::test]
async fn late_result_after_sign_out_is_discarded() -> anyhow::Result<()> {
    let (url, calls) = spawn_refresh_server(StatusCode::OK, Duration::from_millis(200)).await?;
    let tokens = TokenStore::new(MemoryStore::new());
    tokens.set(&TokenPair::new("T1", "R1"))?;
    let r = refresher(&url, &tokens, &NetworkMonitor::default());

    let pending = tokio::spawn({
        let r = r.clone();
        async move { r.refresh().await }
    });
    // Wait for the request to reach the server, then sign out.
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokens.clear();

    assert!(matches!(pending.await?, Err(AuthError::Superseded)));
    assert_eq!(tokens.get(), None);
    Ok(())
}
