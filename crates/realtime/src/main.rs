// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use potluck_realtime::config::ClientConfig;
use potluck_realtime::RunOptions;

/// Connect to the realtime server and print events.
#[derive(Debug, Parser)]
#[command(name = "potluck-rt", version)]
struct Cli {
    #[command(flatten)]
    config: ClientConfig,

    /// Identity-provider token to sign in with before connecting.
    #[arg(long, env = "POTLUCK_IDP_TOKEN")]
    idp_token: Option<String>,

    /// Room to join (repeatable).
    #[arg(long = "room")]
    rooms: Vec<String>,

    /// Event name to print (repeatable).
    #[arg(long = "event")]
    events: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opts = RunOptions { idp_token: cli.idp_token, rooms: cli.rooms, events: cli.events };
    if let Err(e) = potluck_realtime::run(cli.config, opts).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
