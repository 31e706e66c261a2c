// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use openchat_daemon::config::BridgeConfig;

#[tokio::main]
async fn main() {
    let config = BridgeConfig::parse();
    openchat_daemon::init_logging(&config);

    if let Err(e) = openchat_daemon::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
