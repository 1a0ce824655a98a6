// Copyright (c) 2026 Convergent Ledger
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Peer node entrypoint (systemd-friendly). Loads `NodeConfig` from a TOML
//! file, starts the metrics endpoint, and runs the five-worker pipeline
//! until a worker exits with a fatal error.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use convergentledger::monitoring::metrics::Metrics;
use convergentledger::runtime::trust::AllowAll;
use convergentledger::runtime::vm::NoVm;
use convergentledger::server::config::NodeConfig;
use convergentledger::server::launch_peer;

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if env("CVGL_LOG_FORMAT", "compact") == "json" {
        let _ = tracing_subscriber::fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt().compact().with_target(false).with_env_filter(filter).try_init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = PathBuf::from(env("CVGL_CONFIG", "node.toml"));
    let config = NodeConfig::load(&config_path).with_context(|| format!("loading config from {}", config_path.display()))?;

    init_logging(&config.log_level);
    info!(config = %config_path.display(), "convergent ledger peer starting");

    let metrics_bind_address = config.metrics_bind_address.clone();
    let peer = launch_peer(config, Arc::new(NoVm), Arc::new(AllowAll)).context("launching peer")?;

    let metrics = Arc::new(Metrics::new().context("registering metrics")?);
    if let Err(e) = convergentledger::monitoring::metrics::serve(&metrics_bind_address, metrics, Arc::clone(&peer.shared)) {
        error!(error = %e, "metrics endpoint failed to start; continuing without it");
    }

    peer.wait().await;
    error!("peer pipeline exited");
    std::process::exit(1);
}
