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

//! Prometheus metrics (§2's "Metrics" ambient stack item, §4.6's per-worker
//! load gauges): a registry of gauges/counters that is refreshed from
//! [`crate::server::shared::Shared`] on every scrape, plus an `axum`-served
//! `/metrics` endpoint a deployment points its scraper at.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;
use tracing::{info, warn};

use crate::server::shared::Shared;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric failed to construct or register with the registry.
    #[error("prometheus registration failed")]
    Prom,
    /// The metrics HTTP endpoint failed to bind.
    #[error("metrics endpoint bind failed: {0}")]
    Bind(String),
}

/// Per-worker load gauges (§4.6) plus peer/consensus/store-size gauges and
/// the running totals a deployment's dashboards chart over time.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    connection_manager_load: IntGauge,
    transaction_handler_load: IntGauge,
    belief_propagator_load: IntGauge,
    cvm_executor_load: IntGauge,
    query_processor_load: IntGauge,

    peers_connected: IntGauge,
    proposal_point: IntGauge,
    consensus_point: IntGauge,
    finality_point: IntGauge,

    /// Blocks applied by the CVM executor.
    pub blocks_executed_total: IntCounter,
    /// Transactions rejected by signature, sequence, or peer-score checks.
    pub transactions_rejected_total: IntCounter,
    /// Peers banned for a protocol violation (§4.6 peer scoring).
    pub peers_banned_total: IntCounter,
}

macro_rules! register {
    ($registry:expr, $metric:expr) => {
        $registry.register(Box::new($metric.clone())).map_err(|_| MetricsError::Prom)?
    };
}

impl Metrics {
    /// Build and register every metric against a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let connection_manager_load =
            IntGauge::new("cvgl_worker_load", "In-flight units of work, labeled by worker")
                .map_err(|_| MetricsError::Prom)?;
        let transaction_handler_load = IntGauge::new("cvgl_transaction_handler_load", "Blocks currently being assembled")
            .map_err(|_| MetricsError::Prom)?;
        let belief_propagator_load = IntGauge::new("cvgl_belief_propagator_load", "Broadcasts currently in flight")
            .map_err(|_| MetricsError::Prom)?;
        let cvm_executor_load = IntGauge::new("cvgl_cvm_executor_load", "Block-execution batches currently running")
            .map_err(|_| MetricsError::Prom)?;
        let query_processor_load = IntGauge::new("cvgl_query_processor_load", "Queries currently being answered")
            .map_err(|_| MetricsError::Prom)?;

        let peers_connected = IntGauge::new("cvgl_peers_connected", "Currently-connected peer count").map_err(|_| MetricsError::Prom)?;
        let proposal_point = IntGauge::new("cvgl_order_proposal_point", "This peer's own proposal point").map_err(|_| MetricsError::Prom)?;
        let consensus_point = IntGauge::new("cvgl_order_consensus_point", "This peer's own consensus point").map_err(|_| MetricsError::Prom)?;
        let finality_point = IntGauge::new("cvgl_order_finality_point", "This peer's own finality point").map_err(|_| MetricsError::Prom)?;

        let blocks_executed_total =
            IntCounter::new("cvgl_blocks_executed_total", "Blocks applied by the CVM executor").map_err(|_| MetricsError::Prom)?;
        let transactions_rejected_total = IntCounter::new("cvgl_transactions_rejected_total", "Transactions rejected before execution")
            .map_err(|_| MetricsError::Prom)?;
        let peers_banned_total =
            IntCounter::new("cvgl_peers_banned_total", "Peers banned for a protocol violation").map_err(|_| MetricsError::Prom)?;

        register!(registry, connection_manager_load);
        register!(registry, transaction_handler_load);
        register!(registry, belief_propagator_load);
        register!(registry, cvm_executor_load);
        register!(registry, query_processor_load);
        register!(registry, peers_connected);
        register!(registry, proposal_point);
        register!(registry, consensus_point);
        register!(registry, finality_point);
        register!(registry, blocks_executed_total);
        register!(registry, transactions_rejected_total);
        register!(registry, peers_banned_total);

        Ok(Self {
            registry,
            connection_manager_load,
            transaction_handler_load,
            belief_propagator_load,
            cvm_executor_load,
            query_processor_load,
            peers_connected,
            proposal_point,
            consensus_point,
            finality_point,
            blocks_executed_total,
            transactions_rejected_total,
            peers_banned_total,
        })
    }

    /// Pull the current values out of `shared` into the gauges, just before
    /// a scrape encodes them. Counters are updated in place by workers as
    /// events happen, so they are not touched here.
    fn refresh(&self, shared: &Shared) {
        self.connection_manager_load.set(shared.load.connection_manager.load(Ordering::Relaxed) as i64);
        self.transaction_handler_load.set(shared.load.transaction_handler.load(Ordering::Relaxed) as i64);
        self.belief_propagator_load.set(shared.load.belief_propagator.load(Ordering::Relaxed) as i64);
        self.cvm_executor_load.set(shared.load.cvm_executor.load(Ordering::Relaxed) as i64);
        self.query_processor_load.set(shared.load.query_processor.load(Ordering::Relaxed) as i64);

        self.peers_connected.set(shared.peer_table.connected_ids().len() as i64);

        let own_order = shared.consensus.lock().unwrap().own_order();
        self.proposal_point.set(own_order.proposal_point as i64);
        self.consensus_point.set(own_order.consensus_point as i64);
        self.finality_point.set(own_order.finality_point as i64);
    }

    fn encode(&self, shared: &Shared) -> Vec<u8> {
        self.refresh(shared);
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        if encoder.encode(&families, &mut buffer).is_err() {
            buffer.clear();
        }
        buffer
    }
}

async fn handle_scrape(state: axum::extract::State<(Arc<Metrics>, Arc<Shared>)>) -> Vec<u8> {
    let (metrics, shared) = &*state;
    metrics.encode(shared)
}

/// Serve `/metrics` on `bind_address` until the process exits. Spawns its
/// own task; does not block the caller.
pub fn serve(bind_address: &str, metrics: Arc<Metrics>, shared: Arc<Shared>) -> Result<(), MetricsError> {
    let addr: std::net::SocketAddr = bind_address.parse().map_err(|e| MetricsError::Bind(format!("{e}")))?;
    let app = Router::new().route("/metrics", get(handle_scrape)).with_state((metrics, shared));
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, %addr, "metrics endpoint failed to bind");
                return;
            }
        };
        info!(%addr, "metrics endpoint listening");
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "metrics endpoint stopped");
        }
    });
    Ok(())
}
