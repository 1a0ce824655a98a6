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

//! The peer process (§4.6, §6): five workers sharing one [`Shared`] handle.
//!
//! * [`connection_manager`] owns every socket: inbound accepts, outbound
//!   dials, the identity handshake, and routing each classified message to
//!   the worker that owns it.
//! * [`transaction_handler`] drains the transaction inbox into blocks.
//! * [`belief_propagator`] broadcasts this peer's own order when it changes.
//! * [`cvm_executor`] applies newly-consensed blocks to the ledger.
//! * [`query_processor`] answers read-only `Query` messages inline, off the
//!   connection manager's read loop — it has no queue of its own because a
//!   query never blocks on anything but a `Vm::invoke` call against an
//!   already-resolved snapshot.
//!
//! All cross-worker signaling beyond direct calls goes through
//! [`Shared::belief_notify`] / [`Shared::executor_notify`]: a `Notify`, not a
//! channel, because a worker only ever needs "there is new work, go look,"
//! never a queue of individual wake-up payloads.

pub mod belief_propagator;
pub mod config;
pub mod connection_manager;
pub mod consensus_state;
pub mod cvm_executor;
pub mod error;
pub mod peer_table;
pub mod query_processor;
pub mod rate_limit;
pub mod shared;
pub mod transaction_handler;

use std::sync::Arc;

use crate::runtime::trust::TrustMonitor;
use crate::runtime::vm::Vm;

use config::NodeConfig;
use error::ServerError;
use shared::Shared;

/// A running peer's worker handles, so the caller can wait on the whole
/// pipeline or tear it down together.
pub struct Peer {
    pub shared: Arc<Shared>,
    connection_manager: tokio::task::JoinHandle<()>,
    transaction_handler: tokio::task::JoinHandle<()>,
    belief_propagator: tokio::task::JoinHandle<()>,
    cvm_executor: tokio::task::JoinHandle<()>,
}

impl Peer {
    /// Wait for any one worker to exit. Workers only exit on an unrecoverable
    /// condition (e.g. the listen port could not be bound), so this
    /// effectively waits for the first fatal failure.
    pub async fn wait(self) {
        tokio::select! {
            _ = self.connection_manager => {}
            _ = self.transaction_handler => {}
            _ = self.belief_propagator => {}
            _ = self.cvm_executor => {}
        }
    }
}

/// Open durable state and start all five pipeline workers (§6 `launch_peer`).
pub fn launch_peer(config: NodeConfig, vm: Arc<dyn Vm>, trust: Arc<dyn TrustMonitor>) -> Result<Peer, ServerError> {
    let shared = Shared::open(config, vm, trust)?;
    let (tx_inbox_sender, tx_inbox_receiver) = tokio::sync::mpsc::unbounded_channel();

    let connection_manager = tokio::spawn(connection_manager::run(Arc::clone(&shared), tx_inbox_sender));
    let transaction_handler = tokio::spawn(transaction_handler::run(Arc::clone(&shared), tx_inbox_receiver));
    let belief_propagator = tokio::spawn(belief_propagator::run(Arc::clone(&shared)));
    let cvm_executor = tokio::spawn(cvm_executor::run(Arc::clone(&shared)));

    Ok(Peer { shared, connection_manager, transaction_handler, belief_propagator, cvm_executor })
}
