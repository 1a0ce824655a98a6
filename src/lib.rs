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

//! A Convergent Proof-of-Stake ledger core: no leader election or
//! view-changes, just peers repeatedly merging signed Orders over a
//! content-addressed, Merkleized cell universe until enough effective stake
//! agrees on a prefix to finalize it.
//!
//! This crate provides:
//! - The canonical cell encoding and content-addressed value universe (§4.1)
//! - A append-only, crash-durable content-addressed store (§4.2)
//! - Ed25519-signed, domain-separated cells (§4.3)
//! - The CPoS belief-merge algorithm (§4.4)
//! - Ledger state and transaction application (§4.2/§4.5)
//! - Monitoring via Prometheus metrics and structured JSON logging

/// Core protocol primitives (cell model, consensus, ledger state, security).
pub mod core;
/// Observability (metrics, structured logging helpers).
pub mod monitoring;
/// Peer reputation scoring for gossip backpressure and banning.
pub mod networking;
/// Transaction execution: the `Vm`/`TrustMonitor` boundary and block executor.
pub mod runtime;
/// The peer process: five workers sharing store, consensus, and ledger state.
pub mod server;
/// Content-addressed persistent cell store.
pub mod store;
/// Peer wire protocol: VLC framing, multi-cell encoding, message kinds.
pub mod wire;
