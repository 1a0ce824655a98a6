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

//! `NodeConfig` (§6): exactly the fields `launch_peer` needs, loaded from a
//! TOML file the way the rest of this codebase's ambient config is loaded,
//! plus the logging/metrics fields every worker needs regardless of which
//! ledger features a deployment turns on.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ServerError;

fn default_listen_port() -> u16 {
    18888
}
fn default_consensus_levels() -> u32 {
    4
}
fn default_max_transactions_per_block() -> usize {
    1024
}
fn default_max_scheduled_per_block() -> usize {
    100
}
fn default_juice_limit() -> u64 {
    1_000_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_bind() -> String {
    "127.0.0.1:9898".to_string()
}

/// Where a peer's genesis `State` comes from: a previously-persisted store
/// root to resume from, or a fresh account table to bootstrap a new chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum GenesisSource {
    /// Resume from the store at `store_path`'s existing root, ignoring any
    /// inline accounts below.
    ExistingStore,
    /// Bootstrap a fresh chain from this account table.
    Accounts(Vec<GenesisAccount>),
}

/// One funded account in a fresh genesis state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Account address (`< MAX_ADDRESS`).
    pub address: u64,
    /// Starting balance.
    pub balance: i64,
    /// Whether this address is an actor (has a code environment).
    #[serde(default)]
    pub is_actor: bool,
    /// This account's Ed25519 public key, hex-encoded, required only if
    /// `self_stake` is set (staking is keyed by raw public key, §4.4, not
    /// by the derived address).
    #[serde(default)]
    pub public_key: Option<String>,
    /// Starting self-stake bonded to this account as a validator, if any.
    #[serde(default)]
    pub self_stake: u128,
}

/// A statically-configured peer to dial on startup (§6 `peer_peers`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerAddr {
    /// `host:port` to dial.
    pub address: String,
    /// The peer's Ed25519 public key, hex-encoded (verified during the
    /// connection's challenge/response handshake).
    pub public_key: String,
}

/// The full configuration one `launch_peer` call needs (§6): every field
/// spec.md's external-interface section enumerates, plus the ambient log
/// level and metrics bind address every worker depends on regardless of
/// which ledger features this deployment exercises.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Path to this peer's Ed25519 PKCS#8 key file (created on first run).
    pub keypair_path: PathBuf,
    /// TCP port to listen for peer connections on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Peers to dial on startup.
    #[serde(default)]
    pub peer_peers: Vec<PeerAddr>,
    /// Directory for this peer's content-addressed store.
    pub store_path: PathBuf,
    /// Where the genesis `State` comes from.
    pub genesis_state_or_path: GenesisSource,
    /// Number of consensus levels a block's `OrderView` tracks pointers for
    /// (§4.4); only `proposal`/`consensus`/`finality` are modeled today, so
    /// this is carried for forward compatibility with deeper pipelines.
    #[serde(default = "default_consensus_levels")]
    pub consensus_levels: u32,
    /// Whether a peer that detects it has fallen behind (§4.4 fork
    /// recovery) should request the full Order history from a peer rather
    /// than only ever merging incremental updates.
    #[serde(default)]
    pub enable_fork_recovery: bool,
    /// Minimum effective stake (§4.4) below which a validator's vote does
    /// not count toward quorum.
    pub min_effective_stake: u128,
    /// §4.6: maximum explicit transactions per block.
    #[serde(default = "default_max_transactions_per_block")]
    pub max_transactions_per_block: usize,
    /// §4.5: maximum due scheduled transactions pulled per block.
    #[serde(default = "default_max_scheduled_per_block")]
    pub max_scheduled_per_block: usize,
    /// Per-transaction juice limit (§4.5).
    #[serde(default = "default_juice_limit")]
    pub juice_limit: u64,
    /// `tracing` log level filter (`"info"`, `"debug"`, ...).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `host:port` the Prometheus metrics endpoint binds to.
    #[serde(default = "default_metrics_bind")]
    pub metrics_bind_address: String,
}

impl NodeConfig {
    /// Load a `NodeConfig` from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|e| ServerError::Config(e.to_string()))?;
        toml::from_str(&text).map_err(|e| ServerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_in_defaults() {
        let text = r#"
            keypair_path = "validator.key"
            store_path = "data"
            min_effective_stake = 1000
            genesis_state_or_path = "ExistingStore"
        "#;
        let cfg: NodeConfig = toml::from_str(text).unwrap();
        assert_eq!(cfg.listen_port, 18888);
        assert_eq!(cfg.consensus_levels, 4);
        assert!(!cfg.enable_fork_recovery);
        assert_eq!(cfg.max_transactions_per_block, 1024);
        assert_eq!(cfg.max_scheduled_per_block, 100);
        assert_eq!(cfg.juice_limit, 1_000_000);
        assert_eq!(cfg.log_level, "info");
        assert!(matches!(cfg.genesis_state_or_path, GenesisSource::ExistingStore));
    }
}
