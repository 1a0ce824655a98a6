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

//! State shared across the five pipeline workers (§4.6, §5): the store, the
//! atomically-swapped "latest State" snapshot, consensus bookkeeping, the
//! peer table, and the per-worker load gauges a `Status` response reports.

use crate::core::cell::collections::SeqTree;
use crate::core::cell::error::CellError;
use crate::core::cell::hash::Hash32;
use crate::core::cell::record::{Order, Record};
use crate::core::cell::ref_::{DecodeContext, Ref};
use crate::core::cell::signed::SignedData;
use crate::core::cell::value::Value;
use crate::core::consensus::merge::PeerId;
use crate::core::economics::staking::StakingLedger;
use crate::core::security::keystore::FileEd25519Backend;
use crate::core::state::ledger::Ledger;
use crate::core::state::{build_state, open_state};
use crate::runtime::executor::ExecutorConfig;
use crate::runtime::trust::TrustMonitor;
use crate::runtime::vm::Vm;
use crate::store::Store;
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::config::{GenesisSource, NodeConfig};
use super::consensus_state::{order_to_order_view, order_view_to_order, ConsensusState};
use super::error::ServerError;
use super::peer_table::{peer_id_of, PeerTable};

/// The ledger state a query or new block execution reads against, swapped
/// atomically whenever the CVM executor commits a new block (§5).
pub struct LatestState {
    pub ledger: Ledger,
    pub global_timestamp: i64,
}

/// Per-worker load counters (§4.6: "each with a load metric"), exposed
/// through `Status` responses and the metrics endpoint.
#[derive(Default)]
pub struct WorkerLoad {
    pub connection_manager: AtomicU64,
    pub transaction_handler: AtomicU64,
    pub belief_propagator: AtomicU64,
    pub cvm_executor: AtomicU64,
    pub query_processor: AtomicU64,
}

/// Everything the five pipeline workers share.
pub struct Shared {
    pub store: Arc<Store>,
    pub config: NodeConfig,
    pub identity: Arc<FileEd25519Backend>,
    pub own_id: u64,
    pub peer_table: PeerTable,
    pub consensus: std::sync::Mutex<ConsensusState>,
    pub staking: std::sync::Mutex<StakingLedger>,
    pub latest_state: ArcSwap<LatestState>,
    pub trust: Arc<dyn TrustMonitor>,
    pub vm: Arc<dyn Vm>,
    pub executor_config: ExecutorConfig,
    pub load: WorkerLoad,
    /// Most recently accepted signed `Order` cell from each peer, keyed by
    /// its own signer (not necessarily a directly-connected peer — an entry
    /// can arrive embedded in another peer's full `Belief`). Relayed back
    /// out inside this peer's own `Belief` broadcasts so transitive gossip
    /// reaches peers outside a full connection mesh (§4.5).
    pub known_orders: Mutex<BTreeMap<PeerId, SignedData>>,
    /// Woken whenever the own order changes and peers should be told.
    pub belief_notify: Notify,
    /// Woken whenever consensus_point advances past what has been executed.
    pub executor_notify: Notify,
    /// Global logical clock, advanced by the transaction handler each time
    /// it assembles a block (§4.2 "global_timestamp").
    pub clock: AtomicI64,
}

/// The checkpoint cell a peer's store root points to: its latest applied
/// `State` plus its own signed `Order`, so a restart can resume both the
/// ledger and consensus bookkeeping without replaying the whole log.
fn checkpoint_ref(state: &Record, order: &Order) -> Result<Ref, CellError> {
    let state_ref = Ref::new(Value::Record(Box::new(state.clone())))?;
    let order_ref = Ref::new(Value::Record(Box::new(Record::Order(order.clone()))))?;
    Ref::new(Value::Vector(SeqTree::Leaf(vec![state_ref, order_ref])))
}

impl Shared {
    /// Open (or create) every piece of durable/in-memory state a peer needs
    /// to start its worker pipeline (§6 `launch_peer`).
    pub fn open(config: NodeConfig, vm: Arc<dyn Vm>, trust: Arc<dyn TrustMonitor>) -> Result<Arc<Self>, ServerError> {
        let store = Arc::new(Store::open(&config.store_path)?);
        let identity = Arc::new(FileEd25519Backend::load_or_create(&config.keypair_path)?);
        let own_pubkey = identity.public_key();
        let own_id = peer_id_of(&own_pubkey);

        let (ledger, global_timestamp, consensus) = match store.root_hash()? {
            Some(root) => {
                let checkpoint = store.get(&root)?.ok_or(CellError::MissingData(root))?;
                let entries = match checkpoint {
                    Value::Vector(SeqTree::Leaf(refs)) if refs.len() == 2 => refs,
                    other => return Err(ServerError::Fatal(format!("malformed checkpoint cell: {other:?}"))),
                };
                let state = match entries[0].resolve(store.as_ref())? {
                    Value::Record(r) => match *r {
                        Record::State(s) => s,
                        other => return Err(ServerError::Fatal(format!("checkpoint[0] is not a State: {other:?}"))),
                    },
                    other => return Err(ServerError::Fatal(format!("checkpoint[0] is not a Record: {other:?}"))),
                };
                let order = match entries[1].resolve(store.as_ref())? {
                    Value::Record(r) => match *r {
                        Record::Order(o) => o,
                        other => return Err(ServerError::Fatal(format!("checkpoint[1] is not an Order: {other:?}"))),
                    },
                    other => return Err(ServerError::Fatal(format!("checkpoint[1] is not a Record: {other:?}"))),
                };
                let (ledger, ts) = open_state(&state, store.as_ref())?;
                let view = order_to_order_view(&order, store.as_ref())?;
                let executed_up_to = view.consensus_point;
                (ledger, ts, ConsensusState::resume(own_id, view, executed_up_to))
            }
            None => {
                let mut ledger = Ledger::new();
                if let GenesisSource::Accounts(accounts) = &config.genesis_state_or_path {
                    for a in accounts {
                        ledger
                            .create_account(a.address, a.balance, a.is_actor)
                            .map_err(|e| ServerError::Fatal(e.to_string()))?;
                    }
                }
                (ledger, 0, ConsensusState::new(own_id))
            }
        };

        let mut staking = StakingLedger::default();
        if let GenesisSource::Accounts(accounts) = &config.genesis_state_or_path {
            for a in accounts {
                if a.self_stake > 0 {
                    let hex_key = a.public_key.as_deref().ok_or_else(|| {
                        ServerError::Config(format!("genesis account {} has self_stake but no public_key", a.address))
                    })?;
                    let pubkey = hex::decode(hex_key).map_err(|e| ServerError::Config(e.to_string()))?;
                    staking.validators.insert(
                        pubkey,
                        crate::core::economics::staking::Validator { commission_bps: 0, self_stake: a.self_stake, slashed: 0 },
                    );
                }
            }
        }

        let executor_config = ExecutorConfig {
            juice_price: 1,
            memory_price: 1,
            juice_limit: config.juice_limit,
            max_transactions_per_block: config.max_transactions_per_block,
            max_scheduled_per_block: config.max_scheduled_per_block,
        };

        Ok(Arc::new(Shared {
            store,
            config,
            identity,
            own_id,
            peer_table: PeerTable::new(),
            consensus: std::sync::Mutex::new(consensus),
            staking: std::sync::Mutex::new(staking),
            latest_state: ArcSwap::from_pointee(LatestState { ledger, global_timestamp }),
            trust,
            vm,
            executor_config,
            load: WorkerLoad::default(),
            known_orders: Mutex::new(BTreeMap::new()),
            belief_notify: Notify::new(),
            executor_notify: Notify::new(),
            clock: AtomicI64::new(global_timestamp),
        }))
    }

    /// Persist `ledger`/`order` as the new store root, so a restart resumes
    /// from here (§4.2 "root pointer file").
    pub fn checkpoint(&self, ledger: &Ledger, global_timestamp: i64, order: &Order) -> Result<(), ServerError> {
        let state = Record::State(build_state(ledger, global_timestamp)?);
        let root = checkpoint_ref(&state, order)?;
        let value = root.resolve(&crate::core::cell::ref_::NoContext)?;
        self.store.set_root(value)?;
        Ok(())
    }

    /// Sign and persist the current own order, broadcasting it if the merge
    /// round changed anything (called after `ConsensusState::merge`).
    pub fn order_as_record(&self) -> Result<Order, CellError> {
        let consensus = self.consensus.lock().unwrap();
        order_view_to_order(&consensus.own_order())
    }

    /// This peer's effective stake under the current staking ledger.
    pub fn own_effective_stake(&self) -> u128 {
        let staking = self.staking.lock().unwrap();
        staking.effective_stake(&self.identity.public_key(), 0)
    }

    /// Run one belief-merge round against every currently-known peer order,
    /// waking the belief propagator and/or CVM executor if anything
    /// changed. Called both after cutting a new block and after accepting
    /// a peer's updated order.
    pub fn merge_round(&self) {
        let mut consensus = self.consensus.lock().unwrap();
        let before = consensus.own_order().consensus_point;
        let stakes = self.peer_table.stakes_snapshot(&self.staking.lock().unwrap(), self.config.min_effective_stake);
        let own_stake = self.own_effective_stake();
        let result = consensus.merge(&stakes, own_stake);
        let advanced = consensus.own_order().consensus_point > before;
        drop(consensus);

        if result.should_rebroadcast {
            self.belief_notify.notify_one();
        }
        if advanced {
            self.executor_notify.notify_one();
        }
    }

    /// Build the `PeerStatus` vector a `Status` answer reports: every
    /// currently-connected peer's host and stake as this peer currently
    /// sees it.
    pub fn peer_statuses(&self) -> Vec<crate::core::cell::record::PeerStatus> {
        let staking = self.staking.lock().unwrap();
        self.peer_table
            .peer_records()
            .into_iter()
            .map(|(public_key, host)| {
                let validator = staking.validators.get(public_key.as_slice());
                let own_stake = validator.map(|v| v.self_stake).unwrap_or(0).min(i64::MAX as u128) as i64;
                let total = staking.effective_stake(&public_key, 0).min(i64::MAX as u128) as i64;
                crate::core::cell::record::PeerStatus {
                    own_stake,
                    delegated_stake: total.saturating_sub(own_stake),
                    public_key,
                    host,
                }
            })
            .collect()
    }

    /// Resolve a block by hash from the store.
    pub fn resolve_block(&self, hash: &Hash32) -> Result<crate::core::cell::record::Block, ServerError> {
        let value = self.store.get(hash)?.ok_or(CellError::MissingData(*hash))?;
        match value {
            Value::Record(r) => match *r {
                Record::Block(b) => Ok(b),
                other => Err(ServerError::Fatal(format!("hash {hash} is not a Block: {other:?}"))),
            },
            other => Err(ServerError::Fatal(format!("hash {hash} is not a Record: {other:?}"))),
        }
    }
}
