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

//! Applies newly-consensed blocks to the ledger (§4.5, §4.6): woken by
//! [`Shared::executor_notify`] whenever a merge round advances
//! `consensus_point` past what has already been executed, runs
//! [`crate::runtime::executor::execute_block`] over each such block in
//! order, swaps in the resulting ledger as the new `latest_state`
//! snapshot, and checkpoints it to the store.

use crate::core::cell::ref_::Ref;
use crate::core::cell::value::Value;
use crate::runtime::executor::execute_block;
use crate::store::CellStatus;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

use super::consensus_state::order_view_to_order;
use super::error::ServerError;
use super::shared::{LatestState, Shared};

/// Runs until the process exits, executing a batch of newly-consensed
/// blocks every time it is woken.
pub async fn run(shared: Arc<Shared>) {
    loop {
        shared.executor_notify.notified().await;
        if let Err(e) = execute_ready(&shared) {
            warn!(error = %e, "block execution failed");
        }
    }
}

fn execute_ready(shared: &Arc<Shared>) -> Result<(), ServerError> {
    shared.load.cvm_executor.fetch_add(1, Ordering::Relaxed);
    let result = execute_ready_inner(shared);
    shared.load.cvm_executor.fetch_sub(1, Ordering::Relaxed);
    result
}

fn execute_ready_inner(shared: &Arc<Shared>) -> Result<(), ServerError> {
    let hashes = {
        let consensus = shared.consensus.lock().unwrap();
        consensus.newly_consensed_blocks()
    };
    if hashes.is_empty() {
        return Ok(());
    }

    let current = shared.latest_state.load();
    let mut ledger = current.ledger.clone();
    let mut global_timestamp = current.global_timestamp;

    for hash in &hashes {
        let block = shared.resolve_block(hash)?;
        global_timestamp = block.timestamp;
        let record = execute_block(
            &mut ledger,
            shared.vm.as_ref(),
            shared.trust.as_ref(),
            &block,
            shared.store.as_ref(),
            &shared.executor_config,
        )?;
        let result_ref = Ref::new(Value::Record(Box::new(record)))?;
        shared.store.put(&result_ref, CellStatus::Consensus, &mut |_| {})?;
        info!(%hash, "block executed");
    }

    shared.latest_state.store(Arc::new(LatestState { ledger: ledger.clone(), global_timestamp }));

    let order = {
        let mut consensus = shared.consensus.lock().unwrap();
        let up_to = consensus.own_order().consensus_point;
        consensus.mark_executed(up_to);
        order_view_to_order(&consensus.own_order())?
    };
    shared.checkpoint(&ledger, global_timestamp, &order)?;
    Ok(())
}
