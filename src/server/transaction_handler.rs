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

//! Block assembly (§4.6, §6): drains the incoming transaction queue into
//! blocks of at most `max_transactions_per_block` signed transactions,
//! persists each block, appends its hash to this peer's own order, and runs
//! one belief-merge round against every currently-known peer order. Never
//! executes a transaction itself — that is the CVM executor's job, run only
//! once a block has crossed the consensus threshold.

use crate::core::cell::collections::SeqTree;
use crate::core::cell::record::{Block, Record};
use crate::core::cell::ref_::Ref;
use crate::core::cell::signed::SignedData;
use crate::core::cell::value::Value;
use crate::store::CellStatus;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use super::error::ServerError;
use super::shared::Shared;

/// Runs until `inbox` closes. Every signed transaction received is folded
/// into the next block; blocks are cut either when `max_transactions_per_block`
/// is reached or when the inbox is momentarily empty, whichever comes first,
/// so a lone transaction does not wait behind an arbitrary timer for others
/// that may never arrive.
pub async fn run(shared: Arc<Shared>, mut inbox: mpsc::UnboundedReceiver<SignedData>) {
    let mut batch = Vec::new();
    while let Some(first) = inbox.recv().await {
        batch.push(first);
        while batch.len() < shared.config.max_transactions_per_block {
            match inbox.try_recv() {
                Ok(tx) => batch.push(tx),
                Err(_) => break,
            }
        }
        let pending = std::mem::take(&mut batch);
        if let Err(e) = cut_block(&shared, pending) {
            tracing::warn!(error = %e, "failed to assemble block");
        }
    }
}

#[instrument(skip(shared, transactions))]
fn cut_block(shared: &Arc<Shared>, transactions: Vec<SignedData>) -> Result<(), ServerError> {
    shared.load.transaction_handler.fetch_add(1, Ordering::Relaxed);
    let result = assemble_and_merge(shared, transactions);
    shared.load.transaction_handler.fetch_sub(1, Ordering::Relaxed);
    result
}

fn assemble_and_merge(shared: &Arc<Shared>, transactions: Vec<SignedData>) -> Result<(), ServerError> {
    let timestamp = shared.clock.fetch_add(1, Ordering::SeqCst) + 1;
    let entries: Vec<Value> = transactions.into_iter().map(|s| Value::SignedData(Box::new(s))).collect();
    let count = entries.len();
    let tree = SeqTree::build(entries, Value::Vector)?;
    let block = Block { timestamp, transactions: Ref::new(Value::Vector(tree))? };
    let block_ref = Ref::new(Value::Record(Box::new(Record::Block(block))))?;
    let hash = block_ref.hash()?;
    shared.store.put(&block_ref, CellStatus::Proposed, &mut |_| {})?;
    info!(%hash, transactions = count, "block assembled");

    shared.consensus.lock().unwrap().propose_block(hash);
    shared.merge_round();
    Ok(())
}
