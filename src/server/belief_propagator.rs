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

//! Outbound gossip (§4.4, §4.6): whenever a merge round leaves this peer's
//! own order changed in a way worth telling others about, sign it and hand
//! the encoded multi-cell payload to every connected peer's outbox. The
//! connection manager owns the actual socket write and the per-connection
//! rate limiting; this worker only decides *when* there is something new
//! to say.

use crate::core::cell::collections::SeqTree;
use crate::core::cell::record::{Belief, Record};
use crate::core::cell::ref_::Ref;
use crate::core::cell::value::Value;
use crate::wire::message::sign_record;
use crate::wire::multicell::encode_message;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::warn;

use super::consensus_state::order_view_to_order;
use super::error::ServerError;
use super::shared::Shared;

/// Runs until the process exits, broadcasting this peer's own order every
/// time it is woken.
pub async fn run(shared: Arc<Shared>) {
    loop {
        shared.belief_notify.notified().await;
        if let Err(e) = broadcast_once(&shared) {
            warn!(error = %e, "belief broadcast failed");
        }
    }
}

fn broadcast_once(shared: &Arc<Shared>) -> Result<(), ServerError> {
    shared.load.belief_propagator.fetch_add(1, Ordering::Relaxed);
    let result = broadcast_once_inner(shared);
    shared.load.belief_propagator.fetch_sub(1, Ordering::Relaxed);
    result
}

fn broadcast_once_inner(shared: &Shared) -> Result<(), ServerError> {
    let own_order = {
        let consensus = shared.consensus.lock().unwrap();
        consensus.own_order()
    };
    let order = order_view_to_order(&own_order)?;
    let own_signed = sign_record(Record::Order(order), shared.identity.keypair())?;

    // Quick path (§4.4 optimization): the lone signed order, cheapest for a
    // directly-connected peer to merge.
    let quick_value = Value::SignedData(Box::new(own_signed.clone()));
    let quick_payload = encode_message(&quick_value, shared.store.as_ref())?;
    shared.peer_table.broadcast(quick_payload);

    // Full path (§4.5, the general mechanism): this peer's own order plus
    // every other peer's most recently seen signed order, relayed so peers
    // outside a full connection mesh still converge.
    let entries: Vec<Value> = {
        let mut known = shared.known_orders.lock().unwrap();
        known.insert(shared.own_id, own_signed);
        known.values().map(|sd| Value::SignedData(Box::new(sd.clone()))).collect()
    };
    let orders_tree = SeqTree::build(entries, Value::Vector)?;
    let belief = Belief { timestamp: shared.clock.load(Ordering::Relaxed), orders: Ref::new(Value::Vector(orders_tree))? };
    let belief_signed = sign_record(Record::Belief(belief), shared.identity.keypair())?;
    let belief_value = Value::SignedData(Box::new(belief_signed));
    let belief_payload = encode_message(&belief_value, shared.store.as_ref())?;
    shared.peer_table.broadcast(belief_payload);

    Ok(())
}
