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

//! One peer's view of the CPoS belief state (§4.4): its own order, the most
//! recent order it has heard from each other peer, and the bookkeeping the
//! executor needs to know which consensed blocks it has already applied.
//! The merge algorithm itself stays in [`crate::core::consensus::merge`];
//! this module only holds the state that algorithm is threaded through
//! round after round.

use crate::core::cell::collections::{BlobTree, SeqTree};
use crate::core::cell::error::CellError;
use crate::core::cell::hash::Hash32;
use crate::core::cell::record::Order;
use crate::core::cell::ref_::{DecodeContext, Ref};
use crate::core::cell::value::Value;
use crate::core::consensus::merge::{is_equivocation, merge_belief, MergeResult, OrderView, PeerId};
use std::collections::BTreeMap;

/// Encode an `OrderView`'s block hash sequence as the `Vector` cell
/// [`crate::core::cell::record::Order::blocks`] points to: one 32-byte
/// `Blob` per hash, in order.
pub fn order_view_to_order(view: &OrderView) -> Result<Order, CellError> {
    let elems = view
        .blocks
        .iter()
        .map(|h| Ok(Value::Blob(BlobTree::build(h.as_bytes().to_vec())?)))
        .collect::<Result<Vec<Value>, CellError>>()?;
    let tree = SeqTree::build(elems, Value::Vector)?;
    Ok(Order {
        blocks: Ref::new(Value::Vector(tree))?,
        proposal_point: view.proposal_point,
        consensus_point: view.consensus_point,
        finality_point: view.finality_point,
    })
}

/// Decode an `Order` cell back into the `OrderView` the merge algorithm
/// operates on.
pub fn order_to_order_view(order: &Order, ctx: &dyn DecodeContext) -> Result<OrderView, CellError> {
    let seq = match order.blocks.resolve(ctx)? {
        Value::Vector(t) => t,
        other => return Err(CellError::InvalidData(format!("order blocks is not a Vector: {other:?}"))),
    };
    let blocks = seq
        .to_vec(ctx)?
        .into_iter()
        .map(|v| match v {
            Value::Blob(t) => {
                let bytes = t.to_bytes(ctx)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| CellError::InvalidData("order block hash is not 32 bytes".into()))?;
                Ok(Hash32::from_bytes(arr))
            }
            other => Err(CellError::InvalidData(format!("order block entry is not a Blob: {other:?}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(OrderView {
        blocks,
        proposal_point: order.proposal_point,
        consensus_point: order.consensus_point,
        finality_point: order.finality_point,
    })
}

/// Mutable consensus bookkeeping for one running peer.
pub struct ConsensusState {
    own_id: PeerId,
    own: OrderView,
    peers: BTreeMap<PeerId, OrderView>,
    /// How many of `own.blocks`' hashes the CVM executor has already
    /// applied to the ledger. Always `<= own.consensus_point`.
    executed_up_to: u64,
}

impl ConsensusState {
    /// Start from an empty order, e.g. at genesis.
    pub fn new(own_id: PeerId) -> Self {
        Self {
            own_id,
            own: OrderView { blocks: Vec::new(), proposal_point: 0, consensus_point: 0, finality_point: 0 },
            peers: BTreeMap::new(),
            executed_up_to: 0,
        }
    }

    /// Resume from a previously-persisted order.
    pub fn resume(own_id: PeerId, own: OrderView, executed_up_to: u64) -> Self {
        Self { own_id, own, peers: BTreeMap::new(), executed_up_to }
    }

    /// This peer's own id.
    pub fn own_id(&self) -> PeerId {
        self.own_id
    }

    /// A read-only snapshot of this peer's own order.
    pub fn own_order(&self) -> OrderView {
        self.own.clone()
    }

    /// Append a newly-proposed block's hash to this peer's own order,
    /// advancing its proposal point.
    pub fn propose_block(&mut self, hash: Hash32) {
        self.own.blocks.push(hash);
        self.own.proposal_point = self.own.blocks.len() as u64;
    }

    /// Record (or reject) an incoming peer order. Returns `false` if it
    /// equivocates against the peer's own previously-recorded order, in
    /// which case it must not be merged (§7 `TrustError`).
    pub fn observe_peer_order(&mut self, peer: PeerId, order: OrderView) -> bool {
        if let Some(previous) = self.peers.get(&peer) {
            if is_equivocation(previous, &order) {
                return false;
            }
        }
        self.peers.insert(peer, order);
        true
    }

    /// Drop a peer's order, e.g. on disconnect.
    pub fn forget_peer(&mut self, peer: PeerId) {
        self.peers.remove(&peer);
    }

    /// Run one round of belief merge (§4.4) against every peer order heard
    /// so far, replacing this peer's own order with the result.
    pub fn merge(&mut self, stakes: &BTreeMap<PeerId, u128>, own_stake: u128) -> MergeResult {
        let result = merge_belief(&self.own, &self.peers, stakes, own_stake);
        self.own = result.order.clone();
        result
    }

    /// Block hashes in `own.blocks` between `executed_up_to` and
    /// `consensus_point` that the executor has not yet applied.
    pub fn newly_consensed_blocks(&self) -> Vec<Hash32> {
        let end = self.own.consensus_point as usize;
        if end <= self.executed_up_to as usize {
            return Vec::new();
        }
        self.own.blocks[self.executed_up_to as usize..end].to_vec()
    }

    /// Record that blocks up to `own.consensus_point` have been applied.
    pub fn mark_executed(&mut self, up_to: u64) {
        self.executed_up_to = self.executed_up_to.max(up_to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> Hash32 {
        Hash32::from_bytes([n; 32])
    }

    #[test]
    fn newly_consensed_blocks_tracks_execution_progress() {
        let mut state = ConsensusState::new(1);
        state.propose_block(h(1));
        state.propose_block(h(2));
        let mut peers = BTreeMap::new();
        peers.insert(2, OrderView { blocks: vec![h(1), h(2)], proposal_point: 2, consensus_point: 0, finality_point: 0 });
        let mut stakes = BTreeMap::new();
        stakes.insert(2, 100u128);
        state.merge(&stakes, 100);
        assert_eq!(state.own.consensus_point, 2);
        assert_eq!(state.newly_consensed_blocks(), vec![h(1), h(2)]);
        state.mark_executed(2);
        assert!(state.newly_consensed_blocks().is_empty());
    }

    #[test]
    fn order_view_roundtrips_through_order_cell() {
        use crate::core::cell::ref_::NoContext;
        let view = OrderView { blocks: vec![h(1), h(2), h(3)], proposal_point: 3, consensus_point: 1, finality_point: 0 };
        let order = order_view_to_order(&view).unwrap();
        let restored = order_to_order_view(&order, &NoContext).unwrap();
        assert_eq!(restored, view);
    }

    #[test]
    fn equivocating_peer_order_is_rejected() {
        let mut state = ConsensusState::new(1);
        let first = OrderView { blocks: vec![h(1)], proposal_point: 1, consensus_point: 1, finality_point: 0 };
        assert!(state.observe_peer_order(2, first));
        let rewritten = OrderView { blocks: vec![h(9)], proposal_point: 1, consensus_point: 1, finality_point: 0 };
        assert!(!state.observe_peer_order(2, rewritten));
    }
}
