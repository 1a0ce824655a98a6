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
#![deny(missing_docs)]

//! Convergent Proof-of-Stake belief merge (§4.4): a pure function from the
//! set of orders a peer has observed to a single merged order, with no
//! leader election, voting round, or view-change. Two peers that have seen
//! the same set of orders always compute the same merge result.
//!
//! The merge operates over block *hashes* only ([`OrderView`]); materializing
//! block contents is the caller's job (via the content-addressed store),
//! kept out of this module so the algorithm itself stays allocation-light
//! and trivially testable without a store.

use crate::core::cell::hash::Hash32;
use std::collections::BTreeMap;

/// One peer's order, reduced to what the merge algorithm needs: its block
/// hash sequence and its three consensus pointers (§4.4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderView {
    pub blocks: Vec<Hash32>,
    pub proposal_point: u64,
    pub consensus_point: u64,
    pub finality_point: u64,
}

impl OrderView {
    fn block_at(&self, i: usize) -> Option<Hash32> {
        self.blocks.get(i).copied()
    }
}

/// The result of merging one peer's own order against a set of observed
/// peer orders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeResult {
    pub order: OrderView,
    /// True iff this merge changed the proposal tip, consensus point, or
    /// finality point relative to the peer's previous own order — i.e. this
    /// peer has new information worth rebroadcasting immediately rather
    /// than waiting for the next batch (the "quick broadcast" optimization,
    /// §4.4).
    pub should_rebroadcast: bool,
}

/// A peer identity plus its effective stake, for quorum weighting.
pub type PeerId = u64;

/// Merge `own` against `peers` (every other peer's most recent known
/// order), weighting agreement by `stakes`. `own` is always included in the
/// winning-prefix computation, guaranteeing the merge never discards a
/// peer's own proposed blocks without stake-weighted cause.
pub fn merge_belief(
    own: &OrderView,
    peers: &BTreeMap<PeerId, OrderView>,
    stakes: &BTreeMap<PeerId, u128>,
    own_stake: u128,
) -> MergeResult {
    let total_stake: u128 = own_stake.saturating_add(stakes.values().sum());

    let max_len = peers
        .values()
        .map(|o| o.blocks.len())
        .chain(std::iter::once(own.blocks.len()))
        .max()
        .unwrap_or(0);

    // Step 1: build the winning block sequence position by position. Once a
    // position has no agreed winner, the sequence stops growing there — an
    // unresolved fork further out never contaminates an agreed-upon prefix.
    let mut winning_blocks: Vec<Hash32> = Vec::with_capacity(max_len);
    for i in 0..max_len {
        let mut support: BTreeMap<Hash32, u128> = BTreeMap::new();
        if let Some(h) = own.block_at(i) {
            *support.entry(h).or_insert(0) += own_stake;
        }
        for (peer, order) in peers {
            if let Some(h) = order.block_at(i) {
                let stake = stakes.get(peer).copied().unwrap_or(0);
                *support.entry(h).or_insert(0) += stake;
            }
        }
        if support.is_empty() {
            break;
        }
        // Winner: highest stake; ties broken by preferring own order's block,
        // then lowest hash (deterministic across peers).
        let own_candidate = own.block_at(i);
        let winner = support
            .iter()
            .max_by(|(ha, sa), (hb, sb)| {
                sa.cmp(sb)
                    .then_with(|| (Some(**ha) == own_candidate).cmp(&(Some(**hb) == own_candidate)))
                    .then_with(|| hb.cmp(ha))
            })
            .map(|(h, _)| *h);
        match winner {
            Some(h) => winning_blocks.push(h),
            None => break,
        }
    }

    // Step 2: consensus point — longest prefix whose stake-weighted
    // agreement with `winning_blocks` exceeds 2/3 of total stake (§4.4).
    let mut consensus_point: u64 = 0;
    for l in 1..=winning_blocks.len() {
        let mut agreeing = own_stake * matches(own, &winning_blocks, l) as u128;
        for (peer, order) in peers {
            let stake = stakes.get(peer).copied().unwrap_or(0);
            agreeing += stake * matches(order, &winning_blocks, l) as u128;
        }
        if super::signing::meets_quorum(agreeing, total_stake) {
            consensus_point = l as u64;
        }
    }

    // Step 3: finality point — longest prefix, bounded by consensus_point,
    // that a stake-weighted quorum of peers had *already* marked as their
    // own consensus point (a second independent round of agreement, so a
    // prefix can't finalize in the same round it first reaches consensus).
    let mut finality_point: u64 = 0;
    for l in 1..=consensus_point {
        let mut agreeing = own_stake * (own.consensus_point >= l) as u128;
        for (peer, order) in peers {
            let stake = stakes.get(peer).copied().unwrap_or(0);
            agreeing += stake * (order.consensus_point >= l) as u128;
        }
        if super::signing::meets_quorum(agreeing, total_stake) {
            finality_point = l;
        }
    }

    let proposal_point = winning_blocks.len() as u64;
    let merged = OrderView { blocks: winning_blocks, proposal_point, consensus_point, finality_point };

    let should_rebroadcast = merged.proposal_point != own.proposal_point
        || merged.consensus_point != own.consensus_point
        || merged.finality_point != own.finality_point;

    MergeResult { order: merged, should_rebroadcast }
}

fn matches(order: &OrderView, winning: &[Hash32], len: usize) -> bool {
    if order.blocks.len() < len {
        return false;
    }
    order.blocks[..len] == winning[..len]
}

/// Non-equivocation check (§4.4, §7 TrustError): a peer's new order is
/// acceptable only if it doesn't rewrite any block already below that
/// peer's own previously-announced `consensus_point` — a peer that does
/// this is equivocating and its update should be rejected, not merged.
pub fn is_equivocation(previous: &OrderView, incoming: &OrderView) -> bool {
    let guarded = previous.consensus_point as usize;
    if incoming.blocks.len() < guarded || previous.blocks.len() < guarded {
        return true;
    }
    previous.blocks[..guarded] != incoming.blocks[..guarded]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> Hash32 {
        Hash32::from_bytes([n; 32])
    }

    #[test]
    fn unanimous_prefix_reaches_consensus_and_finality_over_two_rounds() {
        let own = OrderView { blocks: vec![h(1), h(2)], proposal_point: 2, consensus_point: 0, finality_point: 0 };
        let mut peers = BTreeMap::new();
        peers.insert(1, OrderView { blocks: vec![h(1), h(2)], proposal_point: 2, consensus_point: 0, finality_point: 0 });
        peers.insert(2, OrderView { blocks: vec![h(1), h(2)], proposal_point: 2, consensus_point: 0, finality_point: 0 });
        let mut stakes = BTreeMap::new();
        stakes.insert(1, 100u128);
        stakes.insert(2, 100u128);

        let round1 = merge_belief(&own, &peers, &stakes, 100);
        assert_eq!(round1.order.consensus_point, 2);
        assert_eq!(round1.order.finality_point, 0);
        assert!(round1.should_rebroadcast);

        // Round 2: everyone has now observed round 1's consensus_point.
        for p in peers.values_mut() {
            p.consensus_point = 2;
        }
        let own_round2 = OrderView { consensus_point: 2, ..round1.order.clone() };
        let round2 = merge_belief(&own_round2, &peers, &stakes, 100);
        assert_eq!(round2.order.finality_point, 2);
    }

    #[test]
    fn fork_below_quorum_does_not_reach_consensus() {
        let own = OrderView { blocks: vec![h(1)], proposal_point: 1, consensus_point: 0, finality_point: 0 };
        let mut peers = BTreeMap::new();
        peers.insert(1, OrderView { blocks: vec![h(9)], proposal_point: 1, consensus_point: 0, finality_point: 0 });
        let mut stakes = BTreeMap::new();
        stakes.insert(1, 100u128);

        let result = merge_belief(&own, &peers, &stakes, 100);
        assert_eq!(result.order.consensus_point, 0);
    }

    #[test]
    fn equivocation_below_consensus_point_is_detected() {
        let previous = OrderView { blocks: vec![h(1), h(2)], proposal_point: 2, consensus_point: 1, finality_point: 0 };
        let rewritten = OrderView { blocks: vec![h(9), h(2)], proposal_point: 2, consensus_point: 1, finality_point: 0 };
        assert!(is_equivocation(&previous, &rewritten));

        let extended = OrderView { blocks: vec![h(1), h(2), h(3)], proposal_point: 3, consensus_point: 1, finality_point: 0 };
        assert!(!is_equivocation(&previous, &extended));
    }
}
