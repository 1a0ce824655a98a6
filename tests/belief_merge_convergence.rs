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

use convergentledger::core::cell::hash::Hash32;
use convergentledger::core::consensus::merge::{merge_belief, OrderView};
use std::collections::BTreeMap;

fn h(n: u8) -> Hash32 {
    Hash32::from_bytes([n; 32])
}

fn order(blocks: &[u8]) -> OrderView {
    OrderView { blocks: blocks.iter().map(|&n| h(n)).collect(), proposal_point: blocks.len() as u64, consensus_point: 0, finality_point: 0 }
}

/// Three equally-staked peers propose the same three blocks in the same
/// order; once all three orders are visible to each peer, every peer's
/// merge round must reach the same consensus point without any leader or
/// voting round.
#[test]
fn three_peers_agreeing_on_order_reach_consensus() {
    let a = order(&[1, 2, 3]);
    let b = order(&[1, 2, 3]);
    let c = order(&[1, 2, 3]);

    let mut stakes = BTreeMap::new();
    stakes.insert(2u64, 100u128);
    stakes.insert(3u64, 100u128);
    let own_stake = 100u128;

    let mut peers = BTreeMap::new();
    peers.insert(2, b.clone());
    peers.insert(3, c.clone());

    let result = merge_belief(&a, &peers, &stakes, own_stake);
    // 3-of-3 stake agrees on all three blocks, comfortably above the 2/3
    // threshold, so the whole prefix reaches consensus in one round.
    assert_eq!(result.order.consensus_point, 3);
    assert_eq!(result.order.blocks, vec![h(1), h(2), h(3)]);
    assert!(result.should_rebroadcast);

    // A second round against the same peer orders is a no-op: nothing new
    // to say, so nothing should be rebroadcast.
    let mut peers_after = BTreeMap::new();
    peers_after.insert(2, b);
    peers_after.insert(3, c);
    let again = merge_belief(&result.order, &peers_after, &stakes, own_stake);
    assert!(!again.should_rebroadcast);
}

/// A minority peer proposing a conflicting block at position 0 cannot move
/// consensus away from the majority's agreed block, since it never commands
/// a stake-weighted quorum.
#[test]
fn minority_fork_does_not_reach_quorum() {
    let own = order(&[1]);
    let mut peers = BTreeMap::new();
    peers.insert(2, order(&[9])); // disagrees on block 0
    peers.insert(3, order(&[1])); // agrees with own

    let mut stakes = BTreeMap::new();
    stakes.insert(2, 32u128);
    stakes.insert(3, 34u128);
    let own_stake = 34u128;

    // own + peer 3 = 68/100 stake agreeing on block `1`, above the 2/3 quorum.
    let result = merge_belief(&own, &peers, &stakes, own_stake);
    assert_eq!(result.order.blocks, vec![h(1)]);
    assert_eq!(result.order.consensus_point, 1);
}

/// A three-way split, where the plurality winner still commands less than
/// a 2/3 quorum overall, proposes a block but never finalizes consensus on
/// it.
#[test]
fn three_way_split_blocks_consensus() {
    let own = order(&[1]); // block `1`, 40 stake
    let mut peers = BTreeMap::new();
    peers.insert(2, order(&[2])); // block `2`, 35 stake
    peers.insert(3, order(&[3])); // block `3`, 25 stake

    let mut stakes = BTreeMap::new();
    stakes.insert(2, 35u128);
    stakes.insert(3, 25u128);
    let own_stake = 40u128;

    let result = merge_belief(&own, &peers, &stakes, own_stake);
    // Own's block wins the position on plurality stake, but only 40/100
    // peers actually agree with it post-merge, short of the 2/3 quorum.
    assert_eq!(result.order.blocks, vec![h(1)]);
    assert_eq!(result.order.proposal_point, 1);
    assert_eq!(result.order.consensus_point, 0);
}
