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

//! The set of currently-connected peers: their derived [`PeerId`], raw
//! public key, and an outbound channel the belief propagator and
//! connection manager write framed messages onto. Bridges
//! [`crate::core::consensus::merge`]'s `u64`-keyed `PeerId` world to
//! [`crate::core::economics::staking`]'s pubkey-keyed validator world using
//! the same derivation [`crate::runtime::executor::derive_address`] already
//! uses for account addresses, so a validator's stake and its gossip
//! connection resolve to the same identity.

use crate::core::consensus::merge::PeerId;
use crate::core::economics::staking::StakingLedger;
use crate::networking::peer_score::{Decision, PeerScore, ScoreParams};
use crate::runtime::executor::derive_address;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// How long a banned peer is excluded from both inbound acceptance and
/// outbound dialing once its ban cooldown starts (§4.6 "peer scoring for
/// gossip backpressure").
pub const BAN_COOLDOWN: Duration = Duration::from_secs(300);

/// Derive the [`PeerId`] a validator's raw public key is known by in the
/// belief-merge machinery.
pub fn peer_id_of(public_key: &[u8; 32]) -> PeerId {
    derive_address(public_key)
}

/// One connected peer's routing and identity information.
struct PeerEntry {
    public_key: [u8; 32],
    host: Option<String>,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
}

/// Connected peers plus their gossip reputation.
pub struct PeerTable {
    entries: Mutex<BTreeMap<PeerId, PeerEntry>>,
    score: Mutex<PeerScore>,
    /// Public keys currently serving out a post-ban cooldown, keyed to the
    /// instant the cooldown ends.
    banned: Mutex<BTreeMap<[u8; 32], Instant>>,
}

impl PeerTable {
    /// An empty peer table with default scoring parameters (§4.6
    /// "peer scoring for gossip backpressure").
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            score: Mutex::new(PeerScore::new(ScoreParams::default())),
            banned: Mutex::new(BTreeMap::new()),
        }
    }

    /// Exclude `public_key` from future inbound acceptance and outbound
    /// dialing for `cooldown`.
    pub fn ban(&self, public_key: &[u8; 32], cooldown: Duration) {
        self.banned.lock().unwrap().insert(*public_key, Instant::now() + cooldown);
    }

    /// True iff `public_key` is currently serving out a ban cooldown.
    /// Expired entries are pruned opportunistically as they're observed.
    pub fn is_banned(&self, public_key: &[u8; 32]) -> bool {
        let mut banned = self.banned.lock().unwrap();
        match banned.get(public_key) {
            Some(until) if *until > Instant::now() => true,
            Some(_) => {
                banned.remove(public_key);
                false
            }
            None => false,
        }
    }

    /// Register a newly-handshaken connection, returning its derived
    /// `PeerId`.
    pub fn register(&self, public_key: [u8; 32], host: Option<String>, outbox: mpsc::UnboundedSender<Vec<u8>>) -> PeerId {
        let id = peer_id_of(&public_key);
        self.entries.lock().unwrap().insert(id, PeerEntry { public_key, host, outbox });
        id
    }

    /// Drop a connection, e.g. on disconnect or ban.
    pub fn remove(&self, id: PeerId) {
        self.entries.lock().unwrap().remove(&id);
    }

    /// Send an encoded multi-cell message payload to one connected peer;
    /// the connection's writer task applies length-prefix framing and rate
    /// limiting before it touches the socket. Silently drops if the peer is
    /// no longer connected or its outbox is closed.
    pub fn send_to(&self, id: PeerId, payload: Vec<u8>) {
        if let Some(entry) = self.entries.lock().unwrap().get(&id) {
            let _ = entry.outbox.send(payload);
        }
    }

    /// Broadcast an encoded multi-cell message payload to every
    /// currently-connected peer.
    pub fn broadcast(&self, payload: Vec<u8>) {
        let entries = self.entries.lock().unwrap();
        for entry in entries.values() {
            let _ = entry.outbox.send(payload.clone());
        }
    }

    /// Currently-connected peer ids.
    pub fn connected_ids(&self) -> Vec<PeerId> {
        self.entries.lock().unwrap().keys().copied().collect()
    }

    /// Snapshot of connected peers' hosts, for `Status` responses.
    pub fn hosts(&self) -> BTreeMap<PeerId, Option<String>> {
        self.entries.lock().unwrap().iter().map(|(id, e)| (*id, e.host.clone())).collect()
    }

    /// Snapshot of every connected peer's identity and host, for building a
    /// `Status` answer's `PeerStatus` vector.
    pub fn peer_records(&self) -> Vec<([u8; 32], Option<String>)> {
        self.entries.lock().unwrap().values().map(|e| (e.public_key, e.host.clone())).collect()
    }

    /// Effective stake of every currently-connected peer (§4.4), keyed the
    /// way [`crate::core::consensus::merge::merge_belief`] needs it.
    pub fn stakes_snapshot(&self, staking: &StakingLedger, min_effective_stake: u128) -> BTreeMap<PeerId, u128> {
        let entries = self.entries.lock().unwrap();
        entries
            .values()
            .map(|e| (peer_id_of(&e.public_key), staking.effective_stake(&e.public_key, min_effective_stake)))
            .collect()
    }

    /// Record a well-formed, useful message from `peer`, returning the
    /// resulting gossip decision.
    pub fn observe_good(&self, public_key: &[u8; 32]) -> Decision {
        self.score.lock().unwrap().observe_good(public_key.to_vec(), Instant::now(), 1)
    }

    /// Record a malformed message or a protocol violation from `peer`.
    pub fn observe_bad(&self, public_key: &[u8; 32]) -> Decision {
        self.score.lock().unwrap().observe_bad(public_key.to_vec(), Instant::now(), 1)
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_excludes_for_the_cooldown_then_expires() {
        let table = PeerTable::new();
        let key = [7u8; 32];
        assert!(!table.is_banned(&key));

        table.ban(&key, Duration::from_millis(20));
        assert!(table.is_banned(&key));

        std::thread::sleep(Duration::from_millis(30));
        assert!(!table.is_banned(&key));
    }

    #[test]
    fn unrelated_peer_is_unaffected_by_a_ban() {
        let table = PeerTable::new();
        table.ban(&[1u8; 32], Duration::from_secs(60));
        assert!(!table.is_banned(&[2u8; 32]));
    }
}
