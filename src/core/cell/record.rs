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

//! Consensus and ledger-state record cells (§4.3, §4.4): `Block`, `Order`,
//! `Belief`, `State`, `Result`, `BlockResult`, `PeerStatus`, `AccountStatus`.
//! These are ordinary cells — content-addressed and embeddable under the
//! same rule as everything else — but their fields are fixed by position
//! rather than named, matching the positional encoding the rest of the
//! cell family uses.

use super::error::CellError;
use super::hash::Hash32;
use super::ref_::Ref;
use super::tag::*;
use super::vlc::{decode_vlc_count, decode_vlc_i64, encode_vlc_count, encode_vlc_i64};

/// A batch of transactions proposed by one peer at one logical instant.
/// Always carried wrapped in a [`super::signed::SignedData`] so its
/// `timestamp`/`peer` attribution is authenticated.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub timestamp: i64,
    pub transactions: Ref,
}

/// One peer's ordering of blocks, with the three monotonic consensus
/// pointers (§4.4): `proposal <= consensus <= finality <= blocks.len()`.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub blocks: Ref,
    pub proposal_point: u64,
    pub consensus_point: u64,
    pub finality_point: u64,
}

/// A peer's belief: its own signed order plus the most recent signed orders
/// it has observed from its peers, keyed by peer address.
#[derive(Clone, Debug, PartialEq)]
pub struct Belief {
    pub timestamp: i64,
    pub orders: Ref,
}

/// The full ledger state at a given point: account table, global clock, and
/// the pending scheduled-transaction queue (§4.5).
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub accounts: Ref,
    pub global_timestamp: i64,
    pub scheduled: Ref,
}

/// The outcome of executing a single transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct TxResult {
    pub value: Ref,
    pub error_code: Option<String>,
}

/// The outcomes of executing every transaction in a block, plus the
/// resulting state hash.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockResult {
    pub results: Ref,
    pub state_hash: Hash32,
}

/// A peer's staking and network-identity record.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerStatus {
    pub own_stake: i64,
    pub delegated_stake: i64,
    pub public_key: [u8; 32],
    pub host: Option<String>,
}

/// An account's balance, sequence counter, and (for actors) environment.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountStatus {
    pub sequence: u64,
    pub balance: i64,
    pub is_actor: bool,
    pub environment: Option<Ref>,
}

/// Any of the record cell shapes.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Block(Block),
    Order(Order),
    Belief(Belief),
    State(State),
    Result(TxResult),
    BlockResult(BlockResult),
    PeerStatus(PeerStatus),
    AccountStatus(AccountStatus),
}

fn encode_opt_ref(out: &mut Vec<u8>, r: &Option<Ref>) -> Result<(), CellError> {
    match r {
        Some(r) => {
            out.push(1);
            r.encode(out)
        }
        None => {
            out.push(0);
            Ok(())
        }
    }
}

fn decode_opt_ref(bytes: &[u8], offset: usize) -> Result<(Option<Ref>, usize), CellError> {
    if offset >= bytes.len() {
        return Err(CellError::bad_format(0, offset));
    }
    match bytes[offset] {
        0 => Ok((None, offset + 1)),
        1 => {
            let (r, p) = Ref::decode(bytes, offset + 1)?;
            Ok((Some(r), p))
        }
        other => Err(CellError::bad_format(other, offset)),
    }
}

fn encode_opt_string(out: &mut Vec<u8>, s: &Option<String>) {
    match s {
        Some(s) => {
            out.push(1);
            encode_vlc_count(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        None => out.push(0),
    }
}

fn decode_opt_string(bytes: &[u8], offset: usize) -> Result<(Option<String>, usize), CellError> {
    if offset >= bytes.len() {
        return Err(CellError::bad_format(0, offset));
    }
    match bytes[offset] {
        0 => Ok((None, offset + 1)),
        1 => {
            let (len, p) = decode_vlc_count(bytes, offset + 1)?;
            let len = len as usize;
            let end = p + len;
            if end > bytes.len() {
                return Err(CellError::bad_format(1, p));
            }
            let s = std::str::from_utf8(&bytes[p..end])
                .map_err(|_| CellError::InvalidData("string field is not valid utf-8".into()))?
                .to_string();
            Ok((Some(s), end))
        }
        other => Err(CellError::bad_format(other, offset)),
    }
}

impl Record {
    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            Record::Block(b) => {
                out.push(TAG_BLOCK);
                encode_vlc_i64(out, b.timestamp);
                b.transactions.encode(out)?;
            }
            Record::Order(o) => {
                out.push(TAG_ORDER);
                o.blocks.encode(out)?;
                encode_vlc_count(out, o.proposal_point);
                encode_vlc_count(out, o.consensus_point);
                encode_vlc_count(out, o.finality_point);
            }
            Record::Belief(b) => {
                out.push(TAG_BELIEF);
                encode_vlc_i64(out, b.timestamp);
                b.orders.encode(out)?;
            }
            Record::State(s) => {
                out.push(TAG_STATE);
                s.accounts.encode(out)?;
                encode_vlc_i64(out, s.global_timestamp);
                s.scheduled.encode(out)?;
            }
            Record::Result(r) => {
                out.push(TAG_RESULT);
                r.value.encode(out)?;
                encode_opt_string(out, &r.error_code);
            }
            Record::BlockResult(br) => {
                out.push(TAG_BLOCK_RESULT);
                br.results.encode(out)?;
                out.extend_from_slice(br.state_hash.as_bytes());
            }
            Record::PeerStatus(p) => {
                out.push(TAG_PEER_STATUS);
                encode_vlc_i64(out, p.own_stake);
                encode_vlc_i64(out, p.delegated_stake);
                out.extend_from_slice(&p.public_key);
                encode_opt_string(out, &p.host);
            }
            Record::AccountStatus(a) => {
                out.push(TAG_ACCOUNT_STATUS);
                encode_vlc_count(out, a.sequence);
                encode_vlc_i64(out, a.balance);
                out.push(if a.is_actor { 1 } else { 0 });
                encode_opt_ref(out, &a.environment)?;
            }
        }
        Ok(())
    }

    pub(super) fn decode(bytes: &[u8], offset: usize) -> Result<(Record, usize), CellError> {
        if offset >= bytes.len() {
            return Err(CellError::bad_format(0, offset));
        }
        let tag = bytes[offset];
        let pos = offset + 1;
        match tag {
            TAG_BLOCK => {
                let (timestamp, p1) = decode_vlc_i64(bytes, pos)?;
                let (transactions, p2) = Ref::decode(bytes, p1)?;
                Ok((Record::Block(Block { timestamp, transactions }), p2))
            }
            TAG_ORDER => {
                let (blocks, p1) = Ref::decode(bytes, pos)?;
                let (proposal_point, p2) = decode_vlc_count(bytes, p1)?;
                let (consensus_point, p3) = decode_vlc_count(bytes, p2)?;
                let (finality_point, p4) = decode_vlc_count(bytes, p3)?;
                if !(proposal_point <= consensus_point && consensus_point <= finality_point) {
                    return Err(CellError::InvalidData(
                        "order consensus pointers must satisfy proposal <= consensus <= finality".into(),
                    ));
                }
                Ok((Record::Order(Order { blocks, proposal_point, consensus_point, finality_point }), p4))
            }
            TAG_BELIEF => {
                let (timestamp, p1) = decode_vlc_i64(bytes, pos)?;
                let (orders, p2) = Ref::decode(bytes, p1)?;
                Ok((Record::Belief(Belief { timestamp, orders }), p2))
            }
            TAG_STATE => {
                let (accounts, p1) = Ref::decode(bytes, pos)?;
                let (global_timestamp, p2) = decode_vlc_i64(bytes, p1)?;
                let (scheduled, p3) = Ref::decode(bytes, p2)?;
                Ok((Record::State(State { accounts, global_timestamp, scheduled }), p3))
            }
            TAG_RESULT => {
                let (value, p1) = Ref::decode(bytes, pos)?;
                let (error_code, p2) = decode_opt_string(bytes, p1)?;
                Ok((Record::Result(TxResult { value, error_code }), p2))
            }
            TAG_BLOCK_RESULT => {
                let (results, p1) = Ref::decode(bytes, pos)?;
                let end = p1 + 32;
                if end > bytes.len() {
                    return Err(CellError::bad_format(tag, p1));
                }
                let mut h = [0u8; 32];
                h.copy_from_slice(&bytes[p1..end]);
                Ok((Record::BlockResult(BlockResult { results, state_hash: Hash32::from_bytes(h) }), end))
            }
            TAG_PEER_STATUS => {
                let (own_stake, p1) = decode_vlc_i64(bytes, pos)?;
                let (delegated_stake, p2) = decode_vlc_i64(bytes, p1)?;
                let end = p2 + 32;
                if end > bytes.len() {
                    return Err(CellError::bad_format(tag, p2));
                }
                let mut pk = [0u8; 32];
                pk.copy_from_slice(&bytes[p2..end]);
                let (host, p3) = decode_opt_string(bytes, end)?;
                Ok((Record::PeerStatus(PeerStatus { own_stake, delegated_stake, public_key: pk, host }), p3))
            }
            TAG_ACCOUNT_STATUS => {
                let (sequence, p1) = decode_vlc_count(bytes, pos)?;
                let (balance, p2) = decode_vlc_i64(bytes, p1)?;
                if p2 >= bytes.len() {
                    return Err(CellError::bad_format(tag, p2));
                }
                let is_actor = match bytes[p2] {
                    0 => false,
                    1 => true,
                    other => return Err(CellError::bad_format(other, p2)),
                };
                let (environment, p3) = decode_opt_ref(bytes, p2 + 1)?;
                Ok((Record::AccountStatus(AccountStatus { sequence, balance, is_actor, environment }), p3))
            }
            other => Err(CellError::bad_format(other, offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::value::Value;

    #[test]
    fn account_status_roundtrip() {
        let rec = Record::AccountStatus(AccountStatus {
            sequence: 12,
            balance: 1_000_000,
            is_actor: false,
            environment: None,
        });
        let mut out = Vec::new();
        rec.encode(&mut out).unwrap();
        let (decoded, used) = Record::decode(&out, 0).unwrap();
        assert_eq!(used, out.len());
        assert_eq!(decoded, rec);
    }

    #[test]
    fn order_rejects_out_of_order_pointers() {
        let blocks = Ref::new(Value::Long(0)).unwrap();
        let rec = Record::Order(Order { blocks, proposal_point: 5, consensus_point: 2, finality_point: 2 });
        let mut out = Vec::new();
        rec.encode(&mut out).unwrap();
        assert!(Record::decode(&out, 0).is_err());
    }
}
