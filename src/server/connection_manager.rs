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

//! Peer connections (§4.6, §6): accepts inbound TCP connections and dials
//! the configured outbound peers, runs the challenge/response identity
//! handshake on each, then routes every classified [`WireMessage`] to the
//! worker that owns it. Owns the only sockets in the process — every other
//! worker talks to a peer only through [`PeerTable::send_to`] /
//! [`PeerTable::broadcast`].

use crate::core::cell::message::{Challenge, ChallengeResponse, Message as WireCell};
use crate::core::cell::ref_::NoContext;
use crate::core::cell::value::Value;
use crate::networking::peer_score::Decision;
use crate::wire::error::WireError;
use crate::wire::frame::write_frame;
use crate::wire::message::{recv, send, WireMessage};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::config::PeerAddr;
use super::error::ServerError;
use super::query_processor::handle_query;
use super::rate_limit::TokenBucket;
use super::shared::Shared;

/// Outbound gossip messages are rate-limited per connection to this many
/// frames/sec (§4.6); well above what belief propagation or block gossip
/// would ever emit in steady state, it exists to bound a misbehaving or
/// compromised peer's ability to make this peer do unbounded work.
const OUTBOUND_FRAMES_PER_SEC: u32 = 200;

/// Runs the listener and outbound dialers until the process exits.
pub async fn run(shared: Arc<Shared>, tx_inbox: mpsc::UnboundedSender<crate::core::cell::signed::SignedData>) {
    let peers = shared.config.peer_peers.clone();
    for peer in peers {
        let shared = Arc::clone(&shared);
        let tx_inbox = tx_inbox.clone();
        tokio::spawn(async move {
            if let Err(e) = dial(&shared, &peer, tx_inbox).await {
                warn!(address = %peer.address, error = %e, "failed to dial peer");
            }
        });
    }

    let listener = match TcpListener::bind(("0.0.0.0", shared.config.listen_port)).await {
        Ok(l) => l,
        Err(e) => {
            warn!(error = %e, "failed to bind listen port; connection manager is not accepting inbound peers");
            return;
        }
    };
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let shared = Arc::clone(&shared);
                let tx_inbox = tx_inbox.clone();
                tokio::spawn(async move {
                    if let Err(e) = accept(&shared, stream, addr.to_string(), tx_inbox).await {
                        warn!(%addr, error = %e, "inbound connection failed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}

async fn dial(
    shared: &Arc<Shared>,
    peer: &PeerAddr,
    tx_inbox: mpsc::UnboundedSender<crate::core::cell::signed::SignedData>,
) -> Result<(), ServerError> {
    let expected = hex::decode(&peer.public_key).map_err(|e| ServerError::Config(e.to_string()))?;
    let expected: [u8; 32] = expected
        .try_into()
        .map_err(|_| ServerError::Config(format!("{} is not a 32-byte public key", peer.public_key)))?;
    if shared.peer_table.is_banned(&expected) {
        info!(address = %peer.address, "skipping dial to peer in ban cooldown");
        return Ok(());
    }
    let stream = TcpStream::connect(peer.address.as_str()).await.map_err(|e| ServerError::Fatal(e.to_string()))?;
    run_connection(shared, stream, Some(peer.address.clone()), Some(expected), tx_inbox).await
}

async fn accept(
    shared: &Arc<Shared>,
    stream: TcpStream,
    addr: String,
    tx_inbox: mpsc::UnboundedSender<crate::core::cell::signed::SignedData>,
) -> Result<(), ServerError> {
    run_connection(shared, stream, Some(addr), None, tx_inbox).await
}

async fn run_connection(
    shared: &Arc<Shared>,
    stream: TcpStream,
    host: Option<String>,
    expected_pubkey: Option<[u8; 32]>,
    tx_inbox: mpsc::UnboundedSender<crate::core::cell::signed::SignedData>,
) -> Result<(), ServerError> {
    let (mut rd, mut wr) = tokio::io::split(stream);
    let peer_pubkey = handshake(shared, &mut rd, &mut wr, expected_pubkey).await?;
    if shared.peer_table.is_banned(&peer_pubkey) {
        info!(peer = %hex::encode(peer_pubkey), "rejecting connection from peer in ban cooldown");
        return Ok(());
    }
    let peer_id = super::peer_table::peer_id_of(&peer_pubkey);

    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    shared.peer_table.register(peer_pubkey, host.clone(), outbox_tx);
    shared.load.connection_manager.fetch_add(1, Ordering::Relaxed);
    info!(peer_id, ?host, "peer connected");

    let writer_task = tokio::spawn(async move {
        let mut bucket = TokenBucket::new(OUTBOUND_FRAMES_PER_SEC);
        while let Some(payload) = outbox_rx.recv().await {
            if !bucket.allow() {
                continue;
            }
            if write_frame(&mut wr, &payload).await.is_err() {
                break;
            }
        }
    });

    let reader_result = read_loop(shared, &mut rd, peer_id, &peer_pubkey, &tx_inbox).await;
    writer_task.abort();
    shared.peer_table.remove(peer_id);
    shared.consensus.lock().unwrap().forget_peer(peer_id);
    shared.load.connection_manager.fetch_sub(1, Ordering::Relaxed);
    info!(peer_id, "peer disconnected");
    reader_result
}

/// Mutual identity handshake: each side sends a fresh nonce, then signs the
/// nonce it received back, proving ownership of its long-term key (§6).
async fn handshake<R, W>(
    shared: &Arc<Shared>,
    rd: &mut R,
    wr: &mut W,
    expected_pubkey: Option<[u8; 32]>,
) -> Result<[u8; 32], ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let rng = SystemRandom::new();
    let mut own_nonce = [0u8; 32];
    rng.fill(&mut own_nonce).map_err(|_| ServerError::Fatal("rng failure".into()))?;

    send(wr, &Value::Message(Box::new(WireCell::Challenge(Challenge { nonce: own_nonce }))), &NoContext).await?;
    let (msg, _ctx) = recv(rd).await?;
    let peer_nonce = match msg {
        WireMessage::Challenge(c) => c.nonce,
        _ => return Err(ServerError::Fatal("expected Challenge".into())),
    };

    let response = ChallengeResponse::sign(peer_nonce, shared.identity.keypair());
    send(wr, &Value::Message(Box::new(WireCell::ChallengeResponse(response))), &NoContext).await?;
    let (msg, _ctx) = recv(rd).await?;
    let response = match msg {
        WireMessage::ChallengeResponse(r) => r,
        _ => return Err(ServerError::Fatal("expected ChallengeResponse".into())),
    };
    if response.nonce != own_nonce || !response.verify() {
        return Err(ServerError::Fatal("handshake signature did not verify".into()));
    }
    if let Some(expected) = expected_pubkey {
        if response.public_key != expected {
            return Err(ServerError::Fatal("peer public key did not match configured address".into()));
        }
    }
    Ok(response.public_key)
}

async fn read_loop<R: AsyncRead + Unpin>(
    shared: &Arc<Shared>,
    rd: &mut R,
    peer_id: u64,
    peer_pubkey: &[u8; 32],
    tx_inbox: &mpsc::UnboundedSender<crate::core::cell::signed::SignedData>,
) -> Result<(), ServerError> {
    loop {
        let (message, ctx) = match recv(rd).await {
            Ok(m) => m,
            Err(WireError::Io(_)) | Err(WireError::Truncated) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        match message {
            WireMessage::Belief(signed) => {
                if signed.verify(&ctx).is_err() || signed.public_key != *peer_pubkey {
                    if ban(shared, peer_pubkey) {
                        return Ok(());
                    }
                    continue;
                }
                let belief = match signed.payload(&ctx) {
                    Ok(Value::Record(r)) => match *r {
                        crate::core::cell::record::Record::Belief(b) => b,
                        _ => {
                            if ban(shared, peer_pubkey) {
                                return Ok(());
                            }
                            continue;
                        }
                    },
                    _ => {
                        if ban(shared, peer_pubkey) {
                            return Ok(());
                        }
                        continue;
                    }
                };
                if apply_belief(shared, &belief, &ctx) {
                    good(shared, peer_pubkey);
                    shared.merge_round();
                }
            }
            WireMessage::SignedOrder(signed) => {
                if signed.verify(&ctx).is_err() || signed.public_key != *peer_pubkey {
                    if ban(shared, peer_pubkey) {
                        return Ok(());
                    }
                    continue;
                }
                let order = match signed.payload(&ctx) {
                    Ok(Value::Record(r)) => match *r {
                        crate::core::cell::record::Record::Order(o) => o,
                        _ => {
                            if ban(shared, peer_pubkey) {
                                return Ok(());
                            }
                            continue;
                        }
                    },
                    _ => {
                        if ban(shared, peer_pubkey) {
                            return Ok(());
                        }
                        continue;
                    }
                };
                let view = super::consensus_state::order_to_order_view(&order, &ctx)?;
                let accepted = shared.consensus.lock().unwrap().observe_peer_order(peer_id, view.clone());
                if accepted {
                    if let Ok(relay) = self_contained_signed_order(&view, &signed) {
                        shared.known_orders.lock().unwrap().insert(peer_id, relay);
                    }
                    good(shared, peer_pubkey);
                    shared.merge_round();
                } else if ban(shared, peer_pubkey) {
                    return Ok(());
                }
            }
            WireMessage::Transaction(signed) => {
                if signed.verify(&ctx).is_err() {
                    if ban(shared, peer_pubkey) {
                        return Ok(());
                    }
                    continue;
                }
                good(shared, peer_pubkey);
                let _ = tx_inbox.send(signed);
            }
            WireMessage::Query(query) => {
                good(shared, peer_pubkey);
                let result = handle_query(shared, query);
                let value = Value::Record(Box::new(crate::core::cell::record::Record::Result(result)));
                if let Ok(payload) = crate::wire::multicell::encode_message(&value, shared.store.as_ref()) {
                    shared.peer_table.send_to(peer_id, payload);
                }
            }
            WireMessage::Status(status) if status.peers.is_none() => {
                good(shared, peer_pubkey);
                respond_status(shared, peer_id);
            }
            WireMessage::Status(_) | WireMessage::Result(_) | WireMessage::Challenge(_) | WireMessage::ChallengeResponse(_) => {
                // Unsolicited status answers, stray results, and repeated
                // handshake cells outside the handshake phase are ignored
                // rather than penalized — they are not malformed, just not
                // useful here.
            }
        }
    }
}

/// Absorb a full `Belief` broadcast (§4.5): each embedded `SignedData` order
/// is independently verified and merged under *its own* signer's derived
/// peer id, not necessarily the connected socket's peer, so an order
/// relayed by a third party still reaches consensus bookkeeping. A
/// malformed individual entry is skipped rather than held against the
/// relaying peer, since it isn't necessarily at fault for someone else's
/// bad data. Returns `true` if at least one embedded order was newly
/// accepted.
fn apply_belief(shared: &Arc<Shared>, belief: &crate::core::cell::record::Belief, ctx: &dyn crate::core::cell::ref_::DecodeContext) -> bool {
    let entries = match belief.orders.resolve(ctx) {
        Ok(Value::Vector(tree)) => match tree.to_vec(ctx) {
            Ok(v) => v,
            Err(_) => return false,
        },
        _ => return false,
    };

    let mut any_accepted = false;
    for entry in entries {
        let inner = match entry {
            Value::SignedData(sd) => *sd,
            _ => continue,
        };
        if inner.verify(ctx).is_err() {
            continue;
        }
        let order = match inner.payload(ctx) {
            Ok(Value::Record(r)) => match *r {
                crate::core::cell::record::Record::Order(o) => o,
                _ => continue,
            },
            _ => continue,
        };
        let view = match super::consensus_state::order_to_order_view(&order, ctx) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let relay_peer = super::peer_table::peer_id_of(&inner.public_key);
        if relay_peer == shared.own_id {
            // A peer relaying this node's own order back inside its Belief.
            continue;
        }
        let accepted = shared.consensus.lock().unwrap().observe_peer_order(relay_peer, view.clone());
        if accepted {
            if let Ok(relay) = self_contained_signed_order(&view, &inner) {
                shared.known_orders.lock().unwrap().insert(relay_peer, relay);
            }
            any_accepted = true;
        }
    }
    any_accepted
}

/// Rebuild `signed`'s order payload from its already-decoded `view` so the
/// result carries its own value inline (`Ref::Embedded`/`Ref::Pending`)
/// rather than a `Ref::Hash` resolvable only through the connection's
/// now-discarded trailer context. `order_view_to_order` rebuilds the exact
/// same cell encoding the original signer produced from this view, so the
/// signature — computed over the original payload's content hash — still
/// verifies against it.
fn self_contained_signed_order(
    view: &crate::core::consensus::merge::OrderView,
    signed: &crate::core::cell::signed::SignedData,
) -> Result<crate::core::cell::signed::SignedData, crate::core::cell::error::CellError> {
    let order = super::consensus_state::order_view_to_order(view)?;
    let payload = crate::core::cell::ref_::Ref::new(Value::Record(Box::new(crate::core::cell::record::Record::Order(order))))?;
    Ok(crate::core::cell::signed::SignedData { signature: signed.signature, public_key: signed.public_key, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::hash::Hash32;
    use crate::core::cell::record::Record;
    use crate::core::cell::ref_::NoContext;
    use crate::core::cell::signed::SignedData;
    use crate::core::consensus::merge::OrderView;
    use ring::rand::SystemRandom;
    use ring::signature::Ed25519KeyPair;

    fn test_keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    #[test]
    fn self_contained_signed_order_still_verifies() {
        let kp = test_keypair();
        let view = OrderView {
            blocks: vec![Hash32::from_bytes([1; 32]), Hash32::from_bytes([2; 32])],
            proposal_point: 2,
            consensus_point: 1,
            finality_point: 0,
        };
        let order = super::super::consensus_state::order_view_to_order(&view).unwrap();
        let signed = crate::wire::message::sign_record(Record::Order(order), &kp).unwrap();
        assert!(signed.verify(&NoContext).is_ok());

        let rebuilt = self_contained_signed_order(&view, &signed).unwrap();
        assert_eq!(rebuilt.signature, signed.signature);
        assert_eq!(rebuilt.public_key, signed.public_key);
        assert!(rebuilt.verify(&NoContext).is_ok());
        match rebuilt.payload(&NoContext).unwrap() {
            crate::core::cell::value::Value::Record(r) => match *r {
                Record::Order(o) => {
                    let restored = super::super::consensus_state::order_to_order_view(&o, &NoContext).unwrap();
                    assert_eq!(restored, view);
                }
                other => panic!("expected Order, got {other:?}"),
            },
            other => panic!("expected Record, got {other:?}"),
        }
    }

    #[test]
    fn self_contained_signed_order_is_independent_of_the_original_payload_ref() {
        let kp = test_keypair();
        let view = OrderView { blocks: vec![Hash32::from_bytes([7; 32])], proposal_point: 1, consensus_point: 0, finality_point: 0 };
        let order = super::super::consensus_state::order_view_to_order(&view).unwrap();
        let signed = SignedData::sign(
            crate::core::cell::value::Value::Record(Box::new(Record::Order(order))),
            &kp,
        )
        .unwrap();
        let rebuilt = self_contained_signed_order(&view, &signed).unwrap();
        assert!(rebuilt.payload.is_embedded() || matches!(rebuilt.payload, crate::core::cell::ref_::Ref::Pending(_, _)));
    }
}

fn respond_status(shared: &Arc<Shared>, peer_id: u64) {
    let statuses = shared.peer_statuses();
    let elems: Vec<Value> = statuses
        .into_iter()
        .map(|p| Value::Record(Box::new(crate::core::cell::record::Record::PeerStatus(p))))
        .collect();
    let tree = match crate::core::cell::collections::SeqTree::build(elems, Value::Vector) {
        Ok(t) => t,
        Err(_) => return,
    };
    let peers_ref = match crate::core::cell::ref_::Ref::new(Value::Vector(tree)) {
        Ok(r) => r,
        Err(_) => return,
    };
    let value = Value::Message(Box::new(WireCell::Status(crate::core::cell::message::Status { peers: Some(peers_ref) })));
    if let Ok(payload) = crate::wire::multicell::encode_message(&value, shared.store.as_ref()) {
        shared.peer_table.send_to(peer_id, payload);
    }
}

fn good(shared: &Shared, pubkey: &[u8; 32]) {
    shared.peer_table.observe_good(pubkey);
}

/// Record a protocol violation from `pubkey`. Returns `true` if this
/// violation crossed the ban threshold, in which case the peer is placed in
/// the dial-exclusion cooldown and the caller must drop the connection.
fn ban(shared: &Shared, pubkey: &[u8; 32]) -> bool {
    if let Decision::Ban = shared.peer_table.observe_bad(pubkey) {
        shared.peer_table.ban(pubkey, super::peer_table::BAN_COOLDOWN);
        warn!(peer = %hex::encode(pubkey), cooldown_secs = super::peer_table::BAN_COOLDOWN.as_secs(), "peer banned for protocol violation, disconnecting");
        true
    } else {
        false
    }
}
