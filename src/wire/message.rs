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

//! The seven message kinds a peer connection carries (§6), layered on top of
//! [`super::frame`] (length-prefixed transport) and [`super::multicell`]
//! (first-cell-plus-trailers encoding). A message's kind is never carried
//! out-of-band — it is read off the first cell's own tag, exactly as §6
//! specifies.

use super::error::WireError;
use super::multicell::{decode_message, encode_message, TrailerContext};
use crate::core::cell::message::{Challenge, ChallengeResponse, Message as WireCell, Query, Status};
use crate::core::cell::record::{Record, TxResult};
use crate::core::cell::ref_::DecodeContext;
use crate::core::cell::signed::SignedData;
use crate::core::cell::value::Value;
use tokio::io::{AsyncRead, AsyncWrite};

/// A fully classified incoming message, its kind read off the first cell.
pub enum WireMessage {
    /// Full Belief broadcast.
    Belief(SignedData),
    /// Quick-broadcast of the sender's own Order only.
    SignedOrder(SignedData),
    /// Client-submitted signed transaction.
    Transaction(SignedData),
    /// Read-only VM evaluation request.
    Query(Query),
    /// Response to a Query or Transaction.
    Result(TxResult),
    /// Peer status vector poll or answer.
    Status(Status),
    /// New-connection identity handshake, first half.
    Challenge(Challenge),
    /// New-connection identity handshake, second half.
    ChallengeResponse(ChallengeResponse),
}

/// Classify a decoded first cell into its message kind, resolving through
/// `ctx` as needed to see inside a `SignedData` wrapper's payload.
fn classify(value: Value, ctx: &dyn DecodeContext) -> Result<WireMessage, WireError> {
    match value {
        Value::SignedData(sd) => {
            let payload = sd.payload(ctx)?;
            match payload {
                Value::Record(r) => match *r {
                    Record::Belief(_) => Ok(WireMessage::Belief(*sd)),
                    Record::Order(_) => Ok(WireMessage::SignedOrder(*sd)),
                    other => Err(WireError::Cell(crate::core::cell::CellError::InvalidData(format!(
                        "signed record of kind {other:?} is not a valid top-level message"
                    )))),
                },
                Value::Transaction(_) => Ok(WireMessage::Transaction(*sd)),
                other => Err(WireError::Cell(crate::core::cell::CellError::InvalidData(format!(
                    "signed payload of kind {other:?} is not a valid top-level message"
                )))),
            }
        }
        Value::Record(r) => match *r {
            Record::Result(tx_result) => Ok(WireMessage::Result(tx_result)),
            other => Err(WireError::Cell(crate::core::cell::CellError::InvalidData(format!(
                "unsigned record of kind {other:?} is not a valid top-level message"
            )))),
        },
        Value::Message(m) => match *m {
            WireCell::Query(q) => Ok(WireMessage::Query(q)),
            WireCell::Status(s) => Ok(WireMessage::Status(s)),
            WireCell::Challenge(c) => Ok(WireMessage::Challenge(c)),
            WireCell::ChallengeResponse(r) => Ok(WireMessage::ChallengeResponse(r)),
        },
        other => Err(WireError::Cell(crate::core::cell::CellError::InvalidData(format!(
            "value of kind {other:?} is not a valid top-level message"
        )))),
    }
}

/// Frame and send a message: the caller supplies the already-built first
/// cell (typically a `SignedData` or a `Value::Message`) and a context able
/// to resolve any non-embedded children it reaches.
pub async fn send<W: AsyncWrite + Unpin>(writer: &mut W, value: &Value, ctx: &dyn DecodeContext) -> Result<(), WireError> {
    let payload = encode_message(value, ctx)?;
    super::frame::write_frame(writer, &payload).await
}

/// Read and classify the next message from a connection.
pub async fn recv<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(WireMessage, TrailerContext), WireError> {
    let payload = super::frame::read_frame(reader).await?;
    let (value, ctx) = decode_message(&payload)?;
    let message = classify(value, &ctx)?;
    Ok((message, ctx))
}

/// Sign and wrap a ledger record as the first cell of a `Belief` or
/// `SignedOrder` message.
pub fn sign_record(record: Record, keypair: &ring::signature::Ed25519KeyPair) -> Result<SignedData, WireError> {
    let payload = Value::Record(Box::new(record));
    Ok(SignedData::sign(payload, keypair)?)
}

/// Sign a transaction as the first cell of a `Transaction` message.
pub fn sign_transaction(
    tx: crate::core::cell::transaction::Transaction,
    keypair: &ring::signature::Ed25519KeyPair,
) -> Result<SignedData, WireError> {
    let payload = Value::Transaction(Box::new(tx));
    Ok(SignedData::sign(payload, keypair)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::collections::SeqTree;
    use crate::core::cell::record::{Belief, Order};
    use crate::core::cell::ref_::Ref;
    use ring::rand::SystemRandom;
    use ring::signature::Ed25519KeyPair;

    fn test_keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    fn empty_orders_ref() -> Ref {
        Ref::new(Value::Vector(SeqTree::build(vec![], Value::Vector).unwrap())).unwrap()
    }

    #[tokio::test]
    async fn belief_round_trips_through_send_and_recv() {
        let kp = test_keypair();
        let belief = Record::Belief(Belief { timestamp: 1, orders: empty_orders_ref() });
        let signed = sign_record(belief, &kp).unwrap();
        let value = Value::SignedData(Box::new(signed.clone()));

        let (mut client, mut server) = tokio::io::duplex(8192);
        send(&mut client, &value, &crate::core::cell::ref_::NoContext).await.unwrap();
        let (message, _ctx) = recv(&mut server).await.unwrap();
        match message {
            WireMessage::Belief(sd) => assert_eq!(sd, signed),
            _ => panic!("expected Belief"),
        }
    }

    #[tokio::test]
    async fn signed_order_is_distinguished_from_belief() {
        let kp = test_keypair();
        let order = Record::Order(Order { blocks: empty_orders_ref(), proposal_point: 0, consensus_point: 0, finality_point: 0 });
        let signed = sign_record(order, &kp).unwrap();
        let value = Value::SignedData(Box::new(signed));

        let (mut client, mut server) = tokio::io::duplex(8192);
        send(&mut client, &value, &crate::core::cell::ref_::NoContext).await.unwrap();
        let (message, _ctx) = recv(&mut server).await.unwrap();
        assert!(matches!(message, WireMessage::SignedOrder(_)));
    }

    #[tokio::test]
    async fn query_round_trips() {
        let query = WireCell::Query(Query { address: 5, form: Ref::embedded(Value::Long(9)) });
        let value = Value::Message(Box::new(query));

        let (mut client, mut server) = tokio::io::duplex(8192);
        send(&mut client, &value, &crate::core::cell::ref_::NoContext).await.unwrap();
        let (message, _ctx) = recv(&mut server).await.unwrap();
        match message {
            WireMessage::Query(q) => assert_eq!(q.address, 5),
            _ => panic!("expected Query"),
        }
    }
}
