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

//! Wire-only protocol cells (§6): `Query`, `Status`, `Challenge`, and
//! `ChallengeResponse`. Unlike [`super::record::Record`] these never get
//! consensed or stored under the peer's root — they only ever travel inside
//! a single multi-cell message — but they are ordinary cells otherwise:
//! content-addressed, canonically encoded, and embeddable under the same
//! rule as everything else.

use super::error::CellError;
use super::ref_::Ref;
use super::tag::*;
use super::vlc::{decode_vlc_count, encode_vlc_count};
use ring::signature::{KeyPair, UnparsedPublicKey, ED25519};

/// Domain tag for challenge/response handshake signatures, separate from
/// [`super::signed::domain_tag`]'s record-keyed tags since a challenge nonce
/// is never itself a cell payload worth hashing through that path.
const CHALLENGE_DOMAIN: &[u8] = b"CVGL-Challenge-v1";

/// A read-only VM evaluation request against the latest State (§6).
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub address: u64,
    pub form: Ref,
}

/// A peer status vector poll: `None` for the request, `Some` carrying the
/// responding peer's view of the table for the answer.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub peers: Option<Ref>,
}

/// The first half of a new-connection identity handshake: a random nonce
/// the other side must sign to prove key ownership.
#[derive(Clone, Debug, PartialEq)]
pub struct Challenge {
    pub nonce: [u8; 32],
}

/// The second half of the handshake: the nonce signed by the responder's
/// long-term key.
#[derive(Clone, Debug, PartialEq)]
pub struct ChallengeResponse {
    pub nonce: [u8; 32],
    pub public_key: [u8; 32],
    pub signature: [u8; 64],
}

impl ChallengeResponse {
    /// Sign `nonce` with `keypair`, producing a response to a [`Challenge`].
    pub fn sign(nonce: [u8; 32], keypair: &ring::signature::Ed25519KeyPair) -> Self {
        let message = signing_message(&nonce);
        let signature = keypair.sign(&message);
        let mut sig_bytes = [0u8; 64];
        sig_bytes.copy_from_slice(signature.as_ref());
        let mut pk = [0u8; 32];
        pk.copy_from_slice(keypair.public_key().as_ref());
        ChallengeResponse { nonce, public_key: pk, signature: sig_bytes }
    }

    /// Verify the response proves ownership of `public_key` over `nonce`.
    pub fn verify(&self) -> bool {
        let message = signing_message(&self.nonce);
        let key = UnparsedPublicKey::new(&ED25519, &self.public_key);
        key.verify(&message, &self.signature).is_ok()
    }
}

fn signing_message(nonce: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHALLENGE_DOMAIN.len() + 32);
    out.extend_from_slice(CHALLENGE_DOMAIN);
    out.extend_from_slice(nonce);
    out
}

/// Any of the wire-only message cell shapes.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Query(Query),
    Status(Status),
    Challenge(Challenge),
    ChallengeResponse(ChallengeResponse),
}

impl Message {
    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            Message::Query(q) => {
                out.push(TAG_QUERY);
                encode_vlc_count(out, q.address);
                q.form.encode(out)?;
            }
            Message::Status(s) => {
                out.push(TAG_STATUS);
                match &s.peers {
                    Some(r) => {
                        out.push(1);
                        r.encode(out)?;
                    }
                    None => out.push(0),
                }
            }
            Message::Challenge(c) => {
                out.push(TAG_CHALLENGE);
                out.extend_from_slice(&c.nonce);
            }
            Message::ChallengeResponse(r) => {
                out.push(TAG_CHALLENGE_RESPONSE);
                out.extend_from_slice(&r.nonce);
                out.extend_from_slice(&r.public_key);
                out.extend_from_slice(&r.signature);
            }
        }
        Ok(())
    }

    pub(super) fn decode(bytes: &[u8], offset: usize) -> Result<(Message, usize), CellError> {
        if offset >= bytes.len() {
            return Err(CellError::bad_format(0, offset));
        }
        let tag = bytes[offset];
        let pos = offset + 1;
        match tag {
            TAG_QUERY => {
                let (address, p1) = decode_vlc_count(bytes, pos)?;
                let (form, p2) = Ref::decode(bytes, p1)?;
                Ok((Message::Query(Query { address, form }), p2))
            }
            TAG_STATUS => {
                if pos >= bytes.len() {
                    return Err(CellError::bad_format(tag, pos));
                }
                let (peers, p) = match bytes[pos] {
                    0 => (None, pos + 1),
                    1 => {
                        let (r, p1) = Ref::decode(bytes, pos + 1)?;
                        (Some(r), p1)
                    }
                    other => return Err(CellError::bad_format(other, pos)),
                };
                Ok((Message::Status(Status { peers }), p))
            }
            TAG_CHALLENGE => {
                let end = pos + 32;
                if end > bytes.len() {
                    return Err(CellError::bad_format(tag, pos));
                }
                let mut nonce = [0u8; 32];
                nonce.copy_from_slice(&bytes[pos..end]);
                Ok((Message::Challenge(Challenge { nonce }), end))
            }
            TAG_CHALLENGE_RESPONSE => {
                let nonce_end = pos + 32;
                let pk_end = nonce_end + 32;
                let sig_end = pk_end + 64;
                if sig_end > bytes.len() {
                    return Err(CellError::bad_format(tag, pos));
                }
                let mut nonce = [0u8; 32];
                nonce.copy_from_slice(&bytes[pos..nonce_end]);
                let mut public_key = [0u8; 32];
                public_key.copy_from_slice(&bytes[nonce_end..pk_end]);
                let mut signature = [0u8; 64];
                signature.copy_from_slice(&bytes[pk_end..sig_end]);
                Ok((Message::ChallengeResponse(ChallengeResponse { nonce, public_key, signature }), sig_end))
            }
            other => Err(CellError::bad_format(other, offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::value::Value;
    use ring::rand::SystemRandom;
    use ring::signature::Ed25519KeyPair;

    fn test_keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    #[test]
    fn query_roundtrip() {
        let msg = Message::Query(Query { address: 7, form: Ref::embedded(Value::Long(1)) });
        let mut out = Vec::new();
        msg.encode(&mut out).unwrap();
        let (decoded, used) = Message::decode(&out, 0).unwrap();
        assert_eq!(used, out.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn status_poll_and_answer_roundtrip() {
        let poll = Message::Status(Status { peers: None });
        let mut out = Vec::new();
        poll.encode(&mut out).unwrap();
        let (decoded, used) = Message::decode(&out, 0).unwrap();
        assert_eq!(used, out.len());
        assert_eq!(decoded, poll);

        let answer = Message::Status(Status { peers: Some(Ref::embedded(Value::Long(0))) });
        let mut out2 = Vec::new();
        answer.encode(&mut out2).unwrap();
        let (decoded2, used2) = Message::decode(&out2, 0).unwrap();
        assert_eq!(used2, out2.len());
        assert_eq!(decoded2, answer);
    }

    #[test]
    fn challenge_response_verifies_against_nonce() {
        let kp = test_keypair();
        let nonce = [9u8; 32];
        let response = ChallengeResponse::sign(nonce, &kp);
        assert!(response.verify());
    }

    #[test]
    fn challenge_response_rejects_wrong_nonce() {
        let kp = test_keypair();
        let response = ChallengeResponse::sign([1u8; 32], &kp);
        let mut tampered = response.clone();
        tampered.nonce = [2u8; 32];
        assert!(!tampered.verify());
    }
}
