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

//! `SignedData`: a cell wrapping an Ed25519 signature, the signer's raw
//! public key, and a ref to the signed payload (§4.6). Verification is
//! cheap enough (one Ed25519 check) that this layer does not itself cache
//! the result; [`crate::core::security::keystore`] caches verification at
//! the `Order`/`Belief` level where it matters.

use super::error::CellError;
use super::record::Record;
use super::ref_::{DecodeContext, Ref};
use super::value::Value;
use ring::signature::{KeyPair, UnparsedPublicKey, ED25519};

/// A signed cell: signature + signer public key + payload ref.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedData {
    pub signature: [u8; 64],
    pub public_key: [u8; 32],
    pub payload: Ref,
}

/// Domain-separation tag for the signed bytes of a cell, chosen from the
/// payload's own shape so a signature over one record kind can never be
/// replayed as a signature over another (§4.6, §7 SignatureError).
pub fn domain_tag(payload: &Value) -> &'static [u8] {
    match payload {
        Value::Record(r) => match r.as_ref() {
            Record::Block(_) => b"CVGL-Block-v1",
            Record::Order(_) => b"CVGL-Order-v1",
            Record::Belief(_) => b"CVGL-Belief-v1",
            Record::State(_) => b"CVGL-State-v1",
            Record::Result(_) => b"CVGL-Result-v1",
            Record::BlockResult(_) => b"CVGL-BlockResult-v1",
            Record::PeerStatus(_) => b"CVGL-PeerStatus-v1",
            Record::AccountStatus(_) => b"CVGL-AccountStatus-v1",
        },
        Value::Transaction(_) => b"CVGL-Transaction-v1",
        _ => b"CVGL-Cell-v1",
    }
}

fn signing_message(domain: &[u8], hash: &super::hash::Hash32) -> Vec<u8> {
    let mut out = Vec::with_capacity(domain.len() + 32);
    out.extend_from_slice(domain);
    out.extend_from_slice(hash.as_bytes());
    out
}

impl SignedData {
    /// Sign `payload` with `keypair`, producing a new `SignedData` cell. The
    /// message actually signed is `domain_tag(payload) || hash(payload)`.
    pub fn sign(payload: Value, keypair: &ring::signature::Ed25519KeyPair) -> Result<Self, CellError> {
        let domain = domain_tag(&payload);
        let payload_ref = Ref::new(payload)?;
        let hash = payload_ref.hash()?;
        let message = signing_message(domain, &hash);
        let signature = keypair.sign(&message);
        let mut sig_bytes = [0u8; 64];
        sig_bytes.copy_from_slice(signature.as_ref());
        let mut pk = [0u8; 32];
        pk.copy_from_slice(keypair.public_key().as_ref());
        Ok(SignedData { signature: sig_bytes, public_key: pk, payload: payload_ref })
    }

    /// Verify the signature against the payload's domain-separated content hash.
    pub fn verify(&self, ctx: &dyn DecodeContext) -> Result<(), CellError> {
        let payload = self.payload.resolve(ctx)?;
        let domain = domain_tag(&payload);
        let hash = self.payload.hash()?;
        let message = signing_message(domain, &hash);
        let key = UnparsedPublicKey::new(&ED25519, &self.public_key);
        key.verify(&message, &self.signature)
            .map_err(|_| CellError::InvalidData("ed25519 signature verification failed".into()))
    }

    /// Resolve and return the signed payload, without re-verifying.
    pub fn payload(&self, ctx: &dyn DecodeContext) -> Result<Value, CellError> {
        self.payload.resolve(ctx)
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.public_key);
        self.payload.encode(out)
    }

    pub(super) fn decode(bytes: &[u8], offset: usize) -> Result<(SignedData, usize), CellError> {
        let sig_end = offset + 64;
        let pk_end = sig_end + 32;
        if pk_end > bytes.len() {
            return Err(CellError::bad_format(super::tag::TAG_SIGNED_DATA, offset));
        }
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[offset..sig_end]);
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&bytes[sig_end..pk_end]);
        let (payload, pos) = Ref::decode(bytes, pk_end)?;
        Ok((SignedData { signature, public_key, payload }, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::ref_::NoContext;
    use ring::rand::SystemRandom;
    use ring::signature::{Ed25519KeyPair, KeyPair};

    fn test_keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = test_keypair();
        let sd = SignedData::sign(Value::Long(42), &kp).unwrap();
        assert!(sd.verify(&NoContext).is_ok());

        let mut bytes = Vec::new();
        sd.encode(&mut bytes).unwrap();
        let (decoded, used) = SignedData::decode(&bytes, 0).unwrap();
        assert_eq!(used, bytes.len());
        assert!(decoded.verify(&NoContext).is_ok());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let kp = test_keypair();
        let mut sd = SignedData::sign(Value::Long(42), &kp).unwrap();
        sd.signature[0] ^= 0xFF;
        assert!(sd.verify(&NoContext).is_err());
    }

    #[test]
    fn domain_separates_record_kinds() {
        use crate::core::cell::record::{Block, Record};
        let block_payload = Value::Record(Box::new(Record::Block(Block {
            timestamp: 0,
            transactions: Ref::new(Value::Null).unwrap(),
        })));
        assert_eq!(domain_tag(&block_payload), b"CVGL-Block-v1");
        assert_eq!(domain_tag(&Value::Long(1)), b"CVGL-Cell-v1");
    }
}
