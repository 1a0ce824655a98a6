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

//! `Value`: the full cell data universe (§3). Every ledger value — from a
//! `Null` to a signed `Order` — is a `Value`, canonically encoded and
//! content-addressed the same way.

use super::collections::{BlobMapTree, BlobTree, MapTree, SeqTree, SetTree};
use super::error::CellError;
use super::hash::Hash32;
use super::ref_::Ref;
use super::signed::SignedData;
use super::tag::*;
use super::vlc::{decode_vlc_count, decode_vlc_i64, encode_vlc_count, encode_vlc_i64};
use crate::core::cell::code::Code;
use crate::core::cell::message::Message;
use crate::core::cell::record::Record;
use crate::core::cell::transaction::Transaction;

/// An account address: a non-negative integer below 2^62 (the top two bits
/// are reserved for future tagged-pointer use in wire framing).
pub const MAX_ADDRESS: u64 = (1u64 << 62) - 1;

/// Maximum encoded size (bytes) of any single cell, embedded or not (§4.1).
pub const MAX_ENCODING_LEN: usize = 8191;
/// Above this encoded size, a cell can never be embedded in a parent (§4.1).
pub const EMBED_MAX_LEN: usize = 140;

/// A ledger value / cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Long(i64),
    /// Magnitude in big-endian minimal form; `negative` true iff the value is
    /// strictly negative. Only used once a value falls outside `i64`'s range.
    BigInt { negative: bool, magnitude: Vec<u8> },
    /// A finite double, or a canonical quiet NaN. Any other NaN bit pattern is
    /// rejected on decode as non-canonical.
    Double(f64),
    Blob(BlobTree),
    CString(BlobTree),
    Symbol(String),
    Keyword(String),
    Character(char),
    /// Account/peer index, `< MAX_ADDRESS`.
    Address(u64),
    Vector(SeqTree),
    List(SeqTree),
    Map(MapTree),
    Set(SetTree),
    BlobMap(BlobMapTree),
    SignedData(Box<SignedData>),
    Transaction(Box<Transaction>),
    Record(Box<Record>),
    Code(Box<Code>),
    /// Wire-only protocol cell (§6): never consensed or stored under a root.
    Message(Box<Message>),
}

impl Value {
    /// Encode this value's canonical byte representation into `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            Value::Null => out.push(TAG_NULL),
            Value::Bool(false) => out.push(TAG_FALSE),
            Value::Bool(true) => out.push(TAG_TRUE),
            Value::Long(v) => {
                out.push(TAG_LONG);
                encode_vlc_i64(out, *v);
            }
            Value::BigInt { negative, magnitude } => {
                out.push(TAG_BIGINT);
                out.push(if *negative { 1 } else { 0 });
                encode_vlc_count(out, magnitude.len() as u64);
                out.extend_from_slice(magnitude);
            }
            Value::Double(d) => {
                out.push(TAG_DOUBLE);
                let canon = canonicalize_double(*d);
                out.extend_from_slice(&canon.to_bits().to_be_bytes());
            }
            Value::Blob(tree) => {
                match tree {
                    BlobTree::Leaf(_) => out.push(TAG_BLOB_LEAF),
                    BlobTree::Node { .. } => out.push(TAG_BLOB_NODE),
                }
                tree.encode(out)?;
            }
            Value::CString(tree) => {
                out.push(TAG_CSTRING);
                match tree {
                    BlobTree::Leaf(_) => out.push(0),
                    BlobTree::Node { .. } => out.push(1),
                }
                tree.encode(out)?;
            }
            Value::Symbol(s) => encode_ident(out, TAG_SYMBOL, s),
            Value::Keyword(s) => encode_ident(out, TAG_KEYWORD, s),
            Value::Character(c) => {
                out.push(TAG_CHARACTER);
                out.extend_from_slice(&(*c as u32).to_be_bytes());
            }
            Value::Address(a) => {
                if *a > MAX_ADDRESS {
                    return Err(CellError::InvalidData(format!("address {a} exceeds MAX_ADDRESS")));
                }
                out.push(TAG_ADDRESS);
                encode_vlc_count(out, *a);
            }
            Value::Vector(tree) => {
                match tree {
                    SeqTree::Leaf(_) => out.push(TAG_VECTOR_LEAF),
                    SeqTree::Node { .. } => out.push(TAG_VECTOR_NODE),
                }
                tree.encode(out)?;
            }
            Value::List(tree) => {
                match tree {
                    SeqTree::Leaf(_) => out.push(TAG_LIST_LEAF),
                    SeqTree::Node { .. } => out.push(TAG_LIST_NODE),
                }
                tree.encode(out)?;
            }
            Value::Map(tree) => {
                match tree {
                    MapTree::Leaf(_) => out.push(TAG_MAP_LEAF),
                    MapTree::Node { .. } => out.push(TAG_MAP_NODE),
                }
                tree.encode(out)?;
            }
            Value::Set(tree) => {
                match tree {
                    SetTree::Leaf(_) => out.push(TAG_SET_LEAF),
                    SetTree::Node { .. } => out.push(TAG_SET_NODE),
                }
                tree.encode(out)?;
            }
            Value::BlobMap(tree) => {
                match tree {
                    BlobMapTree::Leaf(_) => out.push(TAG_BLOBMAP_LEAF),
                    BlobMapTree::Node { .. } => out.push(TAG_BLOBMAP_NODE),
                }
                tree.encode(out)?;
            }
            Value::SignedData(sd) => {
                out.push(TAG_SIGNED_DATA);
                sd.encode(out)?;
            }
            Value::Transaction(tx) => tx.encode(out)?,
            Value::Record(r) => r.encode(out)?,
            Value::Code(c) => c.encode(out)?,
            Value::Message(m) => m.encode(out)?,
        }
        if out.len() > MAX_ENCODING_LEN {
            return Err(CellError::InvalidData(format!(
                "encoding exceeds MAX_ENCODING_LEN ({} > {})",
                out.len(),
                MAX_ENCODING_LEN
            )));
        }
        Ok(())
    }

    /// Decode a value starting at `offset`, returning it and the offset just
    /// past its encoding.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<(Value, usize), CellError> {
        if offset >= bytes.len() {
            return Err(CellError::bad_format(0, offset));
        }
        let tag = bytes[offset];
        let pos = offset + 1;
        match tag {
            TAG_NULL => Ok((Value::Null, pos)),
            TAG_FALSE => Ok((Value::Bool(false), pos)),
            TAG_TRUE => Ok((Value::Bool(true), pos)),
            TAG_LONG => {
                let (v, p) = decode_vlc_i64(bytes, pos)?;
                Ok((Value::Long(v), p))
            }
            TAG_BIGINT => {
                if pos >= bytes.len() {
                    return Err(CellError::bad_format(tag, pos));
                }
                let negative = match bytes[pos] {
                    0 => false,
                    1 => true,
                    _ => return Err(CellError::bad_format(tag, pos)),
                };
                let (len, p2) = decode_vlc_count(bytes, pos + 1)?;
                let len = len as usize;
                let end = p2 + len;
                if end > bytes.len() {
                    return Err(CellError::bad_format(tag, p2));
                }
                let magnitude = bytes[p2..end].to_vec();
                if len > 0 && magnitude[0] == 0 {
                    return Err(CellError::InvalidData("bigint magnitude has leading zero byte".into()));
                }
                if len == 0 && negative {
                    return Err(CellError::InvalidData("bigint zero magnitude must not be negative".into()));
                }
                Ok((Value::BigInt { negative, magnitude }, end))
            }
            TAG_DOUBLE => {
                let end = pos + 8;
                if end > bytes.len() {
                    return Err(CellError::bad_format(tag, pos));
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes[pos..end]);
                let bits = u64::from_be_bytes(buf);
                let d = f64::from_bits(bits);
                let canon = canonicalize_double(d);
                if canon.to_bits() != bits {
                    return Err(CellError::InvalidData("non-canonical NaN encoding".into()));
                }
                Ok((Value::Double(d), end))
            }
            TAG_BLOB_LEAF => {
                let (t, p) = BlobTree::decode_leaf(bytes, pos)?;
                Ok((Value::Blob(t), p))
            }
            TAG_BLOB_NODE => {
                let (t, p) = BlobTree::decode_node(bytes, pos)?;
                Ok((Value::Blob(t), p))
            }
            TAG_CSTRING => {
                if pos >= bytes.len() {
                    return Err(CellError::bad_format(tag, pos));
                }
                let (t, p) = match bytes[pos] {
                    0 => BlobTree::decode_leaf(bytes, pos + 1)?,
                    1 => BlobTree::decode_node(bytes, pos + 1)?,
                    _ => return Err(CellError::bad_format(tag, pos)),
                };
                if let BlobTree::Leaf(b) = &t {
                    std::str::from_utf8(b)
                        .map_err(|_| CellError::InvalidData("cstring leaf is not valid utf-8".into()))?;
                }
                Ok((Value::CString(t), p))
            }
            TAG_SYMBOL => {
                let (s, p) = decode_ident(bytes, pos, tag)?;
                Ok((Value::Symbol(s), p))
            }
            TAG_KEYWORD => {
                let (s, p) = decode_ident(bytes, pos, tag)?;
                Ok((Value::Keyword(s), p))
            }
            TAG_CHARACTER => {
                let end = pos + 4;
                if end > bytes.len() {
                    return Err(CellError::bad_format(tag, pos));
                }
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes[pos..end]);
                let code = u32::from_be_bytes(buf);
                let c = char::from_u32(code)
                    .ok_or_else(|| CellError::InvalidData(format!("invalid character code point {code}")))?;
                Ok((Value::Character(c), end))
            }
            TAG_ADDRESS => {
                let (a, p) = decode_vlc_count(bytes, pos)?;
                if a > MAX_ADDRESS {
                    return Err(CellError::InvalidData(format!("address {a} exceeds MAX_ADDRESS")));
                }
                Ok((Value::Address(a), p))
            }
            TAG_VECTOR_LEAF => {
                let (t, p) = SeqTree::decode_leaf(bytes, pos)?;
                Ok((Value::Vector(t), p))
            }
            TAG_VECTOR_NODE => {
                let (t, p) = SeqTree::decode_node(bytes, pos)?;
                Ok((Value::Vector(t), p))
            }
            TAG_LIST_LEAF => {
                let (t, p) = SeqTree::decode_leaf(bytes, pos)?;
                Ok((Value::List(t), p))
            }
            TAG_LIST_NODE => {
                let (t, p) = SeqTree::decode_node(bytes, pos)?;
                Ok((Value::List(t), p))
            }
            TAG_MAP_LEAF => {
                let (t, p) = MapTree::decode_leaf(bytes, pos)?;
                Ok((Value::Map(t), p))
            }
            TAG_MAP_NODE => {
                let (t, p) = MapTree::decode_node(bytes, pos)?;
                Ok((Value::Map(t), p))
            }
            TAG_SET_LEAF => {
                let (t, p) = SetTree::decode_leaf(bytes, pos)?;
                Ok((Value::Set(t), p))
            }
            TAG_SET_NODE => {
                let (t, p) = SetTree::decode_node(bytes, pos)?;
                Ok((Value::Set(t), p))
            }
            TAG_BLOBMAP_LEAF => {
                let (t, p) = BlobMapTree::decode_leaf(bytes, pos)?;
                Ok((Value::BlobMap(t), p))
            }
            TAG_BLOBMAP_NODE => {
                let (t, p) = BlobMapTree::decode_node(bytes, pos)?;
                Ok((Value::BlobMap(t), p))
            }
            TAG_SIGNED_DATA => {
                let (sd, p) = SignedData::decode(bytes, pos)?;
                Ok((Value::SignedData(Box::new(sd)), p))
            }
            TAG_INVOKE | TAG_TRANSFER | TAG_CALL | TAG_MULTI => {
                let (tx, p) = Transaction::decode(bytes, offset)?;
                Ok((Value::Transaction(Box::new(tx)), p))
            }
            TAG_BLOCK | TAG_ORDER | TAG_BELIEF | TAG_STATE | TAG_RESULT | TAG_BLOCK_RESULT | TAG_PEER_STATUS
            | TAG_ACCOUNT_STATUS => {
                let (r, p) = Record::decode(bytes, offset)?;
                Ok((Value::Record(Box::new(r)), p))
            }
            TAG_OP | TAG_FN | TAG_MULTI_FN | TAG_CORE_DEF => {
                let (c, p) = Code::decode(bytes, offset)?;
                Ok((Value::Code(Box::new(c)), p))
            }
            TAG_QUERY | TAG_STATUS | TAG_CHALLENGE | TAG_CHALLENGE_RESPONSE => {
                let (m, p) = Message::decode(bytes, offset)?;
                Ok((Value::Message(Box::new(m)), p))
            }
            other => Err(CellError::bad_format(other, offset)),
        }
    }

    /// Encode to a fresh buffer.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, CellError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Content hash of this value's canonical encoding.
    pub fn hash(&self) -> Result<Hash32, CellError> {
        let bytes = self.encode_to_vec()?;
        Ok(Hash32::of(&bytes))
    }

    /// Canonical bytes used to order this value as a map/set key.
    pub fn canonical_key_bytes(&self) -> Vec<u8> {
        self.encode_to_vec().unwrap_or_default()
    }

    /// Whether this value may be embedded inline in a parent ref: its own
    /// encoding is at most [`EMBED_MAX_LEN`] bytes and every direct child ref
    /// is itself embedded (§4.1).
    pub fn is_embeddable(&self) -> Result<bool, CellError> {
        let len = self.encode_to_vec()?.len();
        if len > EMBED_MAX_LEN {
            return Ok(false);
        }
        Ok(self.direct_refs().iter().all(|r| r.is_embedded()))
    }

    /// Direct child refs, for embedding-rule and traversal purposes (used by
    /// the content-addressed store to walk descendants on `put`).
    pub(crate) fn direct_refs(&self) -> Vec<&Ref> {
        match self {
            Value::Vector(t) | Value::List(t) => match t {
                SeqTree::Leaf(refs) => refs.iter().collect(),
                SeqTree::Node { children, .. } => children.iter().collect(),
            },
            Value::Blob(t) | Value::CString(t) => match t {
                BlobTree::Leaf(_) => Vec::new(),
                BlobTree::Node { children, .. } => children.iter().collect(),
            },
            Value::Map(t) => match t {
                MapTree::Leaf(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
                MapTree::Node { buckets, .. } => buckets.iter().map(|(_, r)| r).collect(),
            },
            Value::Set(t) => match t {
                SetTree::Leaf(refs) => refs.iter().collect(),
                SetTree::Node { buckets, .. } => buckets.iter().map(|(_, r)| r).collect(),
            },
            Value::BlobMap(t) => match t {
                BlobMapTree::Leaf(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
                BlobMapTree::Node { buckets, .. } => buckets.iter().map(|(_, r)| r).collect(),
            },
            Value::SignedData(s) => vec![&s.payload],
            Value::Transaction(t) => match t.as_ref() {
                Transaction::Invoke { code, .. } => vec![code],
                Transaction::Transfer { .. } => Vec::new(),
                Transaction::Call { args, .. } => vec![args],
                Transaction::Multi { transactions, .. } => transactions.iter().collect(),
            },
            Value::Record(r) => match r.as_ref() {
                Record::Block(b) => vec![&b.transactions],
                Record::Order(o) => vec![&o.blocks],
                Record::Belief(b) => vec![&b.orders],
                Record::State(s) => vec![&s.accounts, &s.scheduled],
                Record::Result(r) => vec![&r.value],
                Record::BlockResult(br) => vec![&br.results],
                Record::PeerStatus(_) => Vec::new(),
                Record::AccountStatus(a) => a.environment.iter().collect(),
            },
            Value::Code(c) => match c.as_ref() {
                Code::Op(t) | Code::Fn(t) | Code::MultiFn(t) | Code::CoreDef(t) => match t {
                    BlobTree::Leaf(_) => Vec::new(),
                    BlobTree::Node { children, .. } => children.iter().collect(),
                },
            },
            Value::Message(m) => match m.as_ref() {
                Message::Query(q) => vec![&q.form],
                Message::Status(s) => s.peers.iter().collect(),
                Message::Challenge(_) | Message::ChallengeResponse(_) => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

/// The canonical NaN bit pattern; all NaN doubles collapse to this on
/// encode, and any other NaN pattern is a decode error.
fn canonicalize_double(d: f64) -> f64 {
    if d.is_nan() {
        f64::NAN
    } else {
        d
    }
}

fn encode_ident(out: &mut Vec<u8>, tag: u8, s: &str) {
    out.push(tag);
    encode_vlc_count(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn decode_ident(bytes: &[u8], offset: usize, tag: u8) -> Result<(String, usize), CellError> {
    let (len, pos) = decode_vlc_count(bytes, offset)?;
    let len = len as usize;
    let end = pos + len;
    if end > bytes.len() || len == 0 || len > 255 {
        return Err(CellError::bad_format(tag, pos));
    }
    let s = std::str::from_utf8(&bytes[pos..end])
        .map_err(|_| CellError::InvalidData("identifier is not valid utf-8".into()))?
        .to_string();
    Ok((s, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::ref_::NoContext;

    fn roundtrip(v: &Value) -> Value {
        let bytes = v.encode_to_vec().unwrap();
        let (decoded, used) = Value::decode(&bytes, 0).unwrap();
        assert_eq!(used, bytes.len());
        decoded
    }

    #[test]
    fn roundtrip_scalars() {
        assert_eq!(roundtrip(&Value::Null), Value::Null);
        assert_eq!(roundtrip(&Value::Bool(true)), Value::Bool(true));
        assert_eq!(roundtrip(&Value::Bool(false)), Value::Bool(false));
        assert_eq!(roundtrip(&Value::Long(-42)), Value::Long(-42));
        assert_eq!(roundtrip(&Value::Double(3.5)), Value::Double(3.5));
        assert_eq!(roundtrip(&Value::Character('x')), Value::Character('x'));
        assert_eq!(roundtrip(&Value::Address(7)), Value::Address(7));
    }

    #[test]
    fn nan_canonicalizes() {
        let v = Value::Double(f64::NAN);
        let bytes = v.encode_to_vec().unwrap();
        let (decoded, _) = Value::decode(&bytes, 0).unwrap();
        match decoded {
            Value::Double(d) => assert!(d.is_nan()),
            _ => panic!("expected double"),
        }
    }

    #[test]
    fn symbol_roundtrip() {
        let v = Value::Symbol("transfer".to_string());
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn small_blob_is_embeddable() {
        let v = Value::Blob(BlobTree::build(vec![1, 2, 3]).unwrap());
        assert!(v.is_embeddable().unwrap());
    }

    #[test]
    fn large_blob_splits_and_is_not_embeddable() {
        let data = vec![7u8; 10_000];
        let v = Value::Blob(BlobTree::build(data.clone()).unwrap());
        assert!(!v.is_embeddable().unwrap());
        match &v {
            Value::Blob(t) => assert_eq!(t.to_bytes(&NoContext).unwrap(), data),
            _ => unreachable!(),
        }
    }

    #[test]
    fn vector_roundtrip_small_and_large() {
        let small: Vec<Value> = (0..5).map(Value::Long).collect();
        let tree = SeqTree::build(small.clone(), Value::Vector).unwrap();
        let v = Value::Vector(tree);
        let decoded = roundtrip(&v);
        match decoded {
            Value::Vector(t) => assert_eq!(t.to_vec(&NoContext).unwrap(), small),
            _ => panic!("expected vector"),
        }

        let large: Vec<Value> = (0..200).map(Value::Long).collect();
        let tree = SeqTree::build(large.clone(), Value::Vector).unwrap();
        let v = Value::Vector(tree);
        assert!(!v.is_embeddable().unwrap());
        let bytes = v.encode_to_vec().unwrap();
        let (decoded, used) = Value::decode(&bytes, 0).unwrap();
        assert_eq!(used, bytes.len());
        match decoded {
            Value::Vector(t) => assert_eq!(t.to_vec(&NoContext).unwrap(), large),
            _ => panic!("expected vector"),
        }
    }

    #[test]
    fn map_roundtrip_and_order_independence() {
        let pairs_a = vec![
            (Value::Symbol("a".into()), Value::Long(1)),
            (Value::Symbol("b".into()), Value::Long(2)),
        ];
        let pairs_b = vec![
            (Value::Symbol("b".into()), Value::Long(2)),
            (Value::Symbol("a".into()), Value::Long(1)),
        ];
        let ha = Value::Map(MapTree::build(pairs_a).unwrap()).hash().unwrap();
        let hb = Value::Map(MapTree::build(pairs_b).unwrap()).hash().unwrap();
        assert_eq!(ha, hb);
    }

    #[test]
    fn address_over_limit_rejected() {
        let v = Value::Address(MAX_ADDRESS + 1);
        assert!(v.encode_to_vec().is_err());
    }
}
