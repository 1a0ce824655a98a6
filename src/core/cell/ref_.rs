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

//! `Ref`: a typed handle to a cell, either the embedded value inline or a
//! 32-byte hash resolved lazily against a decode context. Refs are never
//! eagerly materialized into whole trees (DESIGN NOTES §9).

use super::error::CellError;
use super::hash::Hash32;
use super::tag::TAG_REF;
use super::value::Value;
use std::fmt;

/// A reference to a child cell: embedded inline, resolved elsewhere by
/// hash, or (transiently, before a store has persisted it) hash-addressed
/// but still holding its value in memory.
#[derive(Clone, PartialEq)]
pub enum Ref {
    /// The child's value is small enough (and itself fully embedded) to be
    /// carried inline in the parent's encoding.
    Embedded(Box<Value>),
    /// The child lives elsewhere; resolve through a [`DecodeContext`].
    Hash(Hash32),
    /// Hash-addressed (too large to embed) but not yet handed to a store —
    /// the value stays reachable from the ref itself until something calls
    /// `Store::put` on it. Encodes identically to `Hash`; decoding a wire
    /// encoding never produces this variant, only fresh construction does.
    Pending(Hash32, Box<Value>),
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Embedded(v) => write!(f, "Ref::Embedded({v:?})"),
            Ref::Hash(h) => write!(f, "Ref::Hash({h})"),
            Ref::Pending(h, _) => write!(f, "Ref::Pending({h})"),
        }
    }
}

/// Resolves a hash to its cell value. Implemented by the content-addressed
/// store and by the multi-cell wire decoder's trailing-cell map.
pub trait DecodeContext {
    /// Look up a previously-seen encoding for `hash` and decode it.
    fn resolve(&self, hash: &Hash32) -> Result<Value, CellError>;
}

/// A context that never resolves anything; useful for decoding cells that are
/// statically known to carry no non-embedded refs (e.g. in isolated unit
/// tests).
pub struct NoContext;

impl DecodeContext for NoContext {
    fn resolve(&self, hash: &Hash32) -> Result<Value, CellError> {
        Err(CellError::MissingData(*hash))
    }
}

impl Ref {
    /// Build a ref that embeds `value` inline, regardless of size. Callers
    /// that must respect the embedding rule should use [`Ref::new`] instead.
    pub fn embedded(value: Value) -> Self {
        Ref::Embedded(Box::new(value))
    }

    /// Build a ref to a cell already known only by hash.
    pub fn by_hash(hash: Hash32) -> Self {
        Ref::Hash(hash)
    }

    /// Build a ref to `value`, embedding it iff the embedding rule (§4.1)
    /// allows: encoded length ≤ 140 bytes and all children already embedded.
    pub fn new(value: Value) -> Result<Self, CellError> {
        if value.is_embeddable()? {
            Ok(Ref::Embedded(Box::new(value)))
        } else {
            let hash = value.hash()?;
            Ok(Ref::Pending(hash, Box::new(value)))
        }
    }

    /// True iff this ref carries its value inline.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Ref::Embedded(_))
    }

    /// The hash identity of the referenced cell, computing it from the
    /// embedded encoding if necessary.
    pub fn hash(&self) -> Result<Hash32, CellError> {
        match self {
            Ref::Embedded(v) => v.hash(),
            Ref::Hash(h) | Ref::Pending(h, _) => Ok(*h),
        }
    }

    /// Resolve to the referenced value. `Embedded`/`Pending` refs already
    /// hold it; a plain `Hash` ref consults `ctx`.
    pub fn resolve(&self, ctx: &dyn DecodeContext) -> Result<Value, CellError> {
        match self {
            Ref::Embedded(v) | Ref::Pending(_, v) => Ok((**v).clone()),
            Ref::Hash(h) => ctx.resolve(h),
        }
    }

    /// Encode this ref into `out`: embedded refs inline their value's own
    /// encoding; hash and pending refs both write the [`TAG_REF`] marker
    /// followed by 32 bytes — a pending ref's in-memory value plays no part
    /// in the wire/storage encoding, only in its own resolution.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            Ref::Embedded(v) => v.encode(out),
            Ref::Hash(h) | Ref::Pending(h, _) => {
                out.push(TAG_REF);
                out.extend_from_slice(h.as_bytes());
                Ok(())
            }
        }
    }

    /// Decode a ref starting at `offset`. Does not resolve hash refs.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<(Ref, usize), CellError> {
        if offset >= bytes.len() {
            return Err(CellError::bad_format(0, offset));
        }
        if bytes[offset] == TAG_REF {
            let start = offset + 1;
            let end = start + 32;
            if end > bytes.len() {
                return Err(CellError::bad_format(TAG_REF, offset));
            }
            let mut h = [0u8; 32];
            h.copy_from_slice(&bytes[start..end]);
            Ok((Ref::Hash(Hash32::from_bytes(h)), end))
        } else {
            let (value, new_offset) = Value::decode(bytes, offset)?;
            Ok((Ref::Embedded(Box::new(value)), new_offset))
        }
    }
}
