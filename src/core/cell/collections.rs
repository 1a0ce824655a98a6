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

//! Tree-shaped collections: vectors/lists/blobs split by index range, maps/
//! sets/blob-maps split by hash (or raw key) nibble. All are shallow,
//! branching factor 16 (§4.1). Shape is a pure function of content, so
//! semantically-equal collections always share a hash regardless of the
//! order elements were inserted in.

use super::error::CellError;
use super::hash::Hash32;
use super::ref_::{DecodeContext, Ref};
use super::value::Value;

/// Above this many direct elements, a sequence/assoc collection splits into a
/// branch node instead of staying a flat leaf.
pub const LEAF_MAX: usize = 16;
/// Branching factor for all tree-shaped collections.
pub const FANOUT: usize = 16;

/// -------------------------------------------------------------------------
/// Sequences (Vector, List): index-range keyed.
/// -------------------------------------------------------------------------

/// A sequence collection node. Shape is a pure function of `count`.
#[derive(Clone, Debug, PartialEq)]
pub enum SeqTree {
    /// Direct elements, `len() <= LEAF_MAX`.
    Leaf(Vec<Ref>),
    /// `children.len() <= FANOUT`, each resolving to a nested sequence cell
    /// of the same kind (Vector or List) covering a contiguous sub-range.
    Node { count: u64, children: Vec<Ref> },
}

impl SeqTree {
    /// Total element count.
    pub fn count(&self) -> u64 {
        match self {
            SeqTree::Leaf(v) => v.len() as u64,
            SeqTree::Node { count, .. } => *count,
        }
    }

    /// Build a balanced tree over `elems`. `wrap` rebuilds a nested tree back
    /// into a parent `Value` (`Value::Vector` or `Value::List`) so the
    /// recursive children carry the same tag as the root.
    pub fn build(elems: Vec<Value>, wrap: fn(SeqTree) -> Value) -> Result<SeqTree, CellError> {
        let refs: Result<Vec<Ref>, CellError> = elems.into_iter().map(Ref::new).collect();
        Self::build_refs(refs?, wrap)
    }

    fn build_refs(refs: Vec<Ref>, wrap: fn(SeqTree) -> Value) -> Result<SeqTree, CellError> {
        if refs.len() <= LEAF_MAX {
            return Ok(SeqTree::Leaf(refs));
        }
        let count = refs.len() as u64;
        let chunks = chunk_ranges(refs.len(), FANOUT);
        let mut children = Vec::with_capacity(chunks.len());
        let mut rest = refs;
        // Split `rest` from the front according to chunk sizes.
        for (start, end) in &chunks {
            let size = end - start;
            let tail = rest.split_off(size.min(rest.len()));
            let chunk = rest;
            rest = tail;
            let sub = Self::build_refs(chunk, wrap)?;
            children.push(Ref::new(wrap(sub))?);
        }
        Ok(SeqTree::Node { count, children })
    }

    /// Materialize all elements in order, resolving refs against `ctx`.
    pub fn to_vec(&self, ctx: &dyn DecodeContext) -> Result<Vec<Value>, CellError> {
        match self {
            SeqTree::Leaf(refs) => refs.iter().map(|r| r.resolve(ctx)).collect(),
            SeqTree::Node { children, .. } => {
                let mut out = Vec::new();
                for child in children {
                    let v = child.resolve(ctx)?;
                    let nested = match &v {
                        Value::Vector(t) | Value::List(t) => t.to_vec(ctx)?,
                        _ => return Err(CellError::InvalidData("seq node child not a sequence".into())),
                    };
                    out.extend(nested);
                }
                Ok(out)
            }
        }
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            SeqTree::Leaf(refs) => {
                super::vlc::encode_vlc_count(out, refs.len() as u64);
                for r in refs {
                    r.encode(out)?;
                }
            }
            SeqTree::Node { count, children } => {
                super::vlc::encode_vlc_count(out, *count);
                out.push(children.len() as u8);
                for c in children {
                    c.encode(out)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn decode_leaf(bytes: &[u8], offset: usize) -> Result<(SeqTree, usize), CellError> {
        let (n, mut pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        let mut refs = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let (r, new_pos) = Ref::decode(bytes, pos)?;
            refs.push(r);
            pos = new_pos;
        }
        Ok((SeqTree::Leaf(refs), pos))
    }

    pub(super) fn decode_node(bytes: &[u8], offset: usize) -> Result<(SeqTree, usize), CellError> {
        let (count, pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        if pos >= bytes.len() {
            return Err(CellError::bad_format(0, pos));
        }
        let nchildren = bytes[pos] as usize;
        let mut pos = pos + 1;
        let mut children = Vec::with_capacity(nchildren);
        for _ in 0..nchildren {
            let (r, new_pos) = Ref::decode(bytes, pos)?;
            children.push(r);
            pos = new_pos;
        }
        Ok((SeqTree::Node { count, children }, pos))
    }
}

/// Split `total` items into up to `fanout` contiguous, roughly-equal ranges.
pub fn chunk_ranges(total: usize, fanout: usize) -> Vec<(usize, usize)> {
    let children = total.min(fanout).max(1);
    let base = total / children;
    let extra = total % children;
    let mut out = Vec::with_capacity(children);
    let mut pos = 0;
    for i in 0..children {
        let size = base + if i < extra { 1 } else { 0 };
        out.push((pos, pos + size));
        pos += size;
    }
    out
}

/// -------------------------------------------------------------------------
/// Blob: raw bytes, index-range keyed like sequences.
/// -------------------------------------------------------------------------

/// A byte-blob collection node.
#[derive(Clone, Debug, PartialEq)]
pub enum BlobTree {
    /// Direct bytes, `len() <= BLOB_LEAF_MAX`.
    Leaf(Vec<u8>),
    /// Nested chunks, each itself a `Value::Blob`.
    Node { len: u64, children: Vec<Ref> },
}

/// Above this many bytes, a blob splits into a branch node.
pub const BLOB_LEAF_MAX: usize = 4096;

impl BlobTree {
    pub fn len(&self) -> u64 {
        match self {
            BlobTree::Leaf(b) => b.len() as u64,
            BlobTree::Node { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn build(bytes: Vec<u8>) -> Result<BlobTree, CellError> {
        if bytes.len() <= BLOB_LEAF_MAX {
            return Ok(BlobTree::Leaf(bytes));
        }
        let len = bytes.len() as u64;
        let chunks = chunk_ranges(bytes.len(), FANOUT);
        let mut children = Vec::with_capacity(chunks.len());
        for (start, end) in chunks {
            let sub = BlobTree::build(bytes[start..end].to_vec())?;
            children.push(Ref::new(Value::Blob(sub))?);
        }
        Ok(BlobTree::Node { len, children })
    }

    pub fn to_bytes(&self, ctx: &dyn DecodeContext) -> Result<Vec<u8>, CellError> {
        match self {
            BlobTree::Leaf(b) => Ok(b.clone()),
            BlobTree::Node { children, .. } => {
                let mut out = Vec::new();
                for c in children {
                    let v = c.resolve(ctx)?;
                    match v {
                        Value::Blob(t) => out.extend(t.to_bytes(ctx)?),
                        _ => return Err(CellError::InvalidData("blob node child not a blob".into())),
                    }
                }
                Ok(out)
            }
        }
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            BlobTree::Leaf(b) => {
                super::vlc::encode_vlc_count(out, b.len() as u64);
                out.extend_from_slice(b);
            }
            BlobTree::Node { len, children } => {
                super::vlc::encode_vlc_count(out, *len);
                out.push(children.len() as u8);
                for c in children {
                    c.encode(out)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn decode_leaf(bytes: &[u8], offset: usize) -> Result<(BlobTree, usize), CellError> {
        let (n, pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        let n = n as usize;
        let end = pos + n;
        if end > bytes.len() {
            return Err(CellError::bad_format(0, pos));
        }
        Ok((BlobTree::Leaf(bytes[pos..end].to_vec()), end))
    }

    pub(super) fn decode_node(bytes: &[u8], offset: usize) -> Result<(BlobTree, usize), CellError> {
        let (len, pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        if pos >= bytes.len() {
            return Err(CellError::bad_format(0, pos));
        }
        let nchildren = bytes[pos] as usize;
        let mut pos = pos + 1;
        let mut children = Vec::with_capacity(nchildren);
        for _ in 0..nchildren {
            let (r, new_pos) = Ref::decode(bytes, pos)?;
            children.push(r);
            pos = new_pos;
        }
        Ok((BlobTree::Node { len, children }, pos))
    }
}

/// -------------------------------------------------------------------------
/// Map: hash-nibble keyed trie of (key, value) pairs.
/// -------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum MapTree {
    Leaf(Vec<(Ref, Ref)>),
    Node { count: u64, depth: u8, buckets: Vec<(u8, Ref)> },
}

impl MapTree {
    pub fn count(&self) -> u64 {
        match self {
            MapTree::Leaf(v) => v.len() as u64,
            MapTree::Node { count, .. } => *count,
        }
    }

    pub fn build(mut pairs: Vec<(Value, Value)>) -> Result<MapTree, CellError> {
        pairs.sort_by(|a, b| a.0.canonical_key_bytes().cmp(&b.0.canonical_key_bytes()));
        pairs.dedup_by(|a, b| a.0.canonical_key_bytes() == b.0.canonical_key_bytes());
        let entries: Result<Vec<(Ref, Ref, Hash32)>, CellError> = pairs
            .into_iter()
            .map(|(k, v)| {
                let kh = k.hash()?;
                Ok((Ref::new(k)?, Ref::new(v)?, kh))
            })
            .collect();
        Self::build_at_depth(entries?, 0)
    }

    fn build_at_depth(entries: Vec<(Ref, Ref, Hash32)>, depth: u8) -> Result<MapTree, CellError> {
        if entries.len() <= LEAF_MAX {
            let leaf = entries.into_iter().map(|(k, v, _)| (k, v)).collect();
            return Ok(MapTree::Leaf(leaf));
        }
        let count = entries.len() as u64;
        let mut by_nibble: Vec<Vec<(Ref, Ref, Hash32)>> = (0..FANOUT).map(|_| Vec::new()).collect();
        for (k, v, kh) in entries {
            let n = kh.nibble(depth as usize) as usize;
            by_nibble[n].push((k, v, kh));
        }
        let mut buckets = Vec::new();
        for (n, group) in by_nibble.into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let sub = Self::build_at_depth(group, depth + 1)?;
            buckets.push((n as u8, Ref::new(Value::Map(sub))?));
        }
        Ok(MapTree::Node { count, depth, buckets })
    }

    pub fn to_vec(&self, ctx: &dyn DecodeContext) -> Result<Vec<(Value, Value)>, CellError> {
        match self {
            MapTree::Leaf(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.resolve(ctx)?, v.resolve(ctx)?)))
                .collect(),
            MapTree::Node { buckets, .. } => {
                let mut out = Vec::new();
                for (_, b) in buckets {
                    let v = b.resolve(ctx)?;
                    match v {
                        Value::Map(t) => out.extend(t.to_vec(ctx)?),
                        _ => return Err(CellError::InvalidData("map node bucket not a map".into())),
                    }
                }
                Ok(out)
            }
        }
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            MapTree::Leaf(entries) => {
                super::vlc::encode_vlc_count(out, entries.len() as u64);
                for (k, v) in entries {
                    k.encode(out)?;
                    v.encode(out)?;
                }
            }
            MapTree::Node { count, depth, buckets } => {
                super::vlc::encode_vlc_count(out, *count);
                out.push(*depth);
                out.push(buckets.len() as u8);
                for (n, b) in buckets {
                    out.push(*n);
                    b.encode(out)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn decode_leaf(bytes: &[u8], offset: usize) -> Result<(MapTree, usize), CellError> {
        let (n, mut pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        let mut entries = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let (k, p1) = Ref::decode(bytes, pos)?;
            let (v, p2) = Ref::decode(bytes, p1)?;
            entries.push((k, v));
            pos = p2;
        }
        Ok((MapTree::Leaf(entries), pos))
    }

    pub(super) fn decode_node(bytes: &[u8], offset: usize) -> Result<(MapTree, usize), CellError> {
        let (count, pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        if pos + 1 >= bytes.len() {
            return Err(CellError::bad_format(0, pos));
        }
        let depth = bytes[pos];
        let nbuckets = bytes[pos + 1] as usize;
        let mut pos = pos + 2;
        let mut buckets = Vec::with_capacity(nbuckets);
        for _ in 0..nbuckets {
            if pos >= bytes.len() {
                return Err(CellError::bad_format(0, pos));
            }
            let n = bytes[pos];
            pos += 1;
            let (r, new_pos) = Ref::decode(bytes, pos)?;
            buckets.push((n, r));
            pos = new_pos;
        }
        Ok((MapTree::Node { count, depth, buckets }, pos))
    }
}

/// -------------------------------------------------------------------------
/// Set: hash-nibble keyed trie of unique keys (no values).
/// -------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum SetTree {
    Leaf(Vec<Ref>),
    Node { count: u64, depth: u8, buckets: Vec<(u8, Ref)> },
}

impl SetTree {
    pub fn count(&self) -> u64 {
        match self {
            SetTree::Leaf(v) => v.len() as u64,
            SetTree::Node { count, .. } => *count,
        }
    }

    pub fn build(elems: Vec<Value>) -> Result<SetTree, CellError> {
        let mut entries: Vec<(Ref, Hash32)> = Vec::with_capacity(elems.len());
        for e in elems {
            let h = e.hash()?;
            entries.push((Ref::new(e)?, h));
        }
        entries.sort_by(|a, b| a.1.cmp(&b.1));
        entries.dedup_by(|a, b| a.1 == b.1);
        Self::build_at_depth(entries, 0)
    }

    fn build_at_depth(entries: Vec<(Ref, Hash32)>, depth: u8) -> Result<SetTree, CellError> {
        if entries.len() <= LEAF_MAX {
            return Ok(SetTree::Leaf(entries.into_iter().map(|(r, _)| r).collect()));
        }
        let count = entries.len() as u64;
        let mut by_nibble: Vec<Vec<(Ref, Hash32)>> = (0..FANOUT).map(|_| Vec::new()).collect();
        for (r, h) in entries {
            by_nibble[h.nibble(depth as usize) as usize].push((r, h));
        }
        let mut buckets = Vec::new();
        for (n, group) in by_nibble.into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let sub = Self::build_at_depth(group, depth + 1)?;
            buckets.push((n as u8, Ref::new(Value::Set(sub))?));
        }
        Ok(SetTree::Node { count, depth, buckets })
    }

    pub fn to_vec(&self, ctx: &dyn DecodeContext) -> Result<Vec<Value>, CellError> {
        match self {
            SetTree::Leaf(refs) => refs.iter().map(|r| r.resolve(ctx)).collect(),
            SetTree::Node { buckets, .. } => {
                let mut out = Vec::new();
                for (_, b) in buckets {
                    match b.resolve(ctx)? {
                        Value::Set(t) => out.extend(t.to_vec(ctx)?),
                        _ => return Err(CellError::InvalidData("set node bucket not a set".into())),
                    }
                }
                Ok(out)
            }
        }
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            SetTree::Leaf(refs) => {
                super::vlc::encode_vlc_count(out, refs.len() as u64);
                for r in refs {
                    r.encode(out)?;
                }
            }
            SetTree::Node { count, depth, buckets } => {
                super::vlc::encode_vlc_count(out, *count);
                out.push(*depth);
                out.push(buckets.len() as u8);
                for (n, b) in buckets {
                    out.push(*n);
                    b.encode(out)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn decode_leaf(bytes: &[u8], offset: usize) -> Result<(SetTree, usize), CellError> {
        let (n, mut pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        let mut refs = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let (r, new_pos) = Ref::decode(bytes, pos)?;
            refs.push(r);
            pos = new_pos;
        }
        Ok((SetTree::Leaf(refs), pos))
    }

    pub(super) fn decode_node(bytes: &[u8], offset: usize) -> Result<(SetTree, usize), CellError> {
        let (count, pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        if pos + 1 >= bytes.len() {
            return Err(CellError::bad_format(0, pos));
        }
        let depth = bytes[pos];
        let nbuckets = bytes[pos + 1] as usize;
        let mut pos = pos + 2;
        let mut buckets = Vec::with_capacity(nbuckets);
        for _ in 0..nbuckets {
            if pos >= bytes.len() {
                return Err(CellError::bad_format(0, pos));
            }
            let n = bytes[pos];
            pos += 1;
            let (r, new_pos) = Ref::decode(bytes, pos)?;
            buckets.push((n, r));
            pos = new_pos;
        }
        Ok((SetTree::Node { count, depth, buckets }, pos))
    }
}

/// -------------------------------------------------------------------------
/// BlobMap: ordered map keyed by raw blob-key nibbles (not hashed), so
/// iteration order follows key byte order rather than hash order.
/// -------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum BlobMapTree {
    Leaf(Vec<(Ref, Ref)>),
    Node { count: u64, depth: u8, buckets: Vec<(u8, Ref)> },
}

fn key_nibble(key: &[u8], depth: usize) -> u8 {
    let byte_idx = depth / 2;
    if byte_idx >= key.len() {
        return 0;
    }
    let byte = key[byte_idx];
    if depth % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0F
    }
}

impl BlobMapTree {
    pub fn count(&self) -> u64 {
        match self {
            BlobMapTree::Leaf(v) => v.len() as u64,
            BlobMapTree::Node { count, .. } => *count,
        }
    }

    pub fn build(mut pairs: Vec<(Vec<u8>, Value)>) -> Result<BlobMapTree, CellError> {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs.dedup_by(|a, b| a.0 == b.0);
        let entries: Result<Vec<(Ref, Ref, Vec<u8>)>, CellError> = pairs
            .into_iter()
            .map(|(k, v)| Ok((Ref::new(Value::Blob(super::collections::BlobTree::build(k.clone())?))?, Ref::new(v)?, k)))
            .collect();
        Self::build_at_depth(entries?, 0)
    }

    fn build_at_depth(entries: Vec<(Ref, Ref, Vec<u8>)>, depth: u8) -> Result<BlobMapTree, CellError> {
        if entries.len() <= LEAF_MAX {
            let leaf = entries.into_iter().map(|(k, v, _)| (k, v)).collect();
            return Ok(BlobMapTree::Leaf(leaf));
        }
        let count = entries.len() as u64;
        let mut by_nibble: Vec<Vec<(Ref, Ref, Vec<u8>)>> = (0..FANOUT).map(|_| Vec::new()).collect();
        for (k, v, raw) in entries {
            let n = key_nibble(&raw, depth as usize) as usize;
            by_nibble[n].push((k, v, raw));
        }
        let mut buckets = Vec::new();
        for (n, group) in by_nibble.into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let sub = Self::build_at_depth(group, depth + 1)?;
            buckets.push((n as u8, Ref::new(Value::BlobMap(sub))?));
        }
        Ok(BlobMapTree::Node { count, depth, buckets })
    }

    pub fn to_vec(&self, ctx: &dyn DecodeContext) -> Result<Vec<(Value, Value)>, CellError> {
        match self {
            BlobMapTree::Leaf(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.resolve(ctx)?, v.resolve(ctx)?)))
                .collect(),
            BlobMapTree::Node { buckets, .. } => {
                let mut out = Vec::new();
                for (_, b) in buckets {
                    match b.resolve(ctx)? {
                        Value::BlobMap(t) => out.extend(t.to_vec(ctx)?),
                        _ => return Err(CellError::InvalidData("blobmap node bucket not a blobmap".into())),
                    }
                }
                Ok(out)
            }
        }
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            BlobMapTree::Leaf(entries) => {
                super::vlc::encode_vlc_count(out, entries.len() as u64);
                for (k, v) in entries {
                    k.encode(out)?;
                    v.encode(out)?;
                }
            }
            BlobMapTree::Node { count, depth, buckets } => {
                super::vlc::encode_vlc_count(out, *count);
                out.push(*depth);
                out.push(buckets.len() as u8);
                for (n, b) in buckets {
                    out.push(*n);
                    b.encode(out)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn decode_leaf(bytes: &[u8], offset: usize) -> Result<(BlobMapTree, usize), CellError> {
        let (n, mut pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        let mut entries = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let (k, p1) = Ref::decode(bytes, pos)?;
            let (v, p2) = Ref::decode(bytes, p1)?;
            entries.push((k, v));
            pos = p2;
        }
        Ok((BlobMapTree::Leaf(entries), pos))
    }

    pub(super) fn decode_node(bytes: &[u8], offset: usize) -> Result<(BlobMapTree, usize), CellError> {
        let (count, pos) = super::vlc::decode_vlc_count(bytes, offset)?;
        if pos + 1 >= bytes.len() {
            return Err(CellError::bad_format(0, pos));
        }
        let depth = bytes[pos];
        let nbuckets = bytes[pos + 1] as usize;
        let mut pos = pos + 2;
        let mut buckets = Vec::with_capacity(nbuckets);
        for _ in 0..nbuckets {
            if pos >= bytes.len() {
                return Err(CellError::bad_format(0, pos));
            }
            let n = bytes[pos];
            pos += 1;
            let (r, new_pos) = Ref::decode(bytes, pos)?;
            buckets.push((n, r));
            pos = new_pos;
        }
        Ok((BlobMapTree::Node { count, depth, buckets }, pos))
    }
}
