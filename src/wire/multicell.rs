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

//! Multi-cell message encoding (§6): a payload is the first cell's encoding
//! followed by zero or more additional non-embedded cells' encodings,
//! concatenated. The receiver decodes the first cell, then decodes trailers
//! one after another into a hash-keyed map that plays the same
//! [`DecodeContext`] role the content-addressed store plays for persisted
//! cells — any `Ref::Hash` reached while walking the first cell (or a
//! trailer it points to) resolves against this map instead of a store.

use super::error::WireError;
use crate::core::cell::hash::Hash32;
use crate::core::cell::ref_::{DecodeContext, Ref};
use crate::core::cell::{CellError, Value};
use std::collections::{BTreeSet, HashMap};

/// A decode context backed by a single message's trailing cells.
pub struct TrailerContext {
    cells: HashMap<Hash32, Value>,
}

impl DecodeContext for TrailerContext {
    fn resolve(&self, hash: &Hash32) -> Result<Value, CellError> {
        self.cells.get(hash).cloned().ok_or(CellError::MissingData(*hash))
    }
}

/// Encode `value` as a multi-cell message payload: its own encoding, then
/// every non-embedded descendant it (transitively) references, resolved
/// through `ctx` and ordered so a dependency always precedes its dependent.
pub fn encode_message(value: &Value, ctx: &dyn DecodeContext) -> Result<Vec<u8>, WireError> {
    let mut out = value.encode_to_vec()?;
    let mut seen = BTreeSet::new();
    let mut trailers = Vec::new();
    collect_trailers(value, ctx, &mut seen, &mut trailers)?;
    for (_, bytes) in trailers {
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}

fn collect_trailers(
    value: &Value,
    ctx: &dyn DecodeContext,
    seen: &mut BTreeSet<Hash32>,
    out: &mut Vec<(Hash32, Vec<u8>)>,
) -> Result<(), WireError> {
    for child in value.direct_refs() {
        if let Ref::Hash(_) | Ref::Pending(_, _) = child {
            let hash = child.hash()?;
            if seen.contains(&hash) {
                continue;
            }
            let resolved = child.resolve(ctx)?;
            collect_trailers(&resolved, ctx, seen, out)?;
            if seen.insert(hash) {
                out.push((hash, resolved.encode_to_vec()?));
            }
        }
    }
    Ok(())
}

/// Decode a multi-cell message payload, returning the first cell and a
/// context able to resolve every hash reference it (transitively) needs.
pub fn decode_message(bytes: &[u8]) -> Result<(Value, TrailerContext), WireError> {
    let (first, mut pos) = Value::decode(bytes, 0)?;
    let mut cells = HashMap::new();
    while pos < bytes.len() {
        let (trailer, next) = Value::decode(bytes, pos)?;
        if trailer.is_embeddable()? {
            return Err(WireError::EmbeddedTrailer);
        }
        let hash = trailer.hash()?;
        cells.insert(hash, trailer);
        pos = next;
    }
    Ok((first, TrailerContext { cells }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::collections::BlobTree;
    use crate::core::cell::ref_::NoContext;

    #[test]
    fn message_with_no_trailers_roundtrips() {
        let value = Value::Long(42);
        let bytes = encode_message(&value, &NoContext).unwrap();
        let (decoded, _ctx) = decode_message(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn non_embedded_child_travels_as_a_trailer_and_resolves() {
        let original_bytes = vec![7u8; 5000];
        let big = Value::Blob(BlobTree::build(original_bytes.clone()).unwrap());
        let child_ref = Ref::new(big.clone()).unwrap();
        assert!(!child_ref.is_embedded());
        let child_hash = child_ref.hash().unwrap();

        let parent = Value::Vector(crate::core::cell::collections::SeqTree::Leaf(vec![child_ref]));

        let bytes = encode_message(&parent, &NoContext).unwrap();
        let (decoded, ctx) = decode_message(&bytes).unwrap();
        assert_eq!(decoded.direct_refs()[0].hash().unwrap(), child_hash);

        let resolved = decoded.direct_refs()[0].resolve(&ctx).unwrap();
        let resolved_bytes = match resolved {
            Value::Blob(t) => t.to_bytes(&ctx).unwrap(),
            other => panic!("expected a blob, got {other:?}"),
        };
        assert_eq!(resolved_bytes, original_bytes);
    }

    #[test]
    fn embedded_value_among_trailers_is_rejected() {
        // Hand-craft a payload whose "trailer" region is actually an embeddable
        // cell's encoding, which §6 forbids.
        let first = Value::Long(1).encode_to_vec().unwrap();
        let fake_trailer = Value::Long(2).encode_to_vec().unwrap();
        let mut bytes = first;
        bytes.extend_from_slice(&fake_trailer);
        let err = decode_message(&bytes).unwrap_err();
        assert!(matches!(err, WireError::EmbeddedTrailer));
    }
}
