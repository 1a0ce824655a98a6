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

//! Code cells (§4.1 Non-goals, §9): opaque payloads the ledger core moves,
//! hashes, and embeds like any other cell but never interprets. Evaluating
//! them is the external VM's job; the core only needs to carry their bytes
//! faithfully.

use super::collections::BlobTree;
use super::error::CellError;
use super::tag::{TAG_CORE_DEF, TAG_FN, TAG_MULTI_FN, TAG_OP};

/// An opaque code payload, distinguished only by which kind of expression it
/// was produced from; the bytes themselves are meaningless to the core.
#[derive(Clone, Debug, PartialEq)]
pub enum Code {
    Op(BlobTree),
    Fn(BlobTree),
    MultiFn(BlobTree),
    CoreDef(BlobTree),
}

impl Code {
    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        let (tag, tree) = match self {
            Code::Op(t) => (TAG_OP, t),
            Code::Fn(t) => (TAG_FN, t),
            Code::MultiFn(t) => (TAG_MULTI_FN, t),
            Code::CoreDef(t) => (TAG_CORE_DEF, t),
        };
        out.push(tag);
        out.push(match tree {
            BlobTree::Leaf(_) => 0,
            BlobTree::Node { .. } => 1,
        });
        tree.encode(out)
    }

    pub(super) fn decode(bytes: &[u8], offset: usize) -> Result<(Code, usize), CellError> {
        if offset >= bytes.len() {
            return Err(CellError::bad_format(0, offset));
        }
        let tag = bytes[offset];
        let pos = offset + 1;
        if pos >= bytes.len() {
            return Err(CellError::bad_format(tag, pos));
        }
        let (tree, end) = match bytes[pos] {
            0 => BlobTree::decode_leaf(bytes, pos + 1)?,
            1 => BlobTree::decode_node(bytes, pos + 1)?,
            other => return Err(CellError::bad_format(other, pos)),
        };
        let code = match tag {
            TAG_OP => Code::Op(tree),
            TAG_FN => Code::Fn(tree),
            TAG_MULTI_FN => Code::MultiFn(tree),
            TAG_CORE_DEF => Code::CoreDef(tree),
            other => return Err(CellError::bad_format(other, offset)),
        };
        Ok((code, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_roundtrip() {
        let code = Code::Fn(BlobTree::build(vec![1, 2, 3, 4]).unwrap());
        let mut out = Vec::new();
        code.encode(&mut out).unwrap();
        let (decoded, used) = Code::decode(&out, 0).unwrap();
        assert_eq!(used, out.len());
        assert_eq!(decoded, code);
    }
}
