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

//! Tag-byte dispatch table. The high nibble of a tag identifies its family
//! (DESIGN NOTES §9); one decode function per tag, no inheritance hierarchy.

/// Singletons.
pub const TAG_NULL: u8 = 0x00;
pub const TAG_FALSE: u8 = 0x01;
pub const TAG_TRUE: u8 = 0x02;

/// Numeric family (0x1x).
pub const TAG_LONG: u8 = 0x10;
pub const TAG_BIGINT: u8 = 0x11;
pub const TAG_DOUBLE: u8 = 0x12;

/// Binary/text (0x2x).
pub const TAG_BLOB_LEAF: u8 = 0x20;
pub const TAG_BLOB_NODE: u8 = 0x21;
pub const TAG_CSTRING: u8 = 0x22;

/// Basic (0x3x).
pub const TAG_SYMBOL: u8 = 0x30;
pub const TAG_KEYWORD: u8 = 0x31;
pub const TAG_CHARACTER: u8 = 0x32;
pub const TAG_ADDRESS: u8 = 0x33;

/// Structure (0x8x) — 16-way shallow trees.
pub const TAG_VECTOR_LEAF: u8 = 0x80;
pub const TAG_VECTOR_NODE: u8 = 0x81;
pub const TAG_LIST_LEAF: u8 = 0x82;
pub const TAG_LIST_NODE: u8 = 0x83;
pub const TAG_MAP_LEAF: u8 = 0x84;
pub const TAG_MAP_NODE: u8 = 0x85;
pub const TAG_SET_LEAF: u8 = 0x86;
pub const TAG_SET_NODE: u8 = 0x87;
pub const TAG_BLOBMAP_LEAF: u8 = 0x88;
pub const TAG_BLOBMAP_NODE: u8 = 0x89;

/// Wrapper (0x9x).
pub const TAG_SIGNED_DATA: u8 = 0x90;

/// Record family (0xAx).
pub const TAG_BLOCK: u8 = 0xA0;
pub const TAG_ORDER: u8 = 0xA1;
pub const TAG_BELIEF: u8 = 0xA2;
pub const TAG_STATE: u8 = 0xA3;
pub const TAG_RESULT: u8 = 0xA4;
pub const TAG_BLOCK_RESULT: u8 = 0xA5;
pub const TAG_PEER_STATUS: u8 = 0xA6;
pub const TAG_ACCOUNT_STATUS: u8 = 0xA7;

/// Code family (0xCx) — opaque to the core, moved but never evaluated.
pub const TAG_OP: u8 = 0xC0;
pub const TAG_FN: u8 = 0xC1;
pub const TAG_MULTI_FN: u8 = 0xC2;
pub const TAG_CORE_DEF: u8 = 0xC3;

/// Transaction family (0xDx).
pub const TAG_INVOKE: u8 = 0xD0;
pub const TAG_TRANSFER: u8 = 0xD1;
pub const TAG_CALL: u8 = 0xD2;
pub const TAG_MULTI: u8 = 0xD3;

/// Wire-only message family (0xEx) — never consensed or stored, only ever
/// carried inside a single multi-cell message (§6).
pub const TAG_QUERY: u8 = 0xE0;
pub const TAG_STATUS: u8 = 0xE1;
pub const TAG_CHALLENGE: u8 = 0xE2;
pub const TAG_CHALLENGE_RESPONSE: u8 = 0xE3;

/// Reserved marker (outside the 0x00-0xDF value tag space): the following 32
/// bytes are a hash reference to a non-embedded cell, resolved against the
/// active decode context (store or trailing multi-cell map) rather than
/// decoded inline.
pub const TAG_REF: u8 = 0xFE;

/// The family (high nibble) of a tag, used for coarse-grained dispatch and
/// error reporting.
pub fn family_of(tag: u8) -> &'static str {
    match tag & 0xF0 {
        0x00 => "singleton",
        0x10 => "numeric",
        0x20 => "binary",
        0x30 => "basic",
        0x80 => "structure",
        0x90 => "wrapper",
        0xA0 => "record",
        0xC0 => "code",
        0xD0 => "transaction",
        0xE0 => "message",
        _ => "unknown",
    }
}
