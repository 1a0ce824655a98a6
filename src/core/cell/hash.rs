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

//! Content hashing: `hash(cell) = H(encoding(cell))`, a 32-byte BLAKE3 digest.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte content hash, the identity of a cell.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    /// Wrap raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash of an empty encoding; used as the store's null-root sentinel.
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Hash a canonical cell encoding.
    pub fn of(encoding: &[u8]) -> Self {
        Self(*blake3::hash(encoding).as_bytes())
    }

    /// Nibble (4 bits) at `depth` from the most significant end, used by hash-keyed
    /// map/set trees to choose a child bucket (0..16).
    pub fn nibble(&self, depth: usize) -> u8 {
        let byte = self.0[depth / 2];
        if depth % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        }
    }

    /// Hex string for logs and diagnostics.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = Hash32::of(b"hello");
        let b = Hash32::of(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_input_distinct_hash() {
        assert_ne!(Hash32::of(b"a"), Hash32::of(b"b"));
    }

    #[test]
    fn nibble_extraction() {
        let h = Hash32::from_bytes([0xAB; 32]);
        assert_eq!(h.nibble(0), 0xA);
        assert_eq!(h.nibble(1), 0xB);
    }
}
