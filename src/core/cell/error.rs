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

//! Decode/validation error taxonomy for the cell layer (spec §7 rows: BadFormat,
//! MissingData, InvalidData).

use thiserror::Error;

/// Errors raised while decoding or validating a cell encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CellError {
    /// Malformed bytes: bad tag, non-canonical VLC, truncated buffer, oversize encoding,
    /// or an embedded/non-embedded cell in the wrong place. Carries the offending tag and
    /// buffer offset for diagnostics.
    #[error("bad format: tag={tag:#04x} offset={offset}")]
    BadFormat {
        /// Tag byte under decode when the failure was detected.
        tag: u8,
        /// Byte offset into the buffer being decoded.
        offset: usize,
    },
    /// A referenced hash is not resolvable from the current store/decode context.
    #[error("missing data for hash {0}")]
    MissingData(crate::core::cell::hash::Hash32),
    /// Decode succeeded structurally but the resulting value fails a semantic check
    /// (e.g. an Address out of range, a non-canonical collection shape).
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl CellError {
    /// Construct a `BadFormat` at a given tag/offset.
    pub fn bad_format(tag: u8, offset: usize) -> Self {
        CellError::BadFormat { tag, offset }
    }
}
