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

//! Wire protocol error taxonomy (§7 IOError/BadFormat rows, as they apply to
//! framing and multi-cell decoding).

use crate::core::cell::error::CellError;
use thiserror::Error;

/// Errors raised reading/writing framed multi-cell messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The underlying connection failed.
    #[error("wire io error: {0}")]
    Io(#[from] std::io::Error),
    /// A declared message length exceeds [`super::frame::MAX_MESSAGE_LEN`].
    #[error("message length {0} exceeds the {max} byte limit", max = super::frame::MAX_MESSAGE_LEN)]
    TooLarge(u64),
    /// The length prefix itself was not valid VLC.
    #[error("malformed length prefix")]
    BadLengthPrefix,
    /// A cell within the message failed to encode, decode, or validate.
    #[error(transparent)]
    Cell(#[from] CellError),
    /// A trailing cell's own top-level value would have been embeddable —
    /// only non-embedded cells are ever sent by hash as trailers (§6).
    #[error("embedded value appears among multi-cell trailers")]
    EmbeddedTrailer,
    /// The peer's connection closed before a full frame arrived.
    #[error("connection closed mid-frame")]
    Truncated,
}
