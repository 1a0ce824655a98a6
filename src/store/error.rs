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

//! Store error taxonomy (§7 IOError/MissingData rows).

use crate::core::cell::error::CellError;
use thiserror::Error;

/// Errors raised by the content-addressed store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem operation failed.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    /// The on-disk index log contains a malformed record.
    #[error("corrupt index record at byte {0}")]
    CorruptIndex(u64),
    /// A cell failed to encode, decode, or validate.
    #[error(transparent)]
    Cell(#[from] CellError),
}
