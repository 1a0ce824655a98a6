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

//! Peer-server error taxonomy (§7's `IOError`/`FatalError` rows, plus the
//! config-loading errors `launch_peer` can raise before a worker ever
//! starts).

use crate::core::cell::error::CellError;
use crate::core::security::keystore::KeystoreError;
use crate::store::error::StoreError;
use crate::wire::error::WireError;
use thiserror::Error;

/// Everything that can keep a peer from starting, or force it to stop.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `NodeConfig` failed to load or parse.
    #[error("config error: {0}")]
    Config(String),
    /// The identity keystore could not be opened.
    #[error("keystore error: {0:?}")]
    Keystore(KeystoreError),
    /// The content-addressed store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A cell failed to encode, decode, or validate (§7 `BadFormat`/
    /// `InvalidData`/`MissingData`).
    #[error(transparent)]
    Cell(#[from] CellError),
    /// A connection-level wire error (§7 `IOError`).
    #[error(transparent)]
    Wire(#[from] WireError),
    /// An unrecoverable condition a worker cannot continue past (§7
    /// `FatalError`): e.g. the genesis state failed to decode.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<KeystoreError> for ServerError {
    fn from(e: KeystoreError) -> Self {
        ServerError::Keystore(e)
    }
}
