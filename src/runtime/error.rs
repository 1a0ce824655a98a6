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

//! Transaction-execution error taxonomy (§7 rows below `IOError`): every one
//! of these is captured into the failing transaction's own `TxResult` rather
//! than halting block execution.

use crate::core::cell::error::CellError;
use crate::core::state::ledger::LedgerError;
use thiserror::Error;

/// Why a single transaction failed to apply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Signature on the enclosing `SignedData` did not verify.
    #[error("signature error: {0}")]
    Signature(String),
    /// Transaction's sequence number did not match `account.sequence + 1`.
    #[error("sequence error: {0}")]
    Sequence(String),
    /// A precondition inside the VM or native execution path failed.
    #[error("state error: {0}")]
    State(String),
    /// Juice consumed exceeded the configured limit.
    #[error("juice error: {0}")]
    Juice(String),
    /// A trust-monitor checkpoint denied the operation.
    #[error("trust error: {0}")]
    Trust(String),
}

impl ExecutionError {
    /// The `error_code` string recorded in a `TxResult` (§7 column 1).
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Signature(_) => "SignatureError",
            ExecutionError::Sequence(_) => "SequenceError",
            ExecutionError::State(_) => "StateError",
            ExecutionError::Juice(_) => "JuiceError",
            ExecutionError::Trust(_) => "TrustError",
        }
    }
}

impl From<LedgerError> for ExecutionError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::SequenceMismatch { .. } => ExecutionError::Sequence(e.to_string()),
            LedgerError::InsufficientBalance { .. }
            | LedgerError::AccountNotFound(_)
            | LedgerError::AccountExists(_)
            | LedgerError::AddressOutOfRange(_) => ExecutionError::State(e.to_string()),
            LedgerError::Cell(c) => ExecutionError::State(c.to_string()),
        }
    }
}

impl From<CellError> for ExecutionError {
    fn from(e: CellError) -> Self {
        ExecutionError::State(e.to_string())
    }
}
