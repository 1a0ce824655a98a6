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

//! Transaction cells (§4.2): the four shapes an account can submit. Every
//! transaction carries the account's next expected `sequence` number, which
//! the executor checks against on-chain account state before applying it
//! (mismatch is a `SequenceError`, §7).

use super::error::CellError;
use super::ref_::Ref;
use super::tag::{TAG_CALL, TAG_INVOKE, TAG_MULTI, TAG_TRANSFER};
use super::value::Value;
use super::vlc::{decode_vlc_count, decode_vlc_i64, encode_vlc_count, encode_vlc_i64};

/// How a `Multi` transaction's sub-transactions relate to each other (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiMode {
    /// Best-effort: run every sub-transaction independently; a failure is
    /// isolated to that sub-transaction's own result.
    Any,
    /// All-or-nothing: the first failure rolls back every effect of the
    /// whole batch.
    All,
    /// Run sub-transactions in order, stopping after the first success.
    First,
    /// Run sub-transactions in order, stopping after the first success
    /// (later entries are not attempted once one succeeds, but unlike
    /// `First` a run that never succeeds still reports every attempt).
    Until,
}

impl MultiMode {
    fn to_byte(self) -> u8 {
        match self {
            MultiMode::Any => 0,
            MultiMode::All => 1,
            MultiMode::First => 2,
            MultiMode::Until => 3,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(MultiMode::Any),
            1 => Some(MultiMode::All),
            2 => Some(MultiMode::First),
            3 => Some(MultiMode::Until),
            _ => None,
        }
    }
}

/// One of the four transaction shapes a signed account submits.
#[derive(Clone, Debug, PartialEq)]
pub enum Transaction {
    /// Execute arbitrary code in the signer's own account context.
    Invoke { sequence: u64, code: Ref },
    /// Move coin from the signer's account to `target`.
    Transfer { sequence: u64, target: u64, amount: i64 },
    /// Invoke a named exported function on `target` with `args`.
    Call { sequence: u64, target: u64, function: String, args: Ref },
    /// A batch of sub-transactions applied under one outer sequence number,
    /// combined according to `mode`.
    Multi { sequence: u64, mode: MultiMode, transactions: Vec<Ref> },
}

impl Transaction {
    /// The sequence number every transaction shape carries.
    pub fn sequence(&self) -> u64 {
        match self {
            Transaction::Invoke { sequence, .. }
            | Transaction::Transfer { sequence, .. }
            | Transaction::Call { sequence, .. }
            | Transaction::Multi { sequence, .. } => *sequence,
        }
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) -> Result<(), CellError> {
        match self {
            Transaction::Invoke { sequence, code } => {
                out.push(TAG_INVOKE);
                encode_vlc_count(out, *sequence);
                code.encode(out)?;
            }
            Transaction::Transfer { sequence, target, amount } => {
                out.push(TAG_TRANSFER);
                encode_vlc_count(out, *sequence);
                encode_vlc_count(out, *target);
                encode_vlc_i64(out, *amount);
            }
            Transaction::Call { sequence, target, function, args } => {
                out.push(TAG_CALL);
                encode_vlc_count(out, *sequence);
                encode_vlc_count(out, *target);
                encode_vlc_count(out, function.len() as u64);
                out.extend_from_slice(function.as_bytes());
                args.encode(out)?;
            }
            Transaction::Multi { sequence, mode, transactions } => {
                out.push(TAG_MULTI);
                encode_vlc_count(out, *sequence);
                out.push(mode.to_byte());
                out.push(transactions.len() as u8);
                for t in transactions {
                    t.encode(out)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn decode(bytes: &[u8], offset: usize) -> Result<(Transaction, usize), CellError> {
        if offset >= bytes.len() {
            return Err(CellError::bad_format(0, offset));
        }
        let tag = bytes[offset];
        let pos = offset + 1;
        let (sequence, pos) = decode_vlc_count(bytes, pos)?;
        match tag {
            TAG_INVOKE => {
                let (code, p) = Ref::decode(bytes, pos)?;
                Ok((Transaction::Invoke { sequence, code }, p))
            }
            TAG_TRANSFER => {
                let (target, p1) = decode_vlc_count(bytes, pos)?;
                let (amount, p2) = decode_vlc_i64(bytes, p1)?;
                Ok((Transaction::Transfer { sequence, target, amount }, p2))
            }
            TAG_CALL => {
                let (target, p1) = decode_vlc_count(bytes, pos)?;
                let (flen, p2) = decode_vlc_count(bytes, p1)?;
                let flen = flen as usize;
                let fend = p2 + flen;
                if fend > bytes.len() {
                    return Err(CellError::bad_format(tag, p2));
                }
                let function = std::str::from_utf8(&bytes[p2..fend])
                    .map_err(|_| CellError::InvalidData("call function name is not valid utf-8".into()))?
                    .to_string();
                let (args, p3) = Ref::decode(bytes, fend)?;
                Ok((Transaction::Call { sequence, target, function, args }, p3))
            }
            TAG_MULTI => {
                if pos + 1 >= bytes.len() {
                    return Err(CellError::bad_format(tag, pos));
                }
                let mode = MultiMode::from_byte(bytes[pos])
                    .ok_or_else(|| CellError::bad_format(bytes[pos], pos))?;
                let n = bytes[pos + 1] as usize;
                let mut p = pos + 2;
                let mut transactions = Vec::with_capacity(n);
                for _ in 0..n {
                    let (r, np) = Ref::decode(bytes, p)?;
                    transactions.push(r);
                    p = np;
                }
                Ok((Transaction::Multi { sequence, mode, transactions }, p))
            }
            other => Err(CellError::bad_format(other, offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::ref_::Ref;

    #[test]
    fn transfer_roundtrip() {
        let tx = Transaction::Transfer { sequence: 3, target: 9, amount: -17 };
        let mut out = Vec::new();
        tx.encode(&mut out).unwrap();
        let (decoded, used) = Transaction::decode(&out, 0).unwrap();
        assert_eq!(used, out.len());
        assert_eq!(decoded, tx);
    }

    #[test]
    fn multi_roundtrip() {
        let inner = Transaction::Transfer { sequence: 1, target: 2, amount: 5 };
        let wrapped = Ref::new(Value::Transaction(Box::new(inner))).unwrap();
        let tx = Transaction::Multi { sequence: 10, mode: MultiMode::All, transactions: vec![wrapped] };
        let mut out = Vec::new();
        tx.encode(&mut out).unwrap();
        let (decoded, used) = Transaction::decode(&out, 0).unwrap();
        assert_eq!(used, out.len());
        assert_eq!(decoded, tx);
    }
}
