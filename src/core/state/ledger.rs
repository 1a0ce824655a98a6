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
#![deny(missing_docs)]

//! Account ledger (§4.2, §4.3): the `Address -> AccountStatus` table backing
//! a `State` cell, plus the native operations (`Transfer`, sequence
//! checking) that don't need the external VM. `Invoke`/`Call` mutate
//! accounts too, but only the VM (outside this crate's scope, §1 Non-goals)
//! knows how to run the code that drives those mutations — this module just
//! gives it a well-typed table to read and write.

use crate::core::cell::error::CellError;
use crate::core::cell::ref_::{DecodeContext, Ref};
use crate::core::cell::record::{AccountStatus, Record};
use crate::core::cell::transaction::Transaction;
use crate::core::cell::value::{Value, MAX_ADDRESS};
use crate::core::cell::collections::{MapTree, SeqTree};
use std::collections::BTreeMap;
use thiserror::Error;

/// One pending scheduled transaction (§4.5): an origin account's transaction
/// that becomes eligible for a block once `trigger_timestamp` is reached.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledTransaction {
    pub trigger_timestamp: i64,
    pub origin: u64,
    pub transaction: Transaction,
}

/// Errors raised applying native ledger operations (§7 StateError/SequenceError).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(u64),
    #[error("account {0} already exists")]
    AccountExists(u64),
    #[error("sequence mismatch for account {account}: expected {expected}, got {got}")]
    SequenceMismatch { account: u64, expected: u64, got: u64 },
    #[error("insufficient balance in account {account}: has {balance}, needs {needed}")]
    InsufficientBalance { account: u64, balance: i64, needed: i64 },
    #[error("address {0} exceeds the maximum address value")]
    AddressOutOfRange(u64),
    #[error(transparent)]
    Cell(#[from] CellError),
}

/// The account table: every account's balance, sequence counter, and (for
/// actors) code environment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ledger {
    accounts: BTreeMap<u64, AccountStatus>,
    scheduled: Vec<ScheduledTransaction>,
}

impl Ledger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self { accounts: BTreeMap::new(), scheduled: Vec::new() }
    }

    /// Look up an account.
    pub fn get(&self, address: u64) -> Option<&AccountStatus> {
        self.accounts.get(&address)
    }

    /// Create a new account with the given starting balance and sequence 0.
    pub fn create_account(&mut self, address: u64, balance: i64, is_actor: bool) -> Result<(), LedgerError> {
        if address > MAX_ADDRESS {
            return Err(LedgerError::AddressOutOfRange(address));
        }
        if self.accounts.contains_key(&address) {
            return Err(LedgerError::AccountExists(address));
        }
        self.accounts.insert(
            address,
            AccountStatus { sequence: 0, balance, is_actor, environment: None },
        );
        Ok(())
    }

    /// Check (without mutating) that `sequence` is the next expected
    /// sequence number for `address` (§7 SequenceError).
    pub fn check_sequence(&self, address: u64, sequence: u64) -> Result<(), LedgerError> {
        let acct = self.accounts.get(&address).ok_or(LedgerError::AccountNotFound(address))?;
        if acct.sequence != sequence {
            return Err(LedgerError::SequenceMismatch { account: address, expected: acct.sequence, got: sequence });
        }
        Ok(())
    }

    /// Apply a native coin transfer: validates sequence, debits `from`,
    /// credits `to`, and advances `from`'s sequence counter.
    pub fn apply_transfer(&mut self, from: u64, to: u64, amount: i64, sequence: u64) -> Result<(), LedgerError> {
        self.check_sequence(from, sequence)?;
        {
            let sender = self.accounts.get(&from).ok_or(LedgerError::AccountNotFound(from))?;
            if sender.balance < amount {
                return Err(LedgerError::InsufficientBalance { account: from, balance: sender.balance, needed: amount });
            }
        }
        if !self.accounts.contains_key(&to) {
            return Err(LedgerError::AccountNotFound(to));
        }
        {
            let sender = self.accounts.get_mut(&from).unwrap();
            sender.balance -= amount;
            sender.sequence += 1;
        }
        self.accounts.get_mut(&to).unwrap().balance += amount;
        Ok(())
    }

    /// Advance an account's sequence counter after a non-transfer
    /// transaction (Invoke/Call/Multi) has been validated and handed to the
    /// VM executor.
    pub fn advance_sequence(&mut self, address: u64, sequence: u64) -> Result<(), LedgerError> {
        self.check_sequence(address, sequence)?;
        self.accounts.get_mut(&address).ok_or(LedgerError::AccountNotFound(address))?.sequence += 1;
        Ok(())
    }

    /// Debit `address` by `amount` for juice/memory fees (§4.5 "after VM"
    /// billing) without touching its sequence counter, which the caller
    /// advances separately once.
    pub fn debit_for_fees(&mut self, address: u64, amount: i64) -> Result<(), LedgerError> {
        let acct = self.accounts.get_mut(&address).ok_or(LedgerError::AccountNotFound(address))?;
        if acct.balance < amount {
            return Err(LedgerError::InsufficientBalance { account: address, balance: acct.balance, needed: amount });
        }
        acct.balance -= amount;
        Ok(())
    }

    /// Apply a transfer without checking or advancing the sequence counter;
    /// used for `Multi` sub-transactions, which share their enclosing
    /// transaction's single sequence slot.
    pub fn apply_transfer_no_sequence(&mut self, from: u64, to: u64, amount: i64) -> Result<(), LedgerError> {
        {
            let sender = self.accounts.get(&from).ok_or(LedgerError::AccountNotFound(from))?;
            if sender.balance < amount {
                return Err(LedgerError::InsufficientBalance { account: from, balance: sender.balance, needed: amount });
            }
        }
        if !self.accounts.contains_key(&to) {
            return Err(LedgerError::AccountNotFound(to));
        }
        self.accounts.get_mut(&from).unwrap().balance -= amount;
        self.accounts.get_mut(&to).unwrap().balance += amount;
        Ok(())
    }

    /// Queue a transaction to become eligible once the global clock reaches
    /// `trigger_timestamp` (§4.5), keeping the queue ordered by trigger time.
    pub fn schedule(&mut self, trigger_timestamp: i64, origin: u64, transaction: Transaction) {
        let entry = ScheduledTransaction { trigger_timestamp, origin, transaction };
        let pos = self.scheduled.partition_point(|e| e.trigger_timestamp <= trigger_timestamp);
        self.scheduled.insert(pos, entry);
    }

    /// Remove and return up to `limit` scheduled transactions whose trigger
    /// timestamp is `<= now`, in trigger-time order (§4.5: "pulled from the
    /// state's scheduled queue and run before the block's explicit
    /// transactions").
    pub fn pull_due(&mut self, now: i64, limit: usize) -> Vec<ScheduledTransaction> {
        let due = self.scheduled.iter().take_while(|e| e.trigger_timestamp <= now).count().min(limit);
        self.scheduled.drain(0..due).collect()
    }

    /// How many transactions are currently queued (due or not).
    pub fn scheduled_len(&self) -> usize {
        self.scheduled.len()
    }

    /// Encode the scheduled queue as the `Vector` cell a `State` record
    /// points to: one entry per transaction, `[trigger_timestamp, origin,
    /// transaction]`.
    pub fn scheduled_ref(&self) -> Result<Ref, CellError> {
        let entries = self
            .scheduled
            .iter()
            .map(|e| -> Result<Value, CellError> {
                let triple = vec![
                    Ref::embedded(Value::Long(e.trigger_timestamp)),
                    Ref::embedded(Value::Address(e.origin)),
                    Ref::new(Value::Transaction(Box::new(e.transaction.clone())))?,
                ];
                Ok(Value::Vector(SeqTree::Leaf(triple)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ref::new(Value::Vector(SeqTree::build(entries, Value::Vector)?))
    }

    /// Rebuild the scheduled queue from a previously-encoded `Vector` cell.
    pub fn scheduled_from_vec(tree: &SeqTree, ctx: &dyn DecodeContext) -> Result<Vec<ScheduledTransaction>, CellError> {
        let mut out = Vec::new();
        for entry in tree.to_vec(ctx)? {
            let refs = match entry {
                Value::Vector(SeqTree::Leaf(refs)) => refs,
                other => return Err(CellError::InvalidData(format!("scheduled entry is not a leaf vector: {other:?}"))),
            };
            if refs.len() != 3 {
                return Err(CellError::InvalidData("scheduled entry must have 3 fields".into()));
            }
            let trigger_timestamp = match refs[0].resolve(ctx)? {
                Value::Long(n) => n,
                other => return Err(CellError::InvalidData(format!("scheduled trigger_timestamp is not a Long: {other:?}"))),
            };
            let origin = match refs[1].resolve(ctx)? {
                Value::Address(a) => a,
                other => return Err(CellError::InvalidData(format!("scheduled origin is not an Address: {other:?}"))),
            };
            let transaction = match refs[2].resolve(ctx)? {
                Value::Transaction(t) => *t,
                other => return Err(CellError::InvalidData(format!("scheduled transaction is not a Transaction: {other:?}"))),
            };
            out.push(ScheduledTransaction { trigger_timestamp, origin, transaction });
        }
        Ok(out)
    }

    /// Encode the account table as the `Map` cell a `State` record points to.
    pub fn to_value(&self) -> Result<Value, CellError> {
        let pairs = self
            .accounts
            .iter()
            .map(|(addr, status)| (Value::Address(*addr), Value::Record(Box::new(Record::AccountStatus(status.clone())))))
            .collect();
        Ok(Value::Map(MapTree::build(pairs)?))
    }

    /// Rebuild a ledger from a previously-encoded account `Map` cell.
    pub fn from_map(tree: &MapTree, ctx: &dyn DecodeContext) -> Result<Ledger, CellError> {
        let mut accounts = BTreeMap::new();
        for (k, v) in tree.to_vec(ctx)? {
            let addr = match k {
                Value::Address(a) => a,
                _ => return Err(CellError::InvalidData("account table key is not an Address".into())),
            };
            let status = match v {
                Value::Record(r) => match *r {
                    Record::AccountStatus(s) => s,
                    _ => return Err(CellError::InvalidData("account table value is not an AccountStatus".into())),
                },
                _ => return Err(CellError::InvalidData("account table value is not a Record".into())),
            };
            accounts.insert(addr, status);
        }
        Ok(Ledger { accounts, scheduled: Vec::new() })
    }
}

/// Wrap a ledger's accounts ref for embedding in a `State` record, choosing
/// between embedding and by-hash storage per the usual rule (§4.1).
pub fn accounts_ref(ledger: &Ledger) -> Result<Ref, CellError> {
    Ref::new(ledger.to_value()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::ref_::NoContext;

    #[test]
    fn transfer_moves_balance_and_advances_sequence() {
        let mut ledger = Ledger::new();
        ledger.create_account(1, 100, false).unwrap();
        ledger.create_account(2, 0, false).unwrap();
        ledger.apply_transfer(1, 2, 30, 0).unwrap();
        assert_eq!(ledger.get(1).unwrap().balance, 70);
        assert_eq!(ledger.get(2).unwrap().balance, 30);
        assert_eq!(ledger.get(1).unwrap().sequence, 1);
    }

    #[test]
    fn transfer_rejects_wrong_sequence() {
        let mut ledger = Ledger::new();
        ledger.create_account(1, 100, false).unwrap();
        ledger.create_account(2, 0, false).unwrap();
        let err = ledger.apply_transfer(1, 2, 30, 7).unwrap_err();
        assert!(matches!(err, LedgerError::SequenceMismatch { .. }));
    }

    #[test]
    fn transfer_rejects_insufficient_balance() {
        let mut ledger = Ledger::new();
        ledger.create_account(1, 10, false).unwrap();
        ledger.create_account(2, 0, false).unwrap();
        let err = ledger.apply_transfer(1, 2, 30, 0).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn pull_due_respects_trigger_time_order_and_limit() {
        let mut ledger = Ledger::new();
        ledger.schedule(30, 1, Transaction::Transfer { sequence: 0, target: 2, amount: 1 });
        ledger.schedule(10, 1, Transaction::Transfer { sequence: 1, target: 2, amount: 2 });
        ledger.schedule(20, 1, Transaction::Transfer { sequence: 2, target: 2, amount: 3 });
        ledger.schedule(40, 1, Transaction::Transfer { sequence: 3, target: 2, amount: 4 });

        let due = ledger.pull_due(25, 2);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].trigger_timestamp, 10);
        assert_eq!(due[1].trigger_timestamp, 20);
        assert_eq!(ledger.scheduled_len(), 2);

        let rest = ledger.pull_due(25, 10);
        assert_eq!(rest.len(), 0, "the timestamp-40 entry is not yet due");
    }

    #[test]
    fn scheduled_queue_roundtrips_through_vector_cell() {
        let mut ledger = Ledger::new();
        ledger.schedule(5, 9, Transaction::Transfer { sequence: 0, target: 10, amount: 7 });
        let value = ledger.scheduled_ref().unwrap().resolve(&NoContext).unwrap();
        let tree = match value {
            Value::Vector(t) => t,
            _ => panic!("expected vector"),
        };
        let restored = Ledger::scheduled_from_vec(&tree, &NoContext).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].trigger_timestamp, 5);
        assert_eq!(restored[0].origin, 9);
        assert_eq!(restored[0].transaction, Transaction::Transfer { sequence: 0, target: 10, amount: 7 });
    }

    #[test]
    fn ledger_roundtrips_through_map_cell() {
        let mut ledger = Ledger::new();
        ledger.create_account(1, 100, false).unwrap();
        ledger.create_account(2, 0, true).unwrap();
        let value = ledger.to_value().unwrap();
        let tree = match value {
            Value::Map(t) => t,
            _ => panic!("expected map"),
        };
        let restored = Ledger::from_map(&tree, &NoContext).unwrap();
        assert_eq!(restored, ledger);
    }
}
