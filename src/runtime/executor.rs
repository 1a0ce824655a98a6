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

//! Block execution (§4.5): applies a consensed block's transactions to the
//! current `Ledger` in order, through the native `Transfer` path or the
//! external `Vm`, recording one `TxResult` per transaction and folding them
//! into a `BlockResult`.

use super::error::ExecutionError;
use super::trust::TrustMonitor;
use super::vm::Vm;
use crate::core::cell::collections::{BlobTree, SeqTree};
use crate::core::cell::error::CellError;
use crate::core::cell::hash::Hash32;
use crate::core::cell::record::{Block, BlockResult, Record, TxResult};
use crate::core::cell::ref_::{DecodeContext, Ref};
use crate::core::cell::signed::SignedData;
use crate::core::cell::transaction::{MultiMode, Transaction};
use crate::core::cell::value::{Value, MAX_ADDRESS};
use crate::core::state::ledger::{Ledger, ScheduledTransaction};
use tracing::{instrument, warn};

/// Juice/memory pricing and batch limits for one executor instance (spec.md
/// §6 `launch_peer` config fields relevant to execution).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Native coin charged per unit of juice consumed.
    pub juice_price: u64,
    /// Native coin charged per unit of net memory allocated.
    pub memory_price: u64,
    /// A single transaction's juice must not exceed this.
    pub juice_limit: u64,
    /// §4.6: a block may carry at most this many explicit transactions.
    pub max_transactions_per_block: usize,
    /// §4.5: at most this many due scheduled transactions are pulled from
    /// the state's scheduled queue and run before the block's explicit
    /// transactions.
    pub max_scheduled_per_block: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            juice_price: 1,
            memory_price: 1,
            juice_limit: 1_000_000,
            max_transactions_per_block: 1024,
            max_scheduled_per_block: 100,
        }
    }
}

/// Derive an account address from a verified Ed25519 public key: the low 62
/// bits of `BLAKE3(pubkey)`, kept within `Value::Address`'s range. Accounts
/// must exist under this derived address (via `Ledger::create_account`)
/// before their key can transact — this module does not implicitly create
/// accounts on first use.
pub fn derive_address(public_key: &[u8; 32]) -> u64 {
    let h = Hash32::of(public_key);
    let mut n = [0u8; 8];
    n.copy_from_slice(&h.as_bytes()[0..8]);
    u64::from_be_bytes(n) & MAX_ADDRESS
}

/// Apply every transaction in `block`, in order, to `ledger`, returning the
/// `BlockResult` cell (§4.5). A transaction failing for any reason in §7's
/// taxonomy never aborts the block: its `TxResult` simply carries the
/// error code and the ledger moves on to the next transaction.
#[instrument(skip(ledger, vm, trust, block, ctx), fields(timestamp = block.timestamp))]
pub fn execute_block(
    ledger: &mut Ledger,
    vm: &dyn Vm,
    trust: &dyn TrustMonitor,
    block: &Block,
    ctx: &dyn DecodeContext,
    cfg: &ExecutorConfig,
) -> Result<Record, CellError> {
    let seq = match block.transactions.resolve(ctx)? {
        Value::Vector(t) | Value::List(t) => t,
        other => return Err(CellError::InvalidData(format!("block transactions is not a sequence: {other:?}"))),
    };
    let entries = seq.to_vec(ctx)?;
    if entries.len() > cfg.max_transactions_per_block {
        return Err(CellError::InvalidData(format!(
            "block carries {} transactions, exceeding the limit of {}",
            entries.len(),
            cfg.max_transactions_per_block
        )));
    }

    let due = ledger.pull_due(block.timestamp, cfg.max_scheduled_per_block);
    let mut results = Vec::with_capacity(due.len() + entries.len());
    for scheduled in due {
        let outcome = execute_scheduled_transaction(ledger, vm, trust, &scheduled, ctx, cfg);
        results.push(Value::Record(Box::new(Record::Result(outcome))));
    }
    for entry in entries {
        let signed = match entry {
            Value::SignedData(s) => s,
            other => return Err(CellError::InvalidData(format!("block entry is not SignedData: {other:?}"))),
        };
        let outcome = execute_signed_transaction(ledger, vm, trust, &signed, ctx, cfg);
        results.push(Value::Record(Box::new(Record::Result(outcome))));
    }

    let results_tree = SeqTree::build(results, Value::Vector)?;
    let results_ref = Ref::new(Value::Vector(results_tree))?;
    let state_hash = ledger.to_value()?.hash()?;
    Ok(Record::BlockResult(BlockResult { results: results_ref, state_hash }))
}

/// Execute one signed transaction, never propagating its failure — only
/// recording it in the returned `TxResult` (§7).
fn execute_signed_transaction(
    ledger: &mut Ledger,
    vm: &dyn Vm,
    trust: &dyn TrustMonitor,
    signed: &SignedData,
    ctx: &dyn DecodeContext,
    cfg: &ExecutorConfig,
) -> TxResult {
    match try_execute(ledger, vm, trust, signed, ctx, cfg) {
        Ok(value_ref) => TxResult { value: value_ref, error_code: None },
        Err(e) => {
            warn!(code = e.code(), "transaction rejected");
            TxResult { value: Ref::embedded(Value::Null), error_code: Some(e.code().to_string()) }
        }
    }
}

fn try_execute(
    ledger: &mut Ledger,
    vm: &dyn Vm,
    trust: &dyn TrustMonitor,
    signed: &SignedData,
    ctx: &dyn DecodeContext,
    cfg: &ExecutorConfig,
) -> Result<Ref, ExecutionError> {
    signed.verify(ctx).map_err(|e| ExecutionError::Signature(e.to_string()))?;
    let tx = match signed.payload.resolve(ctx)? {
        Value::Transaction(t) => *t,
        other => return Err(ExecutionError::State(format!("signed payload is not a transaction: {other:?}"))),
    };
    let origin = derive_address(&signed.public_key);
    dispatch_transaction(ledger, vm, trust, origin, tx, ctx, cfg)
}

/// Run a scheduled transaction pulled from the state's due queue (§4.5).
/// Its origin was fixed when it was scheduled, so there is no signature to
/// verify here — only the sequence/balance/trust checks every transaction
/// shape already carries.
fn execute_scheduled_transaction(
    ledger: &mut Ledger,
    vm: &dyn Vm,
    trust: &dyn TrustMonitor,
    scheduled: &ScheduledTransaction,
    ctx: &dyn DecodeContext,
    cfg: &ExecutorConfig,
) -> TxResult {
    match dispatch_transaction(ledger, vm, trust, scheduled.origin, scheduled.transaction.clone(), ctx, cfg) {
        Ok(value_ref) => TxResult { value: value_ref, error_code: None },
        Err(e) => {
            warn!(code = e.code(), "scheduled transaction rejected");
            TxResult { value: Ref::embedded(Value::Null), error_code: Some(e.code().to_string()) }
        }
    }
}

/// Shared per-shape dispatch for an already-authenticated `(origin, tx)`
/// pair, whether it arrived signed on the wire or was pulled from the
/// scheduled queue.
fn dispatch_transaction(
    ledger: &mut Ledger,
    vm: &dyn Vm,
    trust: &dyn TrustMonitor,
    origin: u64,
    tx: Transaction,
    ctx: &dyn DecodeContext,
    cfg: &ExecutorConfig,
) -> Result<Ref, ExecutionError> {
    let sequence = tx.sequence();
    ledger.check_sequence(origin, sequence)?;

    match tx {
        Transaction::Transfer { target, amount, sequence } => {
            ledger.apply_transfer(origin, target, amount, sequence)?;
            Ok(Ref::embedded(Value::Null))
        }
        Transaction::Invoke { code, .. } => {
            let code_value = code.resolve(ctx)?;
            let outcome = vm.invoke(origin, &code_value)?;
            bill_and_advance(ledger, origin, sequence, &outcome, cfg)?;
            Ok(Ref::new(outcome.value)?)
        }
        Transaction::Call { target, function, args, .. } => {
            if !trust.check_trusted(origin, &function, target) {
                return Err(ExecutionError::Trust(format!("{origin} not trusted to call {function} on {target}")));
            }
            let args_value = args.resolve(ctx)?;
            let outcome = vm.call(origin, target, &function, &args_value)?;
            bill_and_advance(ledger, origin, sequence, &outcome, cfg)?;
            Ok(Ref::new(outcome.value)?)
        }
        Transaction::Multi { mode, transactions, .. } => {
            let value = execute_multi(ledger, vm, trust, origin, mode, &transactions, ctx, cfg)?;
            ledger.advance_sequence(origin, sequence)?;
            Ok(Ref::new(value)?)
        }
    }
}

/// Bill juice and net memory delta against `origin` and advance its sequence
/// counter once VM execution has produced a result (§4.5 "after VM" checks).
fn bill_and_advance(
    ledger: &mut Ledger,
    origin: u64,
    sequence: u64,
    outcome: &super::vm::VmOutcome,
    cfg: &ExecutorConfig,
) -> Result<(), ExecutionError> {
    let charge = charge_for(outcome, cfg)?;
    if charge > 0 {
        ledger.debit_for_fees(origin, charge)?;
    }
    ledger.advance_sequence(origin, sequence)?;
    Ok(())
}

/// Net native-coin charge for one VM outcome: juice at `juice_price` plus
/// the memory delta at `memory_price` (a net-negative delta credits back).
fn charge_for(outcome: &super::vm::VmOutcome, cfg: &ExecutorConfig) -> Result<i64, ExecutionError> {
    if outcome.juice_used > cfg.juice_limit {
        return Err(ExecutionError::Juice(format!(
            "{} exceeds the per-transaction limit of {}",
            outcome.juice_used, cfg.juice_limit
        )));
    }
    let juice_charge = (outcome.juice_used * cfg.juice_price) as i64;
    let memory_charge = outcome.memory_delta * cfg.memory_price as i64;
    Ok(juice_charge + memory_charge)
}

/// Run a `Multi` transaction's sub-transactions under `origin`, combining
/// per-mode (§4.5). Sub-transactions do not nest further `Multi` batches.
fn execute_multi(
    ledger: &mut Ledger,
    vm: &dyn Vm,
    trust: &dyn TrustMonitor,
    origin: u64,
    mode: MultiMode,
    transactions: &[Ref],
    ctx: &dyn DecodeContext,
    cfg: &ExecutorConfig,
) -> Result<Value, ExecutionError> {
    let checkpoint = ledger.clone();
    let mut outcomes = Vec::with_capacity(transactions.len());

    for r in transactions {
        let sub = match r.resolve(ctx)? {
            Value::Transaction(t) => *t,
            other => return Err(ExecutionError::State(format!("multi sub-transaction is not a transaction: {other:?}"))),
        };
        let result = execute_bare(ledger, vm, trust, origin, &sub, ctx, cfg);
        let ok = result.is_ok();

        if let Err(e) = &result {
            if mode == MultiMode::All {
                *ledger = checkpoint;
                return Err(e.clone());
            }
        }

        outcomes.push(match result {
            Ok(v) => v,
            Err(e) => Value::CString(BlobTree::build(e.code().as_bytes().to_vec())?),
        });

        if ok && matches!(mode, MultiMode::First | MultiMode::Until) {
            break;
        }
    }

    Ok(Value::Vector(SeqTree::build(outcomes, Value::Vector)?))
}

/// Execute a single sub-transaction of a `Multi` batch against `origin`,
/// without touching sequence numbers (the enclosing `Multi` owns one
/// sequence slot for the whole batch).
fn execute_bare(
    ledger: &mut Ledger,
    vm: &dyn Vm,
    trust: &dyn TrustMonitor,
    origin: u64,
    tx: &Transaction,
    ctx: &dyn DecodeContext,
    cfg: &ExecutorConfig,
) -> Result<Value, ExecutionError> {
    match tx {
        Transaction::Transfer { target, amount, .. } => {
            ledger.apply_transfer_no_sequence(origin, *target, *amount)?;
            Ok(Value::Null)
        }
        Transaction::Invoke { code, .. } => {
            let code_value = code.resolve(ctx)?;
            let outcome = vm.invoke(origin, &code_value)?;
            let charge = charge_for(&outcome, cfg)?;
            if charge > 0 {
                ledger.debit_for_fees(origin, charge)?;
            }
            Ok(outcome.value)
        }
        Transaction::Call { target, function, args, .. } => {
            if !trust.check_trusted(origin, function, *target) {
                return Err(ExecutionError::Trust(format!("{origin} not trusted to call {function} on {target}")));
            }
            let args_value = args.resolve(ctx)?;
            let outcome = vm.call(origin, *target, function, &args_value)?;
            let charge = charge_for(&outcome, cfg)?;
            if charge > 0 {
                ledger.debit_for_fees(origin, charge)?;
            }
            Ok(outcome.value)
        }
        Transaction::Multi { .. } => Err(ExecutionError::State("multi transactions may not nest".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::trust::{AllowAll, DenyAll};
    use crate::core::cell::ref_::NoContext;
    use crate::core::cell::transaction::Transaction;
    use ring::signature::{Ed25519KeyPair, KeyPair};
    use ring::rand::SystemRandom;

    fn keypair() -> Ed25519KeyPair {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    fn signed_tx(kp: &Ed25519KeyPair, tx: Transaction) -> (SignedData, u64) {
        let mut pk = [0u8; 32];
        pk.copy_from_slice(kp.public_key().as_ref());
        let origin = derive_address(&pk);
        let signed = SignedData::sign(Value::Transaction(Box::new(tx)), kp).unwrap();
        (signed, origin)
    }

    fn block_of(entries: Vec<SignedData>, timestamp: i64) -> Block {
        let values: Vec<Value> = entries.into_iter().map(|s| Value::SignedData(Box::new(s))).collect();
        let tree = SeqTree::build(values, Value::Vector).unwrap();
        Block { timestamp, transactions: Ref::new(Value::Vector(tree)).unwrap() }
    }

    #[test]
    fn transfer_applies_and_advances_sequence() {
        let kp = keypair();
        let mut ledger = Ledger::new();
        let (signed, origin) = signed_tx(&kp, Transaction::Transfer { sequence: 0, target: 99, amount: 50 });
        ledger.create_account(origin, 100, false).unwrap();
        ledger.create_account(99, 0, false).unwrap();

        let block = block_of(vec![signed], 1000);
        let vm = crate::runtime::vm::test_support::EchoVm { juice_per_call: 0 };
        let record = execute_block(&mut ledger, &vm, &AllowAll, &block, &NoContext, &ExecutorConfig::default()).unwrap();

        assert_eq!(ledger.get(99).unwrap().balance, 50);
        assert_eq!(ledger.get(origin).unwrap().sequence, 1);
        match record {
            Record::BlockResult(br) => {
                let results = match br.results.resolve(&NoContext).unwrap() {
                    Value::Vector(t) => t.to_vec(&NoContext).unwrap(),
                    _ => panic!("expected vector"),
                };
                assert_eq!(results.len(), 1);
                match &results[0] {
                    Value::Record(r) => match r.as_ref() {
                        Record::Result(tr) => assert!(tr.error_code.is_none()),
                        _ => panic!("expected Result"),
                    },
                    _ => panic!("expected Record"),
                }
            }
            _ => panic!("expected BlockResult"),
        }
    }

    #[test]
    fn bad_signature_is_recorded_as_error_without_halting_block() {
        let kp = keypair();
        let other = keypair();
        let mut ledger = Ledger::new();
        let (mut signed, origin) = signed_tx(&kp, Transaction::Transfer { sequence: 0, target: 99, amount: 1 });
        let mut bad_pk = [0u8; 32];
        bad_pk.copy_from_slice(other.public_key().as_ref());
        signed.public_key = bad_pk;
        ledger.create_account(origin, 100, false).unwrap();
        ledger.create_account(99, 0, false).unwrap();

        let block = block_of(vec![signed], 1);
        let vm = crate::runtime::vm::test_support::EchoVm { juice_per_call: 0 };
        execute_block(&mut ledger, &vm, &AllowAll, &block, &NoContext, &ExecutorConfig::default()).unwrap();

        assert_eq!(ledger.get(origin).unwrap().balance, 100);
    }

    #[test]
    fn multi_all_rolls_back_on_first_failure() {
        let kp = keypair();
        let mut ledger = Ledger::new();
        let mut pk = [0u8; 32];
        pk.copy_from_slice(kp.public_key().as_ref());
        let origin = derive_address(&pk);
        ledger.create_account(origin, 100, false).unwrap();
        ledger.create_account(7, 0, false).unwrap();

        let ok_transfer = Ref::new(Value::Transaction(Box::new(Transaction::Transfer { sequence: 0, target: 7, amount: 10 }))).unwrap();
        let bad_transfer = Ref::new(Value::Transaction(Box::new(Transaction::Transfer { sequence: 0, target: 404, amount: 10 }))).unwrap();
        let multi = Transaction::Multi { sequence: 0, mode: MultiMode::All, transactions: vec![ok_transfer, bad_transfer] };
        let (signed, _) = signed_tx(&kp, multi);

        let block = block_of(vec![signed], 1);
        let vm = crate::runtime::vm::test_support::EchoVm { juice_per_call: 0 };
        execute_block(&mut ledger, &vm, &AllowAll, &block, &NoContext, &ExecutorConfig::default()).unwrap();

        assert_eq!(ledger.get(origin).unwrap().balance, 100);
        assert_eq!(ledger.get(7).unwrap().balance, 0);
    }

    #[test]
    fn due_scheduled_transaction_runs_before_explicit_transactions_in_the_same_block() {
        let kp = keypair();
        let mut pk = [0u8; 32];
        pk.copy_from_slice(kp.public_key().as_ref());
        let scheduled_origin = derive_address(&pk);
        let mut ledger = Ledger::new();
        ledger.create_account(scheduled_origin, 100, false).unwrap();
        ledger.create_account(7, 0, false).unwrap();
        ledger.schedule(500, scheduled_origin, Transaction::Transfer { sequence: 0, target: 7, amount: 40 });
        // Not yet due: trigger_timestamp is after the block's timestamp.
        ledger.schedule(5_000, scheduled_origin, Transaction::Transfer { sequence: 1, target: 7, amount: 999 });

        let block = block_of(vec![], 1000);
        let vm = crate::runtime::vm::test_support::EchoVm { juice_per_call: 0 };
        let record = execute_block(&mut ledger, &vm, &AllowAll, &block, &NoContext, &ExecutorConfig::default()).unwrap();

        assert_eq!(ledger.get(7).unwrap().balance, 40);
        assert_eq!(ledger.get(scheduled_origin).unwrap().sequence, 1);
        assert_eq!(ledger.scheduled_len(), 1, "the not-yet-due entry stays queued");
        match record {
            Record::BlockResult(br) => {
                let results = match br.results.resolve(&NoContext).unwrap() {
                    Value::Vector(t) => t.to_vec(&NoContext).unwrap(),
                    _ => panic!("expected vector"),
                };
                assert_eq!(results.len(), 1, "only the due scheduled transaction ran");
            }
            _ => panic!("expected BlockResult"),
        }
    }

    #[test]
    fn untrusted_call_is_rejected() {
        let kp = keypair();
        let mut ledger = Ledger::new();
        let mut pk = [0u8; 32];
        pk.copy_from_slice(kp.public_key().as_ref());
        let origin = derive_address(&pk);
        ledger.create_account(origin, 100, false).unwrap();

        let args = Ref::new(Value::Null).unwrap();
        let call = Transaction::Call { sequence: 0, target: 7, function: "withdraw".into(), args };
        let (signed, _) = signed_tx(&kp, call);

        let block = block_of(vec![signed], 1);
        let vm = crate::runtime::vm::test_support::EchoVm { juice_per_call: 0 };
        execute_block(&mut ledger, &vm, &DenyAll, &block, &NoContext, &ExecutorConfig::default()).unwrap();

        assert_eq!(ledger.get(origin).unwrap().sequence, 0);
    }
}
