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

//! Read-only `Query` handling (§6): evaluate a form against the latest
//! committed `State` without touching the ledger or consensus bookkeeping
//! at all. The simplest of the five workers — no queue, no cross-worker
//! coordination, just `Vm::invoke` against a snapshot.

use crate::core::cell::message::Query;
use crate::core::cell::record::TxResult;
use crate::core::cell::ref_::Ref;
use crate::runtime::error::ExecutionError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::warn;

use super::shared::Shared;

/// Evaluate `query.form` in `query.address`'s account context against the
/// latest committed ledger snapshot, never mutating it.
pub fn handle_query(shared: &Arc<Shared>, query: Query) -> TxResult {
    shared.load.query_processor.fetch_add(1, Ordering::Relaxed);
    let result = run(shared, &query);
    shared.load.query_processor.fetch_sub(1, Ordering::Relaxed);
    match result {
        Ok(value) => TxResult { value: Ref::new(value).unwrap_or_else(|_| Ref::embedded(crate::core::cell::value::Value::Null)), error_code: None },
        Err(e) => {
            warn!(code = e.code(), address = query.address, "query rejected");
            TxResult { value: Ref::embedded(crate::core::cell::value::Value::Null), error_code: Some(e.code().to_string()) }
        }
    }
}

fn run(shared: &Shared, query: &Query) -> Result<crate::core::cell::value::Value, ExecutionError> {
    let snapshot = shared.latest_state.load();
    snapshot
        .ledger
        .get(query.address)
        .ok_or_else(|| ExecutionError::State(format!("no such account: {}", query.address)))?;
    let form = query.form.resolve(shared.store.as_ref())?;
    let outcome = shared.vm.invoke(query.address, &form)?;
    Ok(outcome.value)
}
