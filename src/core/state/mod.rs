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

//! Ledger state (§4.2, §4.3): the account table and its content-addressed
//! and light-client-provable encodings.

pub mod ledger;
pub mod merkle;

use crate::core::cell::error::CellError;
use crate::core::cell::record::State;
use crate::core::cell::ref_::DecodeContext;
use ledger::{accounts_ref, Ledger};

/// Build a `State` cell from a ledger and the global logical clock.
pub fn build_state(ledger: &Ledger, global_timestamp: i64) -> Result<State, CellError> {
    Ok(State { accounts: accounts_ref(ledger)?, global_timestamp, scheduled: ledger.scheduled_ref()? })
}

/// Recover the ledger and clock a `State` cell was built from.
pub fn open_state(state: &State, ctx: &dyn DecodeContext) -> Result<(Ledger, i64), CellError> {
    let accounts = state.accounts.resolve(ctx)?;
    let tree = match accounts {
        crate::core::cell::value::Value::Map(t) => t,
        _ => return Err(CellError::InvalidData("state accounts is not a Map".into())),
    };
    let mut ledger = Ledger::from_map(&tree, ctx)?;
    let scheduled = state.scheduled.resolve(ctx)?;
    let scheduled_tree = match scheduled {
        crate::core::cell::value::Value::Vector(t) => t,
        _ => return Err(CellError::InvalidData("state scheduled is not a Vector".into())),
    };
    for entry in Ledger::scheduled_from_vec(&scheduled_tree, ctx)? {
        ledger.schedule(entry.trigger_timestamp, entry.origin, entry.transaction);
    }
    Ok((ledger, state.global_timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::ref_::NoContext;

    #[test]
    fn state_roundtrips_ledger() {
        let mut ledger = Ledger::new();
        ledger.create_account(1, 500, false).unwrap();
        let state = build_state(&ledger, 42).unwrap();
        let (restored, ts) = open_state(&state, &NoContext).unwrap();
        assert_eq!(ts, 42);
        assert_eq!(restored.get(1), ledger.get(1));
    }
}
