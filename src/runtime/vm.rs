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

//! The external VM boundary (§4.5): `State × Transaction → State × Result`,
//! narrowed to the per-transaction slice the executor drives through. No
//! scripting language is implemented here — that is explicitly out of scope
//! (§1) — only the trait the executor calls through for anything beyond a
//! native `Transfer`.

use super::error::ExecutionError;
use crate::core::cell::value::Value;

/// What running VM code against one transaction produced.
#[derive(Clone, Debug, PartialEq)]
pub struct VmOutcome {
    /// The transaction's return value, recorded in its `TxResult`.
    pub value: Value,
    /// Compute units consumed, billed to the origin account at the current
    /// juice price.
    pub juice_used: u64,
    /// Net change in the account's committed memory allocation; billed at
    /// the current memory price (can be negative).
    pub memory_delta: i64,
}

/// The seam between the ledger core and whatever language runtime actually
/// evaluates `Invoke`/`Call` code. Implementations live outside this crate.
pub trait Vm: Send + Sync {
    /// Evaluate `code` in `origin`'s own account context.
    fn invoke(&self, origin: u64, code: &Value) -> Result<VmOutcome, ExecutionError>;

    /// Invoke `function`, exported by the actor at `target`, with `args`.
    fn call(&self, origin: u64, target: u64, function: &str, args: &Value) -> Result<VmOutcome, ExecutionError>;
}

/// A `Vm` that refuses every `Invoke`/`Call`. The default for a peer booted
/// without an external VM wired in: native `Transfer`s still work since the
/// executor never reaches this trait for them, but any transaction touching
/// actor code is rejected rather than silently no-opped.
pub struct NoVm;

impl Vm for NoVm {
    fn invoke(&self, _origin: u64, _code: &Value) -> Result<VmOutcome, ExecutionError> {
        Err(ExecutionError::State("no VM configured for this peer".into()))
    }

    fn call(&self, _origin: u64, _target: u64, _function: &str, _args: &Value) -> Result<VmOutcome, ExecutionError> {
        Err(ExecutionError::State("no VM configured for this peer".into()))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A `Vm` double for executor tests: `invoke` echoes the supplied code
    /// back as the result value at a fixed juice cost; `call` fails unless
    /// the function name is `"ok"`.
    pub struct EchoVm {
        pub juice_per_call: u64,
    }

    impl Vm for EchoVm {
        fn invoke(&self, _origin: u64, code: &Value) -> Result<VmOutcome, ExecutionError> {
            Ok(VmOutcome { value: code.clone(), juice_used: self.juice_per_call, memory_delta: 0 })
        }

        fn call(&self, _origin: u64, _target: u64, function: &str, args: &Value) -> Result<VmOutcome, ExecutionError> {
            if function == "ok" {
                Ok(VmOutcome { value: args.clone(), juice_used: self.juice_per_call, memory_delta: 0 })
            } else {
                Err(ExecutionError::State(format!("no such function: {function}")))
            }
        }
    }
}
