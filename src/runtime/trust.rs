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

//! Trust-monitor convention (§4.7): an address may be callable as a trust
//! monitor, answering `(check_trusted? subject action object)`. The core
//! consults this at its own checkpoints — actor upgrade authorization,
//! controller changes, asset operations — without knowing anything about
//! how the monitor program itself is written; that lives VM-side.

/// A trust-monitor checkpoint the core consults before a privileged
/// operation goes through.
pub trait TrustMonitor: Send + Sync {
    /// Ask whether `subject` may perform `action` on `object`.
    fn check_trusted(&self, subject: u64, action: &str, object: u64) -> bool;
}

/// Allows everything. Used where no policy has been wired in yet.
pub struct AllowAll;

impl TrustMonitor for AllowAll {
    fn check_trusted(&self, _subject: u64, _action: &str, _object: u64) -> bool {
        true
    }
}

/// Denies everything.
pub struct DenyAll;

impl TrustMonitor for DenyAll {
    fn check_trusted(&self, _subject: u64, _action: &str, _object: u64) -> bool {
        false
    }
}
