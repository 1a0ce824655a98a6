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

//! Transaction execution (§4.5): applying a consensed block's transactions
//! to the ledger through the native `Transfer` path or the external `Vm`
//! boundary, plus the trust-monitor convention (§4.7) the core consults at
//! its own privileged checkpoints.

pub mod error;
pub mod executor;
pub mod trust;
pub mod vm;
