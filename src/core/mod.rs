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
#![warn(missing_docs)]

//! Core protocol primitives: the cell data model, consensus, economics,
//! security, and ledger state.

/// Content-addressed cell universe: values, refs, canonical encoding.
pub mod cell;
/// Convergent Proof-of-Stake consensus: belief merge, signing.
pub mod consensus;
/// Stake accounting feeding the belief-merge ordering.
pub mod economics;
/// Keystore and signature verification.
pub mod security;
/// Account/ledger state built on top of cells.
pub mod state;
