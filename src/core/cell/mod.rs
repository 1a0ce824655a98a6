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

//! Content-addressed, canonically-encoded, Merkleized cell universe (§3,
//! §4.1). Every value the ledger ever hashes, signs, stores, or sends over
//! the wire is a [`value::Value`], reached through a [`ref_::Ref`].

pub mod code;
pub mod collections;
pub mod error;
pub mod hash;
pub mod message;
pub mod record;
pub mod ref_;
pub mod signed;
pub mod tag;
pub mod transaction;
pub mod value;
pub mod vlc;

pub use error::CellError;
pub use hash::Hash32;
pub use ref_::{DecodeContext, NoContext, Ref};
pub use value::{Value, EMBED_MAX_LEN, MAX_ADDRESS, MAX_ENCODING_LEN};
