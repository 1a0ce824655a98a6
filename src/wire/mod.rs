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

//! The peer wire protocol (§6): plain TCP, `VLC(length) || payload` framing
//! ([`frame`]), multi-cell payload encoding ([`multicell`]), and the seven
//! message kinds a connection carries ([`message`]).

pub mod error;
pub mod frame;
pub mod message;
pub mod multicell;

pub use error::WireError;
pub use message::{recv, send, WireMessage};
