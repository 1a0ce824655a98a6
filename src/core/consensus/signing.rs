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

//! Thin, named wrappers around [`crate::core::cell::signed::SignedData`] for
//! the two cell kinds consensus actually signs: `Order` and `Block`. The
//! domain-separation tags themselves live next to the cell definitions
//! they protect (`cell::signed::domain_tag`); this module just gives
//! callers in `merge`/`server` a vocabulary that matches §4.4/§4.6 instead
//! of generic `SignedData` plumbing.

use crate::core::cell::error::CellError;
use crate::core::cell::record::{Block, Order, Record};
use crate::core::cell::ref_::DecodeContext;
use crate::core::cell::signed::SignedData;
use crate::core::cell::value::Value;
use ring::signature::Ed25519KeyPair;

/// Fraction of effective stake that must agree on a prefix for it to cross a
/// consensus level (§4.4): 2/3 rounded up, expressed as a (numerator,
/// denominator) pair to keep the comparison exact-integer.
pub const QUORUM_NUMERATOR: u128 = 2;
/// See [`QUORUM_NUMERATOR`].
pub const QUORUM_DENOMINATOR: u128 = 3;

/// True iff `agreeing` stake strictly exceeds 2/3 of `total` stake.
pub fn meets_quorum(agreeing: u128, total: u128) -> bool {
    if total == 0 {
        return false;
    }
    agreeing.saturating_mul(QUORUM_DENOMINATOR) > total.saturating_mul(QUORUM_NUMERATOR)
}

/// Sign an `Order` record, producing the `SignedData` cell peers gossip.
pub fn sign_order(order: Order, keypair: &Ed25519KeyPair) -> Result<SignedData, CellError> {
    SignedData::sign(Value::Record(Box::new(Record::Order(order))), keypair)
}

/// Verify a signed `Order` cell and return the order it carries.
pub fn verify_order(signed: &SignedData, ctx: &dyn DecodeContext) -> Result<Order, CellError> {
    signed.verify(ctx)?;
    match signed.payload(ctx)? {
        Value::Record(r) => match *r {
            Record::Order(o) => Ok(o),
            _ => Err(CellError::InvalidData("signed payload is not an Order".into())),
        },
        _ => Err(CellError::InvalidData("signed payload is not a Record".into())),
    }
}

/// Sign a `Block` record.
pub fn sign_block(block: Block, keypair: &Ed25519KeyPair) -> Result<SignedData, CellError> {
    SignedData::sign(Value::Record(Box::new(Record::Block(block))), keypair)
}

/// Verify a signed `Block` cell and return the block it carries.
pub fn verify_block(signed: &SignedData, ctx: &dyn DecodeContext) -> Result<Block, CellError> {
    signed.verify(ctx)?;
    match signed.payload(ctx)? {
        Value::Record(r) => match *r {
            Record::Block(b) => Ok(b),
            _ => Err(CellError::InvalidData("signed payload is not a Block".into())),
        },
        _ => Err(CellError::InvalidData("signed payload is not a Record".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_threshold_is_exclusive_at_two_thirds() {
        assert!(!meets_quorum(2, 3));
        assert!(meets_quorum(3, 4));
        assert!(!meets_quorum(0, 0));
    }
}
