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

use convergentledger::core::cell::record::Record;
use convergentledger::core::cell::value::Value;
use convergentledger::core::state::ledger::Ledger;
use convergentledger::core::state::{build_state, open_state};
use convergentledger::store::{CellStatus, Store};

/// A ledger with a few accounts, persisted as a `State` cell and a store
/// root, survives a fresh `Store::open` on the same directory.
#[test]
fn ledger_survives_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let mut ledger = Ledger::new();
    ledger.create_account(1, 1_000, false).unwrap();
    ledger.create_account(2, 0, false).unwrap();
    ledger.apply_transfer_no_sequence(1, 2, 250).unwrap();

    let state = build_state(&ledger, 7).unwrap();
    let root_value = Value::Record(Box::new(Record::State(state)));
    store.set_root(root_value).unwrap();

    let reopened = Store::open(dir.path()).unwrap();
    let root_hash = reopened.root_hash().unwrap().expect("root was persisted");
    let restored_value = reopened.get(&root_hash).unwrap().expect("root cell present");
    let restored_state = match restored_value {
        Value::Record(r) => match *r {
            Record::State(s) => s,
            other => panic!("root is not a State: {other:?}"),
        },
        other => panic!("root is not a Record: {other:?}"),
    };

    let (restored_ledger, global_timestamp) = open_state(&restored_state, &reopened).unwrap();
    assert_eq!(global_timestamp, 7);
    assert_eq!(restored_ledger.get(1), ledger.get(1));
    assert_eq!(restored_ledger.get(2), ledger.get(2));
}

/// A block cell stored with `Stored` status round-trips through
/// `put`/`get` untouched by the root pointer at all.
#[test]
fn arbitrary_cell_round_trips_through_put_and_get() {
    use convergentledger::core::cell::ref_::Ref;

    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let value = Value::Long(42);
    let r = Ref::new(value.clone()).unwrap();
    let hash = r.hash().unwrap();
    store.put(&r, CellStatus::Stored, &mut |_| {}).unwrap();

    let fetched = store.get(&hash).unwrap().expect("cell present");
    assert_eq!(fetched, value);
}
