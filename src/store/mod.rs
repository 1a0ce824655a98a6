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

//! Content-addressed persistent store (§4.2): an append-only encodings file
//! plus a crash-durable hash index, an LRU decode cache, and a single
//! root-pointer file a peer reopens on restart to recover its last
//! committed Belief and State without replaying the whole log.

pub mod cache;
pub mod error;
pub mod file;
pub mod index;

use crate::core::cell::error::CellError;
use crate::core::cell::hash::Hash32;
use crate::core::cell::ref_::{DecodeContext, Ref};
use crate::core::cell::value::Value;
use cache::BlobCache;
pub use index::CellStatus;
use index::{Index, IndexEntry};
use file::DataFile;
use error::StoreError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default LRU capacity (decoded cells), chosen to comfortably hold a
/// handful of rounds' worth of Belief/State structure.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// A directory-backed content-addressed cell store.
pub struct Store {
    file: Mutex<DataFile>,
    index: Mutex<Index>,
    cache: BlobCache,
    root_path: PathBuf,
}

impl Store {
    /// Open (creating if absent) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let file = DataFile::open(&dir.join("cells.dat"))?;
        let index = Index::open(&dir.join("cells.idx"))?;
        Ok(Self {
            file: Mutex::new(file),
            index: Mutex::new(index),
            cache: BlobCache::new(DEFAULT_CACHE_CAPACITY),
            root_path: dir.join("root"),
        })
    }

    /// Look up a cell by hash, decoding through this store as the
    /// resolution context for any of its own non-embedded children.
    pub fn get(&self, hash: &Hash32) -> Result<Option<Value>, StoreError> {
        if let Some(v) = self.cache.get(hash) {
            return Ok(Some(v));
        }
        let entry = match self.index.lock().unwrap().get(hash) {
            Some(e) => e,
            None => return Ok(None),
        };
        let bytes = self.file.lock().unwrap().read_at(entry.offset, entry.len)?;
        let (value, _) = Value::decode(&bytes, 0)?;
        self.cache.put(*hash, value.clone());
        Ok(Some(value))
    }

    /// Persist `r` and, recursively, every non-embedded descendant it
    /// reaches. If the top-level cell was not previously recorded at
    /// `status` or higher, `novelty_sink` is invoked with it. An embedded
    /// ref's value is not itself durably stored (it travels inline in
    /// whatever wrote it); only its non-embedded descendants are.
    pub fn put(&self, r: &Ref, status: CellStatus, novelty_sink: &mut dyn FnMut(&Ref)) -> Result<(), StoreError> {
        match r {
            Ref::Embedded(v) => self.put_descendants(v, status, novelty_sink),
            Ref::Pending(hash, v) => {
                self.persist(*hash, v, status, novelty_sink)?;
                self.put_descendants(v, status, novelty_sink)
            }
            Ref::Hash(hash) => {
                let value = self.get(hash)?.ok_or(CellError::MissingData(*hash))?;
                self.persist(*hash, &value, status, novelty_sink)?;
                self.put_descendants(&value, status, novelty_sink)
            }
        }
    }

    /// Like [`put`](Self::put), but also durably persists the top cell even
    /// if it would otherwise travel embedded (used for roots a peer needs
    /// to look up directly by hash later, e.g. a Belief's own Order).
    pub fn put_top(&self, r: &Ref, status: CellStatus, novelty_sink: &mut dyn FnMut(&Ref)) -> Result<(), StoreError> {
        let value = match r {
            Ref::Embedded(v) | Ref::Pending(_, v) => (**v).clone(),
            Ref::Hash(h) => self.get(h)?.ok_or(CellError::MissingData(*h))?,
        };
        let hash = value.hash()?;
        self.persist(hash, &value, status, novelty_sink)?;
        self.put_descendants(&value, status, novelty_sink)
    }

    fn put_descendants(&self, value: &Value, status: CellStatus, novelty_sink: &mut dyn FnMut(&Ref)) -> Result<(), StoreError> {
        for child in value.direct_refs() {
            self.put(child, status, novelty_sink)?;
        }
        Ok(())
    }

    /// Write `value` under `hash`, reusing its existing data-file location
    /// if already stored (append-only: we never rewrite bytes, only the
    /// index's status and refcount advance). Every call counts as a new
    /// live reference and increments the refcount regardless of novelty;
    /// `novelty_sink` fires only the first time `hash` is recorded at
    /// `status` or higher, so status-driven callers (e.g. store-wide
    /// novelty broadcasts) are unaffected by the refcount bookkeeping.
    fn persist(&self, hash: Hash32, value: &Value, status: CellStatus, novelty_sink: &mut dyn FnMut(&Ref)) -> Result<(), StoreError> {
        let encoding = value.encode_to_vec()?;
        let mut file = self.file.lock().unwrap();
        let mut index = self.index.lock().unwrap();
        let existing = index.get(&hash);
        let novel = existing.map_or(true, |e| e.status < status);
        let (offset, len) = match existing {
            Some(e) => (e.offset, e.len),
            None => file.append(&encoding)?,
        };
        let refcount = existing.map_or(1, |e| e.refcount.saturating_add(1));
        let recorded_status = match existing {
            Some(e) if e.status >= status => e.status,
            _ => status,
        };
        index.record(hash, IndexEntry { offset, len, status: recorded_status, refcount })?;
        drop(index);
        drop(file);
        self.cache.put(hash, value.clone());
        if novel {
            novelty_sink(&Ref::by_hash(hash));
        }
        Ok(())
    }

    /// Decrement `hash`'s reference count by one. At refcount zero the
    /// entry is compacted out of the index (and dropped from the decode
    /// cache), and the release cascades into every non-embedded child the
    /// cell directly referenced — mirroring the recursive increment
    /// `put`/`put_top` perform on the way in. A hash the index holds no
    /// record of is a no-op, matching `get`'s behavior for an unknown hash.
    pub fn release(&self, hash: &Hash32) -> Result<(), StoreError> {
        let mut index = self.index.lock().unwrap();
        let entry = match index.get(hash) {
            Some(e) => e,
            None => return Ok(()),
        };
        if entry.refcount > 1 {
            index.record(*hash, IndexEntry { refcount: entry.refcount - 1, ..entry })?;
            return Ok(());
        }

        let bytes = self.file.lock().unwrap().read_at(entry.offset, entry.len)?;
        index.record(*hash, IndexEntry { refcount: 0, ..entry })?;
        drop(index);
        self.cache.evict(hash);

        let (value, _) = Value::decode(&bytes, 0)?;
        for child in value.direct_refs() {
            match child {
                Ref::Hash(h) | Ref::Pending(h, _) => self.release(h)?,
                Ref::Embedded(_) => {}
            }
        }
        Ok(())
    }

    /// Decode `encoding` as a cell, using this store as the resolution
    /// context for any lazily-referenced children it contains.
    pub fn decode(&self, encoding: &[u8]) -> Result<Value, StoreError> {
        let (value, _) = Value::decode(encoding, 0)?;
        Ok(value)
    }

    /// The hash of the peer's persisted root cell (its last committed
    /// Belief), or `None` if this store has never had a root set.
    pub fn root_hash(&self) -> Result<Option<Hash32>, StoreError> {
        match fs::read(&self.root_path) {
            Ok(bytes) if bytes.len() == 32 => {
                let mut h = [0u8; 32];
                h.copy_from_slice(&bytes);
                Ok(Some(Hash32::from_bytes(h)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist `cell` (forcing top-level storage regardless of embeddability,
    /// since a restart must be able to look it up by hash alone) and record
    /// it as the new root pointer. The write is atomic via a tmp-file
    /// rename, so a crash mid-write never leaves a corrupt root file. The
    /// previously-rooted cell, if any, is released afterward, so a chain of
    /// checkpoints doesn't pin every superseded state in the store forever.
    pub fn set_root(&self, cell: Value) -> Result<Ref, StoreError> {
        let previous_root = self.root_hash()?;
        let r = Ref::new(cell)?;
        self.put_top(&r, CellStatus::Finalized, &mut |_| {})?;
        let hash = r.hash()?;
        let tmp = self.root_path.with_extension("tmp");
        fs::write(&tmp, hash.as_bytes())?;
        fs::rename(&tmp, &self.root_path)?;
        if let Some(previous) = previous_root {
            if previous != hash {
                self.release(&previous)?;
            }
        }
        Ok(r)
    }
}

impl DecodeContext for Store {
    fn resolve(&self, hash: &Hash32) -> Result<Value, CellError> {
        self.get(hash)
            .map_err(|e| match e {
                StoreError::Cell(c) => c,
                other => CellError::InvalidData(other.to_string()),
            })?
            .ok_or(CellError::MissingData(*hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::collections::BlobTree;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let big = Value::Blob(BlobTree::build(vec![7u8; 5000]).unwrap());
        let r = Ref::new(big.clone()).unwrap();
        assert!(matches!(r, Ref::Pending(_, _)));
        let mut novelties = Vec::new();
        store.put(&r, CellStatus::Stored, &mut |nr| novelties.push(nr.hash().unwrap())).unwrap();
        assert!(!novelties.is_empty());

        let fetched = store.get(&r.hash().unwrap()).unwrap().unwrap();
        assert_eq!(fetched, big);
    }

    #[test]
    fn put_is_not_novel_the_second_time_at_same_status() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let big = Value::Blob(BlobTree::build(vec![9u8; 5000]).unwrap());
        let r = Ref::new(big).unwrap();
        let mut first = 0;
        store.put(&r, CellStatus::Stored, &mut |_| first += 1).unwrap();
        let mut second = 0;
        store.put(&r, CellStatus::Stored, &mut |_| second += 1).unwrap();
        assert!(first > 0);
        assert_eq!(second, 0);
    }

    #[test]
    fn novel_again_when_status_increases() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let big = Value::Blob(BlobTree::build(vec![3u8; 5000]).unwrap());
        let r = Ref::new(big).unwrap();
        store.put(&r, CellStatus::Stored, &mut |_| {}).unwrap();
        let mut hit = false;
        store.put(&r, CellStatus::Finalized, &mut |_| hit = true).unwrap();
        assert!(hit);
    }

    #[test]
    fn root_hash_roundtrips_and_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            let r = store.set_root(Value::Long(99)).unwrap();
            assert_eq!(store.root_hash().unwrap(), Some(r.hash().unwrap()));
        }
        let store = Store::open(dir.path()).unwrap();
        let root = store.root_hash().unwrap().unwrap();
        let v = store.get(&root).unwrap().unwrap();
        assert_eq!(v, Value::Long(99));
    }

    #[test]
    fn release_drops_entry_only_at_zero_refcount() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let big = Value::Blob(BlobTree::build(vec![5u8; 5000]).unwrap());
        let r = Ref::new(big.clone()).unwrap();
        let hash = r.hash().unwrap();

        // Two independent `put`s (e.g. two parents referencing the same
        // child) leave the cell with refcount 2.
        store.put(&r, CellStatus::Stored, &mut |_| {}).unwrap();
        store.put(&r, CellStatus::Stored, &mut |_| {}).unwrap();

        store.release(&hash).unwrap();
        assert_eq!(store.get(&hash).unwrap(), Some(big));

        store.release(&hash).unwrap();
        assert_eq!(store.get(&hash).unwrap(), None);
    }

    #[test]
    fn release_is_a_no_op_for_an_unknown_hash() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let unknown = Value::Long(1).hash().unwrap();
        store.release(&unknown).unwrap();
    }

    #[test]
    fn set_root_releases_the_superseded_root() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let first = store.set_root(Value::Long(1)).unwrap();
        let first_hash = first.hash().unwrap();
        assert_eq!(store.get(&first_hash).unwrap(), Some(Value::Long(1)));

        store.set_root(Value::Long(2)).unwrap();
        // The superseded root had refcount 1 (one `set_root` reference), so
        // replacing it drops it out of the index entirely.
        assert_eq!(store.get(&first_hash).unwrap(), None);
    }
}
