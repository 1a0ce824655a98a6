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

//! Append-only data file: cell encodings are written once and never
//! rewritten in place, so an (offset, length) pair found in the index
//! remains valid for the life of the file (§4.2 "storage layout").

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;

/// The append-only encodings file backing a store directory.
pub struct DataFile {
    write_handle: File,
    read_handle: File,
    next_offset: u64,
}

impl DataFile {
    /// Open (creating if absent) the data file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let write_handle = OpenOptions::new().create(true).append(true).read(false).open(path)?;
        let read_handle = OpenOptions::new().read(true).open(path)?;
        let next_offset = write_handle.metadata()?.len();
        Ok(Self { write_handle, read_handle, next_offset })
    }

    /// Append `bytes`, fsync'ing before returning so a crash afterward can
    /// never leave a torn write the index might still point at.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<(u64, u32)> {
        let offset = self.next_offset;
        self.write_handle.write_all(bytes)?;
        self.write_handle.sync_data()?;
        self.next_offset += bytes.len() as u64;
        Ok((offset, bytes.len() as u32))
    }

    /// Read back a previously-appended encoding.
    pub fn read_at(&self, offset: u64, len: u32) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.read_handle.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut file = DataFile::open(&path).unwrap();
        let (off1, len1) = file.append(b"hello").unwrap();
        let (off2, len2) = file.append(b"world!!").unwrap();
        assert_eq!(file.read_at(off1, len1).unwrap(), b"hello");
        assert_eq!(file.read_at(off2, len2).unwrap(), b"world!!");
    }

    #[test]
    fn reopen_resumes_append_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        {
            let mut file = DataFile::open(&path).unwrap();
            file.append(b"abc").unwrap();
        }
        let mut file = DataFile::open(&path).unwrap();
        let (off, len) = file.append(b"def").unwrap();
        assert_eq!(off, 3);
        assert_eq!(file.read_at(off, len).unwrap(), b"def");
    }
}
