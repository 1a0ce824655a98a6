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

//! In-memory LRU of recently decoded cells (§4.2): Belief and State cells
//! share structure heavily across consecutive merge rounds, so avoiding a
//! re-decode of their unchanged subtrees matters on the hot path.

use crate::core::cell::hash::Hash32;
use crate::core::cell::value::Value;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// A thread-safe bounded cache from cell hash to its decoded value.
pub struct BlobCache {
    inner: Mutex<LruCache<Hash32, Value>>,
}

impl BlobCache {
    /// Build a cache holding up to `capacity` decoded cells.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    /// Fetch a cached value, if present, marking it most-recently-used.
    pub fn get(&self, hash: &Hash32) -> Option<Value> {
        self.inner.lock().unwrap().get(hash).cloned()
    }

    /// Insert or refresh a cached value.
    pub fn put(&self, hash: Hash32, value: Value) {
        self.inner.lock().unwrap().put(hash, value);
    }

    /// Drop a cached entry, if present (used when the store compacts the
    /// backing index entry on refcount reaching zero).
    pub fn evict(&self, hash: &Hash32) {
        self.inner.lock().unwrap().pop(hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let cache = BlobCache::new(4);
        let h = Hash32::of(b"x");
        cache.put(h, Value::Long(1));
        assert_eq!(cache.get(&h), Some(Value::Long(1)));
    }

    #[test]
    fn eviction_drops_oldest() {
        let cache = BlobCache::new(1);
        let h1 = Hash32::of(b"a");
        let h2 = Hash32::of(b"b");
        cache.put(h1, Value::Long(1));
        cache.put(h2, Value::Long(2));
        assert_eq!(cache.get(&h1), None);
        assert_eq!(cache.get(&h2), Some(Value::Long(2)));
    }
}
