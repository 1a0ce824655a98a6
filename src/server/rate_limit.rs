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

//! Per-connection token bucket (§4.6's belief-propagator rate limiting),
//! the same one-window-per-second shape as
//! [`crate::core::security::keystore`]'s signing rate limiter, generalized
//! here so each connection can be rate limited independently.

use std::time::{Duration, Instant};

/// A simple fixed-window rate limiter: at most `limit_per_sec` `allow()`
/// calls succeed within any rolling one-second window.
#[derive(Debug)]
pub struct TokenBucket {
    window_start: Instant,
    count: u32,
    limit_per_sec: u32,
}

impl TokenBucket {
    /// A bucket allowing up to `limit_per_sec` events per second.
    pub fn new(limit_per_sec: u32) -> Self {
        Self { window_start: Instant::now(), count: 0, limit_per_sec }
    }

    /// Consume one token if the current window has room.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.count = 0;
        }
        if self.count >= self.limit_per_sec {
            return false;
        }
        self.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_throttles() {
        let mut b = TokenBucket::new(3);
        assert!(b.allow());
        assert!(b.allow());
        assert!(b.allow());
        assert!(!b.allow());
    }
}
