// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::sync::atomic::{AtomicU32, Ordering};

/// Default capacity of the retry budget.
pub const DEFAULT_CAPACITY: u32 = 500;

/// Retry budget shared by every call of one client.
///
/// Retries withdraw capacity, successes put some back. Once empty, calls
/// stop retrying until enough requests succeed.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: AtomicU32,
    max_capacity: u32,
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(max_capacity: u32) -> Self {
        Self {
            capacity: AtomicU32::new(max_capacity),
            max_capacity,
        }
    }

    /// Withdraw `amount`, returning the remaining capacity, or `None` if
    /// there isn't enough left.
    pub fn try_acquire(&self, amount: u32) -> Option<u32> {
        self.capacity
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(amount))
            .ok()
            .map(|prev| prev - amount)
    }

    /// Put `amount` back, never exceeding the maximum. Returns the new capacity.
    pub fn release(&self, amount: u32) -> u32 {
        let max = self.max_capacity;
        let prev = self
            .capacity
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(c.saturating_add(amount).min(max))
            })
            .unwrap_or(max);
        prev.saturating_add(amount).min(max)
    }

    /// Capacity currently available.
    pub fn available(&self) -> u32 {
        self.capacity.load(Ordering::Acquire)
    }
}
