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

use rand::Rng;
use std::time::Duration;

/// Upper bound of any computed backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(20);

/// Delay before a retry, growing exponentially with the retry number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Uniform in `[0, ceiling]`.
    FullJitter {
        /// Ceiling of the first retry.
        base: Duration,
        /// Cap of the ceiling.
        max: Duration,
    },
    /// Uniform in `[ceiling / 2, ceiling]`.
    EqualJitter {
        /// Ceiling of the first retry.
        base: Duration,
        /// Cap of the ceiling.
        max: Duration,
    },
    /// Always the same delay.
    Fixed(Duration),
}

impl Backoff {
    /// Full jitter capped at [`MAX_BACKOFF`].
    pub const fn full_jitter(base: Duration) -> Self {
        Backoff::FullJitter {
            base,
            max: MAX_BACKOFF,
        }
    }

    /// Equal jitter capped at [`MAX_BACKOFF`].
    pub const fn equal_jitter(base: Duration) -> Self {
        Backoff::EqualJitter {
            base,
            max: MAX_BACKOFF,
        }
    }

    /// Delay before retry number `retry` (1 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::FullJitter { base, max } => {
                let ceiling = ceiling(base, max, retry);
                ceiling.mul_f64(rand::thread_rng().gen::<f64>())
            }
            Backoff::EqualJitter { base, max } => {
                let half = ceiling(base, max, retry) / 2;
                half + half.mul_f64(rand::thread_rng().gen::<f64>())
            }
            Backoff::Fixed(d) => d,
        }
    }
}

/// `base * 2^(retry - 1)`, capped at `max`.
fn ceiling(base: Duration, max: Duration, retry: u32) -> Duration {
    let exp = retry.saturating_sub(1).min(31);
    base.saturating_mul(1 << exp).min(max)
}
