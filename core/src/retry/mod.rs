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

//! Retry strategies.
//!
//! A strategy hands out a [`RetryToken`] per call, decides after every
//! failed attempt whether to retry and for how long to back off, and tracks
//! a retry budget shared by all calls of a client.

mod backoff;
pub use backoff::{Backoff, MAX_BACKOFF};
mod rate_limiter;
pub use rate_limiter::ClientRateLimiter;
mod token_bucket;
pub use token_bucket::{TokenBucket, DEFAULT_CAPACITY};

use crate::{Error, Result};
use log::debug;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Capacity withdrawn from the budget by one retry.
pub const RETRY_COST: u32 = 5;

/// Selects a [`RetryStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RetryMode {
    /// Four attempts, throttling retries are free.
    Legacy,
    /// Three attempts with a shared retry budget.
    #[default]
    Standard,
    /// Standard plus client side rate limiting.
    Adaptive,
}

impl FromStr for RetryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(RetryMode::Legacy),
            "standard" => Ok(RetryMode::Standard),
            "adaptive" => Ok(RetryMode::Adaptive),
            v => Err(Error::config_invalid(format!("unknown retry mode: {v}"))),
        }
    }
}

impl fmt::Display for RetryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryMode::Legacy => f.write_str("legacy"),
            RetryMode::Standard => f.write_str("standard"),
            RetryMode::Adaptive => f.write_str("adaptive"),
        }
    }
}

/// Retry state of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryToken {
    attempt: u32,
    acquired: u32,
    remaining_capacity: u32,
    cumulative_backoff: Duration,
}

impl RetryToken {
    /// Zero based index of the next attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Total backoff waited so far.
    pub fn cumulative_backoff(&self) -> Duration {
        self.cumulative_backoff
    }

    /// Retry budget left after the last withdrawal.
    pub fn remaining_capacity(&self) -> u32 {
        self.remaining_capacity
    }

    /// Value of the `amz-sdk-retry` header:
    /// `attempt/cumulativeBackoffMillis/remainingCapacity`.
    pub fn header_value(&self) -> String {
        format!(
            "{}/{}/{}",
            self.attempt,
            self.cumulative_backoff.as_millis(),
            self.remaining_capacity
        )
    }
}

/// Outcome of [`RetryStrategy::refresh_retry_token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after waiting this long.
    RetryAfter(Duration),
    /// Stop and surface the error.
    GiveUp,
}

/// Backoff and budget settings shared by every mode.
#[derive(Debug, Clone)]
pub struct BackoffRetry {
    max_attempts: u32,
    backoff: Backoff,
    throttling_backoff: Backoff,
    retry_cost: u32,
    throttling_retry_cost: u32,
    bucket: Arc<TokenBucket>,
}

impl BackoffRetry {
    fn new(max_attempts: u32, backoff: Backoff, throttling_backoff: Backoff, throttling_retry_cost: u32) -> Self {
        Self {
            max_attempts,
            backoff,
            throttling_backoff,
            retry_cost: RETRY_COST,
            throttling_retry_cost,
            bucket: Arc::new(TokenBucket::default()),
        }
    }

    fn refresh(&self, token: &mut RetryToken, err: &Error) -> RetryDecision {
        if !err.is_retryable() {
            debug!("attempt {} failed with non-retryable error: {err}", token.attempt);
            return RetryDecision::GiveUp;
        }
        if token.attempt + 1 >= self.max_attempts {
            debug!("attempt {} failed, max attempts {} reached", token.attempt, self.max_attempts);
            return RetryDecision::GiveUp;
        }

        let throttling = err.is_throttling();
        let cost = if throttling {
            self.throttling_retry_cost
        } else {
            self.retry_cost
        };
        let Some(remaining) = self.bucket.try_acquire(cost) else {
            debug!(
                "attempt {} failed, retry budget exhausted ({} left)",
                token.attempt,
                self.bucket.available()
            );
            return RetryDecision::GiveUp;
        };

        token.attempt += 1;
        token.acquired = cost;
        token.remaining_capacity = remaining;

        let backoff = if throttling {
            self.throttling_backoff.delay(token.attempt)
        } else {
            self.backoff.delay(token.attempt)
        };
        let delay = backoff.max(err.retry_after().unwrap_or_default());
        token.cumulative_backoff += delay;
        debug!(
            "retrying as attempt {} after {delay:?}, retry capacity {remaining}",
            token.attempt
        );
        RetryDecision::RetryAfter(delay)
    }

    fn record_success(&self, token: &RetryToken) {
        let capacity = self.bucket.release(token.acquired.max(1));
        debug!("call succeeded after {} retries, retry capacity {capacity}", token.attempt);
    }
}

/// How a client retries failed attempts.
///
/// Clones share the retry budget and the rate limiter.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// See [`RetryMode::Legacy`].
    Legacy(BackoffRetry),
    /// See [`RetryMode::Standard`].
    Standard(BackoffRetry),
    /// See [`RetryMode::Adaptive`].
    Adaptive {
        /// Backoff and budget.
        inner: BackoffRetry,
        /// Sending rate shared by every call.
        limiter: Arc<Mutex<ClientRateLimiter>>,
        /// Time zero of the limiter clock.
        epoch: Instant,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryStrategy {
    /// Four attempts. Throttling retries use equal jitter from 500ms and
    /// don't consume budget.
    pub fn legacy() -> Self {
        RetryStrategy::Legacy(BackoffRetry::new(
            4,
            Backoff::full_jitter(Duration::from_millis(100)),
            Backoff::equal_jitter(Duration::from_millis(500)),
            0,
        ))
    }

    /// Three attempts. Full jitter from 100ms, or from 1s when throttled.
    pub fn standard() -> Self {
        RetryStrategy::Standard(Self::standard_inner())
    }

    /// Standard plus a CUBIC client side rate limiter.
    pub fn adaptive() -> Self {
        RetryStrategy::Adaptive {
            inner: Self::standard_inner(),
            limiter: Arc::new(Mutex::new(ClientRateLimiter::new(0.0))),
            epoch: Instant::now(),
        }
    }

    fn standard_inner() -> BackoffRetry {
        BackoffRetry::new(
            3,
            Backoff::full_jitter(Duration::from_millis(100)),
            Backoff::full_jitter(Duration::from_secs(1)),
            RETRY_COST,
        )
    }

    /// The default strategy of `mode`.
    pub fn from_mode(mode: RetryMode) -> Self {
        match mode {
            RetryMode::Legacy => Self::legacy(),
            RetryMode::Standard => Self::standard(),
            RetryMode::Adaptive => Self::adaptive(),
        }
    }

    fn inner(&self) -> &BackoffRetry {
        match self {
            RetryStrategy::Legacy(inner)
            | RetryStrategy::Standard(inner)
            | RetryStrategy::Adaptive { inner, .. } => inner,
        }
    }

    fn inner_mut(&mut self) -> &mut BackoffRetry {
        match self {
            RetryStrategy::Legacy(inner)
            | RetryStrategy::Standard(inner)
            | RetryStrategy::Adaptive { inner, .. } => inner,
        }
    }

    /// Override the number of attempts, including the first one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.inner_mut().max_attempts = max_attempts;
        self
    }

    /// Override the backoff of non-throttling errors.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.inner_mut().backoff = backoff;
        self
    }

    /// Override the backoff of throttling errors.
    pub fn with_throttling_backoff(mut self, backoff: Backoff) -> Self {
        self.inner_mut().throttling_backoff = backoff;
        self
    }

    /// Use a retry budget of `capacity`.
    pub fn with_retry_capacity(mut self, capacity: u32) -> Self {
        self.inner_mut().bucket = Arc::new(TokenBucket::new(capacity));
        self
    }

    /// Attempts allowed per call, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.inner().max_attempts
    }

    /// Mode of this strategy.
    pub fn mode(&self) -> RetryMode {
        match self {
            RetryStrategy::Legacy(_) => RetryMode::Legacy,
            RetryStrategy::Standard(_) => RetryMode::Standard,
            RetryStrategy::Adaptive { .. } => RetryMode::Adaptive,
        }
    }

    /// Retry budget currently available.
    pub fn remaining_capacity(&self) -> u32 {
        self.inner().bucket.available()
    }

    /// Token for the first attempt of a call.
    pub fn acquire_initial_token(&self) -> RetryToken {
        RetryToken {
            attempt: 0,
            acquired: 0,
            remaining_capacity: self.remaining_capacity(),
            cumulative_backoff: Duration::ZERO,
        }
    }

    /// Decide whether the failed attempt is retried.
    ///
    /// On retry the token moves to the next attempt.
    pub fn refresh_retry_token(&self, token: &mut RetryToken, err: &Error) -> RetryDecision {
        self.inner().refresh(token, err)
    }

    /// Give budget back after a successful call.
    pub fn record_success(&self, token: &RetryToken) {
        self.inner().record_success(token)
    }

    /// Delay imposed by the rate limiter before sending an attempt.
    pub fn rate_limit_delay(&self) -> Result<Duration> {
        match self {
            RetryStrategy::Adaptive { limiter, epoch, .. } => Ok(lock_limiter(limiter)?
                .acquire_at(epoch.elapsed().as_secs_f64())),
            _ => Ok(Duration::ZERO),
        }
    }

    /// Feed a response into the rate limiter: `throttled` for throttling
    /// errors, `false` for successes.
    pub fn record_response(&self, throttled: bool) -> Result<()> {
        if let RetryStrategy::Adaptive { limiter, epoch, .. } = self {
            lock_limiter(limiter)?
                .update_client_sending_rate(throttled, epoch.elapsed().as_secs_f64());
        }
        Ok(())
    }
}

fn lock_limiter(limiter: &Mutex<ClientRateLimiter>) -> Result<MutexGuard<'_, ClientRateLimiter>> {
    limiter
        .lock()
        .map_err(|_| Error::unexpected("client rate limiter lock poisoned"))
}
