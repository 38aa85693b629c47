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

//! Client side rate limiting for the adaptive retry mode.
//!
//! The sending rate follows a CUBIC curve: it drops multiplicatively on every
//! throttled response and grows back along a cubic function of the time since
//! the last throttle. The limiter stays disabled until the first throttle.
//!
//! All methods take the current time in seconds from an arbitrary epoch.

use log::debug;
use std::time::Duration;

const MIN_FILL_RATE: f64 = 0.5;
const MIN_CAPACITY: f64 = 1.0;
const SMOOTH: f64 = 0.8;
/// How much to scale back after a throttle.
const BETA: f64 = 0.7;
/// How aggressively to grow back after a throttle.
const SCALE_CONSTANT: f64 = 0.4;

/// CUBIC rate limiter state.
#[derive(Debug, Clone)]
pub struct ClientRateLimiter {
    fill_rate: f64,
    max_capacity: f64,
    current_capacity: f64,
    last_timestamp: Option<f64>,
    enabled: bool,
    measured_tx_rate: f64,
    last_tx_rate_bucket: f64,
    request_count: u64,
    last_max_rate: f64,
    last_throttle_time: f64,
    time_window: f64,
}

impl ClientRateLimiter {
    /// Create a disabled limiter.
    pub fn new(now: f64) -> Self {
        Self {
            fill_rate: 0.0,
            max_capacity: f64::MAX,
            current_capacity: 0.0,
            last_timestamp: None,
            enabled: false,
            measured_tx_rate: 0.0,
            last_tx_rate_bucket: (now * 2.0).floor() / 2.0,
            request_count: 0,
            last_max_rate: 0.0,
            last_throttle_time: now,
            time_window: 0.0,
        }
    }

    /// Check if a throttle switched the limiter on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current sending rate in requests per second.
    pub fn fill_rate(&self) -> f64 {
        self.fill_rate
    }

    /// Take one send token, returning how long to wait before sending.
    pub fn acquire_at(&mut self, now: f64) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        self.refill(now);

        let amount = 1.0;
        if amount <= self.current_capacity {
            self.current_capacity -= amount;
            return Duration::ZERO;
        }
        let wait = (amount - self.current_capacity) / self.fill_rate;
        self.current_capacity -= amount;
        Duration::from_secs_f64(wait.max(0.0))
    }

    /// Feed the outcome of one response into the rate calculation.
    pub fn update_client_sending_rate(&mut self, throttled: bool, now: f64) {
        self.update_measured_rate(now);

        let calculated_rate = if throttled {
            let rate_to_use = if self.enabled {
                self.measured_tx_rate.min(self.fill_rate)
            } else {
                self.measured_tx_rate
            };
            self.last_max_rate = rate_to_use;
            self.calculate_time_window();
            self.last_throttle_time = now;
            self.enabled = true;
            self.cubic_throttle(rate_to_use)
        } else {
            self.calculate_time_window();
            self.cubic_success(now)
        };

        let new_rate = calculated_rate.min(2.0 * self.measured_tx_rate);
        self.update_rate(new_rate, now);
        debug!(
            "client rate limiter: throttled={throttled}, measured={:.3}, fill_rate={:.3}",
            self.measured_tx_rate, self.fill_rate
        );
    }

    fn update_rate(&mut self, new_rate: f64, now: f64) {
        self.refill(now);
        self.fill_rate = new_rate.max(MIN_FILL_RATE);
        self.max_capacity = new_rate.max(MIN_CAPACITY);
        self.current_capacity = self.current_capacity.min(self.max_capacity);
    }

    fn refill(&mut self, now: f64) {
        if let Some(last) = self.last_timestamp {
            let fill_amount = (now - last).max(0.0) * self.fill_rate;
            self.current_capacity = (self.current_capacity + fill_amount).min(self.max_capacity);
        }
        self.last_timestamp = Some(now);
    }

    fn calculate_time_window(&mut self) {
        self.time_window = (self.last_max_rate * (1.0 - BETA) / SCALE_CONSTANT).cbrt();
    }

    fn cubic_throttle(&self, rate_to_use: f64) -> f64 {
        rate_to_use * BETA
    }

    fn cubic_success(&self, now: f64) -> f64 {
        let dt = now - self.last_throttle_time;
        SCALE_CONSTANT * (dt - self.time_window).powi(3) + self.last_max_rate
    }

    /// Track the observed sending rate in half second buckets.
    fn update_measured_rate(&mut self, now: f64) {
        let t = (now * 2.0).floor() / 2.0;
        self.request_count += 1;
        if t > self.last_tx_rate_bucket {
            let current_rate = self.request_count as f64 / (t - self.last_tx_rate_bucket);
            self.measured_tx_rate = current_rate * SMOOTH + self.measured_tx_rate * (1.0 - SMOOTH);
            self.request_count = 0;
            self.last_tx_rate_bucket = t;
        }
    }
}
