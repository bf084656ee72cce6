// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Observer interfaces for lock wait instrumentation.
//!
//! Observers are only consulted when an acquisition actually has to wait;
//! uncontended and reentrant acquisitions never reach them.

use crate::locking::timeout::LockTimeoutValue;
use log::{debug, info, warn};
use std::time::Duration;

/// Observer hooks for lock wait events. Keys are passed as their log label.
pub trait LockWaitObserver: Send + Sync {
    fn on_wait_start(&self, _key: &str, _timeout: LockTimeoutValue, _queued_ahead: usize) {}

    fn on_acquired(&self, _key: &str, _waited: Duration) {}

    fn on_timeout(&self, _key: &str, _waited: Duration) {}

    fn on_cancelled(&self, _key: &str, _waited: Duration) {}
}

/// Observer implementation that performs no work.
#[derive(Debug, Default)]
pub struct NoopLockWaitObserver;

impl LockWaitObserver for NoopLockWaitObserver {}

/// Observer that reports contention through the `log` facade.
///
/// Waits longer than `slow_wait` are reported at `warn` level.
#[derive(Debug, Clone)]
pub struct LoggingWaitObserver {
    slow_wait: Duration,
}

impl LoggingWaitObserver {
    pub fn new(slow_wait: Duration) -> Self {
        Self { slow_wait }
    }

    pub fn slow_wait(&self) -> Duration {
        self.slow_wait
    }

    fn is_slow(&self, waited: Duration) -> bool {
        waited >= self.slow_wait
    }
}

impl Default for LoggingWaitObserver {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl LockWaitObserver for LoggingWaitObserver {
    fn on_wait_start(&self, key: &str, timeout: LockTimeoutValue, queued_ahead: usize) {
        debug!("Waiting for lock on {key} (timeout: {timeout}, {queued_ahead} queued ahead)");
    }

    fn on_acquired(&self, key: &str, waited: Duration) {
        let waited_secs = waited.as_secs_f64();
        if self.is_slow(waited) {
            warn!("Acquired lock on {key} only after {waited_secs:.3}s of contention");
        } else {
            debug!("Acquired lock on {key} after {waited_secs:.3}s");
        }
    }

    fn on_timeout(&self, key: &str, waited: Duration) {
        info!(
            "Gave up waiting for lock on {key} after {:.3}s",
            waited.as_secs_f64()
        );
    }

    fn on_cancelled(&self, key: &str, waited: Duration) {
        info!(
            "Cancelled wait for lock on {key} after {:.3}s",
            waited.as_secs_f64()
        );
    }
}
