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

use crate::locking::cancellation::CancellationToken;
use crate::locking::owner::OwnerId;
use crate::locking::timeout::{LockTimeoutSource, LockTimeoutValue};
use crate::locking::wait_observer::LockWaitObserver;
use std::time::{Duration, Instant};

/// Tracks when a wait started and when its timeout budget runs out.
#[derive(Debug, Clone)]
pub struct LockTimeoutBudget {
    value: LockTimeoutValue,
    started_at: Instant,
}

impl LockTimeoutBudget {
    pub fn new(value: LockTimeoutValue) -> Self {
        Self {
            value,
            started_at: Instant::now(),
        }
    }

    pub fn value(&self) -> LockTimeoutValue {
        self.value
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Absolute instant at which the wait gives up, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.value.deadline_from(self.started_at)
    }
}

/// Carries the configuration for a single lock acquisition attempt.
pub struct LockAcquisitionRequest<'a> {
    owner: OwnerId,
    budget: LockTimeoutBudget,
    cancellation: CancellationToken,
    observer: Option<&'a dyn LockWaitObserver>,
    source: LockTimeoutSource,
}

impl<'a> LockAcquisitionRequest<'a> {
    /// Creates a request on behalf of the calling thread.
    pub fn new(timeout: LockTimeoutValue) -> Self {
        Self {
            owner: OwnerId::current(),
            budget: LockTimeoutBudget::new(timeout),
            cancellation: CancellationToken::new(),
            observer: None,
            source: LockTimeoutSource::Explicit,
        }
    }

    pub fn blocking() -> Self {
        Self::new(LockTimeoutValue::Infinite)
    }

    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_timeout_source(mut self, source: LockTimeoutSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn LockWaitObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Uses `fallback` for wait events unless the caller attached an observer.
    pub fn or_observer(mut self, fallback: &'a dyn LockWaitObserver) -> Self {
        self.observer = self.observer.or(Some(fallback));
        self
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn budget(&self) -> &LockTimeoutBudget {
        &self.budget
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn observer(&self) -> Option<&'a dyn LockWaitObserver> {
        self.observer
    }

    pub fn elapsed(&self) -> Duration {
        self.budget.elapsed()
    }

    pub fn timeout_value(&self) -> LockTimeoutValue {
        self.budget.value()
    }

    pub fn timeout_source(&self) -> LockTimeoutSource {
        self.source
    }

    /// True when the request may not queue behind another owner.
    pub fn forbids_waiting(&self) -> bool {
        self.timeout_value() == LockTimeoutValue::no_wait()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.budget.deadline()
    }

    pub fn notify_wait_start(&self, key: &str, queued_ahead: usize) {
        if let Some(observer) = self.observer {
            observer.on_wait_start(key, self.timeout_value(), queued_ahead);
        }
    }

    pub fn notify_acquired(&self, key: &str) {
        if let Some(observer) = self.observer {
            observer.on_acquired(key, self.elapsed());
        }
    }

    pub fn notify_timeout(&self, key: &str) {
        if let Some(observer) = self.observer {
            observer.on_timeout(key, self.elapsed());
        }
    }

    pub fn notify_cancelled(&self, key: &str) {
        if let Some(observer) = self.observer {
            observer.on_cancelled(key, self.elapsed());
        }
    }
}
