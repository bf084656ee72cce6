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

//! Fair reentrant mutex bound to a single entity.
//!
//! Ownership is tracked by [`OwnerId`] rather than by guard lifetime so a lock
//! can be released through the registry by key. Waiters queue in arrival order
//! and a release at depth zero hands ownership directly to the queue head, so
//! a newcomer can never barge past a queued waiter.

use crate::error::{LockerError, Result};
use crate::locking::acquisition::LockAcquisitionRequest;
use crate::locking::cancellation::CancelListener;
use crate::locking::owner::OwnerId;
use log::trace;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Outcome of a successful release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// The owner still holds the lock at the given depth.
    Retained(usize),
    /// Ownership passed to the next queued waiter.
    HandedOff(OwnerId),
    Unlocked,
}

struct Waiter {
    owner: OwnerId,
    granted: AtomicBool,
    wake: Condvar,
}

#[derive(Default)]
struct MutexState {
    owner: Option<OwnerId>,
    depth: usize,
    queue: VecDeque<Arc<Waiter>>,
}

impl MutexState {
    fn remove_waiter(&mut self, waiter: &Arc<Waiter>) {
        self.queue.retain(|queued| !Arc::ptr_eq(queued, waiter));
    }
}

/// Wakes one parked waiter when its cancellation token fires.
struct WaiterWake {
    state: Arc<Mutex<MutexState>>,
    waiter: Arc<Waiter>,
}

impl CancelListener for WaiterWake {
    fn on_cancel(&self) {
        // Taking the state lock orders the notification after the waiter parks.
        let _state = self.state.lock();
        self.waiter.wake.notify_one();
    }
}

pub(crate) struct ReentrantMutex {
    state: Arc<Mutex<MutexState>>,
    max_reentrancy: usize,
}

impl ReentrantMutex {
    pub(crate) fn new(max_reentrancy: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MutexState::default())),
            max_reentrancy: max_reentrancy.max(1),
        }
    }

    /// Acquires the lock for the request's owner and returns the new hold depth.
    pub(crate) fn acquire(
        &self,
        key: &str,
        request: &LockAcquisitionRequest<'_>,
    ) -> Result<usize> {
        let owner = request.owner();
        let mut state = self.state.lock();

        if request.cancellation().is_cancelled() {
            return Err(LockerError::Cancelled {
                key: key.to_string(),
                waited_secs: 0.0,
            });
        }

        if state.owner == Some(owner) {
            if state.depth >= self.max_reentrancy {
                return Err(LockerError::ReentrancyOverflow {
                    key: key.to_string(),
                    limit: self.max_reentrancy,
                });
            }
            state.depth += 1;
            trace!("Re-entered lock on {key} by {owner} (depth {})", state.depth);
            return Ok(state.depth);
        }

        if state.owner.is_none() {
            debug_assert!(state.queue.is_empty());
            state.owner = Some(owner);
            state.depth = 1;
            trace!("Acquired uncontended lock on {key} for {owner}");
            return Ok(1);
        }

        if request.forbids_waiting() {
            return Err(LockerError::LockTimeout {
                key: key.to_string(),
                waited_secs: 0.0,
            });
        }

        let waiter = Arc::new(Waiter {
            owner,
            granted: AtomicBool::new(false),
            wake: Condvar::new(),
        });
        let queued_ahead = state.queue.len();
        state.queue.push_back(Arc::clone(&waiter));
        drop(state);

        let _registration = request.cancellation().register(Arc::new(WaiterWake {
            state: Arc::clone(&self.state),
            waiter: Arc::clone(&waiter),
        }));
        request.notify_wait_start(key, queued_ahead);

        let deadline = request.deadline();
        let mut state = self.state.lock();
        loop {
            if waiter.granted.load(Ordering::Acquire) {
                drop(state);
                request.notify_acquired(key);
                return Ok(1);
            }

            if request.cancellation().is_cancelled() {
                state.remove_waiter(&waiter);
                drop(state);
                request.notify_cancelled(key);
                return Err(LockerError::Cancelled {
                    key: key.to_string(),
                    waited_secs: request.elapsed().as_secs_f64(),
                });
            }

            match deadline {
                None => waiter.wake.wait(&mut state),
                Some(deadline) if Instant::now() >= deadline => {
                    state.remove_waiter(&waiter);
                    drop(state);
                    request.notify_timeout(key);
                    return Err(LockerError::LockTimeout {
                        key: key.to_string(),
                        waited_secs: request.elapsed().as_secs_f64(),
                    });
                }
                Some(deadline) => {
                    let _ = waiter.wake.wait_until(&mut state, deadline);
                }
            }
        }
    }

    /// Releases one level of ownership held by `owner`.
    pub(crate) fn release(&self, key: &str, owner: OwnerId) -> Result<Release> {
        let mut state = self.state.lock();
        match state.owner {
            Some(current) if current == owner => {}
            Some(current) => {
                return Err(LockerError::NotOwner {
                    key: key.to_string(),
                    details: format!("lock on {key} is held by {current}, not {owner}"),
                });
            }
            None => {
                return Err(LockerError::NotOwner {
                    key: key.to_string(),
                    details: format!("lock on {key} is not held by anyone"),
                });
            }
        }

        state.depth -= 1;
        if state.depth > 0 {
            return Ok(Release::Retained(state.depth));
        }

        match state.queue.pop_front() {
            Some(next) => {
                state.owner = Some(next.owner);
                state.depth = 1;
                next.granted.store(true, Ordering::Release);
                next.wake.notify_one();
                Ok(Release::HandedOff(next.owner))
            }
            None => {
                state.owner = None;
                Ok(Release::Unlocked)
            }
        }
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    pub(crate) fn owner(&self) -> Option<OwnerId> {
        self.state.lock().owner
    }

    /// Depth held by `owner`, zero if someone else (or nobody) holds the lock.
    pub(crate) fn hold_count(&self, owner: OwnerId) -> usize {
        let state = self.state.lock();
        if state.owner == Some(owner) {
            state.depth
        } else {
            0
        }
    }

    pub(crate) fn queue_length(&self) -> usize {
        self.state.lock().queue.len()
    }
}
