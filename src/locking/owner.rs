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

//! Identity of the logical execution context that owns a lock.
//!
//! Reentrancy and release checks compare [`OwnerId`]s rather than OS thread
//! handles. Each thread lazily receives a stable id; code that multiplexes
//! logical tasks over threads can mint its own ids with [`OwnerId::allocate`]
//! and pass them explicitly.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_OWNER: OwnerId = OwnerId::allocate();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(NonZeroU64);

impl OwnerId {
    /// Returns the id bound to the calling thread.
    pub fn current() -> Self {
        THREAD_OWNER.with(|owner| *owner)
    }

    /// Mints a fresh id never handed out before in this process.
    pub fn allocate() -> Self {
        let raw = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and would need 2^64 allocations to wrap.
        OwnerId(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner #{}", self.0)
    }
}
