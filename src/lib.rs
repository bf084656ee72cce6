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

//! Per-entity reentrant locking.
//!
//! A [`LockRegistry`] serializes work on the same entity key while letting
//! work on different keys run in parallel. Locks are fair, reentrant, support
//! bounded and cancellable waits, and are reclaimed once no caller uses them.

pub mod config;
pub mod error;
pub mod logging;
pub mod locking;

pub use error::{LockerError, Result};
pub use locking::{
    CancellationToken, EntityKey, EntityLockGuard, LockAcquisitionRequest, LockHandle,
    LockRegistry, LockTimeoutValue, OwnerId,
};
