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

use crate::error::Result;
use crate::locking::acquisition::LockAcquisitionRequest;
use crate::locking::cancellation::CancellationToken;
use crate::locking::key::EntityKey;
use crate::locking::mutex::ReentrantMutex;
use crate::locking::owner::OwnerId;
use crate::locking::registry::RegistryShared;
use crate::locking::timeout::LockTimeoutValue;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Counted reference to the lock for one entity.
///
/// While any handle for a key exists the registry keeps that key's lock
/// registered. Successful acquisitions keep it registered on their own until
/// the matching unlock, so the handle may be dropped while the lock is held.
pub struct LockHandle<K: EntityKey> {
    registry: Arc<RegistryShared<K>>,
    key: K,
    label: String,
    mutex: Arc<ReentrantMutex>,
}

impl<K: EntityKey> LockHandle<K> {
    pub(crate) fn new(registry: Arc<RegistryShared<K>>, key: K, mutex: Arc<ReentrantMutex>) -> Self {
        let label = key.label();
        Self {
            registry,
            key,
            label,
            mutex,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns true when both handles refer to the same underlying lock.
    pub fn same_lock(&self, other: &LockHandle<K>) -> bool {
        Arc::ptr_eq(&self.mutex, &other.mutex)
    }

    pub fn lock(&self) -> Result<usize> {
        self.lock_cancellable(self.registry.cancellation())
    }

    pub fn lock_timeout(&self, timeout: Duration) -> Result<usize> {
        self.lock_timeout_cancellable(timeout, self.registry.cancellation())
    }

    pub fn lock_cancellable(&self, token: &CancellationToken) -> Result<usize> {
        self.acquire_with(LockAcquisitionRequest::blocking().with_cancellation(token.clone()))
    }

    pub fn lock_timeout_cancellable(
        &self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<usize> {
        self.acquire_with(
            LockAcquisitionRequest::new(LockTimeoutValue::Finite(timeout))
                .with_cancellation(token.clone()),
        )
    }

    /// Acquires for the request's owner and returns the resulting hold depth.
    pub fn acquire_with(&self, request: LockAcquisitionRequest<'_>) -> Result<usize> {
        let request = request.or_observer(self.registry.logging_observer());
        let depth = self.mutex.acquire(&self.label, &request)?;
        self.registry.pin(&self.key);
        Ok(depth)
    }

    /// Releases one level held by the calling thread.
    pub fn unlock(&self) -> Result<()> {
        self.unlock_as(OwnerId::current())
    }

    pub fn unlock_as(&self, owner: OwnerId) -> Result<()> {
        self.mutex.release(&self.label, owner)?;
        self.registry.unpin(&self.key);
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.mutex.owner()
    }

    pub fn hold_count(&self) -> usize {
        self.mutex.hold_count(OwnerId::current())
    }

    pub fn queue_length(&self) -> usize {
        self.mutex.queue_length()
    }
}

impl<K: EntityKey> Clone for LockHandle<K> {
    fn clone(&self) -> Self {
        self.registry.pin(&self.key);
        Self {
            registry: Arc::clone(&self.registry),
            key: self.key.clone(),
            label: self.label.clone(),
            mutex: Arc::clone(&self.mutex),
        }
    }
}

impl<K: EntityKey> Drop for LockHandle<K> {
    fn drop(&mut self) {
        self.registry.unpin(&self.key);
    }
}

impl<K: EntityKey> fmt::Debug for LockHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.label)
            .field("owner", &self.owner())
            .finish()
    }
}
