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
use crate::locking::key::EntityKey;
use crate::locking::owner::OwnerId;
use crate::locking::registry::LockRegistry;
use log::warn;

/// Releases one hold on an entity lock when dropped.
#[must_use = "the entity is unlocked as soon as the guard is dropped"]
pub struct EntityLockGuard<'a, K: EntityKey> {
    registry: &'a LockRegistry<K>,
    key: Option<K>,
    owner: OwnerId,
}

impl<'a, K: EntityKey> EntityLockGuard<'a, K> {
    pub(crate) fn new(registry: &'a LockRegistry<K>, key: K, owner: OwnerId) -> Self {
        Self {
            registry,
            key: Some(key),
            owner,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn release(mut self) -> Result<()> {
        if let Some(key) = self.key.take() {
            self.registry.unlock_as(&key, self.owner)
        } else {
            Ok(())
        }
    }
}

impl<K: EntityKey> Drop for EntityLockGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take()
            && let Err(err) = self.registry.unlock_as(&key, self.owner)
        {
            warn!("Failed to release entity lock for {}: {err}", key.label());
        }
    }
}
