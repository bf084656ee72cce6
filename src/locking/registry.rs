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

use crate::config::{LockerConfig, LockingConfig};
use crate::error::{LockerError, Result};
use crate::locking::acquisition::LockAcquisitionRequest;
use crate::locking::cancellation::{CancellationToken, global_token};
use crate::locking::handle::LockHandle;
use crate::locking::key::EntityKey;
use crate::locking::mutex::{Release, ReentrantMutex};
use crate::locking::owner::OwnerId;
use crate::locking::scoped_guard::EntityLockGuard;
use crate::locking::timeout::{
    LOCK_TIMEOUT_ENV, LockTimeoutResolution, LockTimeoutSource, LockTimeoutValue,
};
use crate::locking::wait_observer::LoggingWaitObserver;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for a [`LockRegistry`], usually derived from [`LockingConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySettings {
    pub default_timeout: LockTimeoutResolution,
    pub max_reentrancy: usize,
    pub slow_wait: Duration,
    pub initial_capacity: usize,
}

impl RegistrySettings {
    pub fn from_locking_config(
        config: &LockingConfig,
        default_timeout: LockTimeoutResolution,
    ) -> Self {
        Self {
            default_timeout,
            max_reentrancy: config.max_reentrancy,
            slow_wait: Duration::from_millis(config.slow_wait_warn_ms),
            initial_capacity: config.initial_capacity,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        let config = LockingConfig::default();
        let default_timeout = config.resolve_timeout(None).unwrap_or(LockTimeoutResolution {
            value: LockTimeoutValue::Infinite,
            source: LockTimeoutSource::Default,
        });
        Self::from_locking_config(&config, default_timeout)
    }
}

/// Point-in-time view of the registry contents.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistryReport {
    /// Keys that currently have a live handle.
    pub tracked: usize,
    /// Keys whose lock is held by some owner.
    pub held: usize,
    /// Callers parked in a wait queue across all keys.
    pub waiting: usize,
    /// Outstanding handle references, waits and holds.
    pub pins: usize,
}

struct Entry {
    mutex: Arc<ReentrantMutex>,
    pins: usize,
}

pub(crate) struct RegistryShared<K: EntityKey> {
    entries: Mutex<HashMap<K, Entry>>,
    settings: RegistrySettings,
    logging: LoggingWaitObserver,
    cancellation: CancellationToken,
}

impl<K: EntityKey> RegistryShared<K> {
    /// Looks up or creates the handle for `key` and records one more reference.
    ///
    /// This is the only place a handle is created.
    fn pin_or_insert(&self, key: &K) -> Arc<ReentrantMutex> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.pins += 1;
            return Arc::clone(&entry.mutex);
        }

        let mutex = Arc::new(ReentrantMutex::new(self.settings.max_reentrancy));
        entries.insert(
            key.clone(),
            Entry {
                mutex: Arc::clone(&mutex),
                pins: 1,
            },
        );
        debug!("Created lock handle for {}", key.label());
        mutex
    }

    /// Adds a reference to a handle the caller already keeps alive.
    ///
    /// Never creates an entry: the caller's own pin keeps the key registered.
    pub(crate) fn pin(&self, key: &K) {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) => entry.pins += 1,
            None => warn!("Pinned {} but no handle was registered", key.label()),
        }
    }

    /// Drops one reference and reclaims the handle once nothing refers to it.
    pub(crate) fn unpin(&self, key: &K) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            warn!("Unpinned {} but no handle was registered", key.label());
            return;
        };

        entry.pins = entry.pins.saturating_sub(1);
        if entry.pins == 0 {
            entries.remove(key);
            debug!("Reclaimed idle lock handle for {}", key.label());
        }
    }

    fn tracked(&self, key: &K) -> Option<Arc<ReentrantMutex>> {
        self.entries
            .lock()
            .get(key)
            .map(|entry| Arc::clone(&entry.mutex))
    }

    pub(crate) fn logging_observer(&self) -> &LoggingWaitObserver {
        &self.logging
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Maps entity keys to per-key reentrant locks.
///
/// Handles are created on first use and reclaimed as soon as no caller holds,
/// waits for, or references them, so memory tracks active contention rather
/// than every key ever locked. Cloning the registry yields another reference
/// to the same set of locks.
pub struct LockRegistry<K: EntityKey> {
    shared: Arc<RegistryShared<K>>,
}

impl<K: EntityKey> LockRegistry<K> {
    pub fn new() -> Self {
        Self::with_settings(RegistrySettings::default())
    }

    pub fn with_settings(settings: RegistrySettings) -> Self {
        Self::with_cancellation(settings, CancellationToken::new())
    }

    /// Builds a registry whose waits end with `Cancelled` once `cancellation` fires.
    ///
    /// The token applies to every call that does not bring its own token.
    pub fn with_cancellation(settings: RegistrySettings, cancellation: CancellationToken) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                entries: Mutex::new(HashMap::with_capacity(settings.initial_capacity)),
                settings,
                logging: LoggingWaitObserver::new(settings.slow_wait),
                cancellation,
            }),
        }
    }

    /// Builds a registry for an application process.
    ///
    /// Honours the timeout environment override, and SIGINT/SIGTERM cancel
    /// every wait through [`global_token`].
    pub fn from_config(config: &LockerConfig) -> Result<Self> {
        let env_override = std::env::var(LOCK_TIMEOUT_ENV).ok();
        let settings = Self::settings_for(&config.locking, env_override.as_deref())?;
        Ok(Self::with_cancellation(settings, global_token()))
    }

    pub fn from_locking_config(config: &LockingConfig, env_override: Option<&str>) -> Result<Self> {
        Ok(Self::with_settings(Self::settings_for(config, env_override)?))
    }

    fn settings_for(config: &LockingConfig, env_override: Option<&str>) -> Result<RegistrySettings> {
        let default_timeout = config.resolve_timeout(env_override)?;
        debug!(
            "Default lock timeout {} (from {})",
            default_timeout.value, default_timeout.source
        );
        Ok(RegistrySettings::from_locking_config(config, default_timeout))
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.shared.settings
    }

    /// Token that cancels waits started without an explicit token.
    pub fn cancellation(&self) -> &CancellationToken {
        self.shared.cancellation()
    }

    fn request(&self, timeout: LockTimeoutValue) -> LockAcquisitionRequest<'static> {
        LockAcquisitionRequest::new(timeout).with_cancellation(self.shared.cancellation.clone())
    }

    pub fn default_timeout(&self) -> LockTimeoutResolution {
        self.shared.settings.default_timeout
    }

    /// Returns the handle for `key`, creating it if this is the first reference.
    pub fn resolve(&self, key: &K) -> Result<LockHandle<K>> {
        key.validate()?;
        let mutex = self.shared.pin_or_insert(key);
        Ok(LockHandle::new(Arc::clone(&self.shared), key.clone(), mutex))
    }

    /// Blocks until the calling thread owns the lock for `key`.
    pub fn lock(&self, key: &K) -> Result<()> {
        self.acquire_with(key, self.request(LockTimeoutValue::Infinite))
    }

    /// Like [`lock`](Self::lock) but gives up after `timeout`.
    pub fn lock_timeout(&self, key: &K, timeout: Duration) -> Result<()> {
        self.acquire_with(key, self.request(timeout.into()))
    }

    /// Like [`lock`](Self::lock) but waits are interrupted by `token`
    /// instead of the registry's token.
    pub fn lock_cancellable(&self, key: &K, token: &CancellationToken) -> Result<()> {
        self.acquire_with(
            key,
            LockAcquisitionRequest::blocking().with_cancellation(token.clone()),
        )
    }

    pub fn lock_timeout_cancellable(
        &self,
        key: &K,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<()> {
        self.acquire_with(
            key,
            LockAcquisitionRequest::new(timeout.into()).with_cancellation(token.clone()),
        )
    }

    /// Acquires without waiting; `Ok(false)` means another owner holds the lock.
    pub fn try_lock(&self, key: &K) -> Result<bool> {
        match self.acquire_with(key, self.request(LockTimeoutValue::no_wait())) {
            Ok(()) => Ok(true),
            Err(LockerError::LockTimeout { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Acquires using the registry's configured default timeout.
    pub fn acquire(&self, key: &K) -> Result<()> {
        let timeout = self.default_timeout();
        self.acquire_with(
            key,
            self.request(timeout.value).with_timeout_source(timeout.source),
        )
    }

    pub fn acquire_with(&self, key: &K, request: LockAcquisitionRequest<'_>) -> Result<()> {
        self.resolve(key)?.acquire_with(request).map(|_| ())
    }

    /// Locks `key` and returns a guard that unlocks it when dropped.
    pub fn lock_guard(&self, key: &K) -> Result<EntityLockGuard<'_, K>> {
        self.lock(key)?;
        Ok(EntityLockGuard::new(self, key.clone(), OwnerId::current()))
    }

    pub fn lock_guard_timeout(&self, key: &K, timeout: Duration) -> Result<EntityLockGuard<'_, K>> {
        self.lock_timeout(key, timeout)?;
        Ok(EntityLockGuard::new(self, key.clone(), OwnerId::current()))
    }

    /// Releases one level of the calling thread's hold on `key`.
    pub fn unlock(&self, key: &K) -> Result<()> {
        self.unlock_as(key, OwnerId::current())
    }

    pub fn unlock_as(&self, key: &K, owner: OwnerId) -> Result<()> {
        key.validate()?;
        let label = key.label();
        let Some(mutex) = self.shared.tracked(key) else {
            return Err(LockerError::NotOwner {
                details: format!("lock on {label} is not held by anyone"),
                key: label,
            });
        };

        match mutex.release(&label, owner)? {
            Release::Retained(depth) => trace!("Released one hold on {label} ({depth} remaining)"),
            Release::HandedOff(next) => trace!("Handed lock on {label} to {next}"),
            Release::Unlocked => trace!("Unlocked {label}"),
        }
        self.shared.unpin(key);
        Ok(())
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.shared
            .tracked(key)
            .is_some_and(|mutex| mutex.is_locked())
    }

    pub fn is_held_by_current(&self, key: &K) -> bool {
        self.hold_count(key) > 0
    }

    pub fn is_held_by(&self, key: &K, owner: OwnerId) -> bool {
        self.hold_count_for(key, owner) > 0
    }

    /// Reentrancy depth held by the calling thread.
    pub fn hold_count(&self, key: &K) -> usize {
        self.hold_count_for(key, OwnerId::current())
    }

    pub fn hold_count_for(&self, key: &K, owner: OwnerId) -> usize {
        self.shared
            .tracked(key)
            .map_or(0, |mutex| mutex.hold_count(owner))
    }

    /// Number of callers currently queued behind the owner of `key`.
    pub fn queue_length(&self, key: &K) -> usize {
        self.shared
            .tracked(key)
            .map_or(0, |mutex| mutex.queue_length())
    }

    /// Number of keys with a live handle.
    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> RegistryReport {
        let entries = self.shared.entries.lock();
        entries
            .values()
            .fold(RegistryReport::default(), |mut report, entry| {
                report.tracked += 1;
                report.pins += entry.pins;
                report.waiting += entry.mutex.queue_length();
                if entry.mutex.is_locked() {
                    report.held += 1;
                }
                report
            })
    }
}

impl<K: EntityKey> Default for LockRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityKey> Clone for LockRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: EntityKey> fmt::Debug for LockRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("settings", &self.shared.settings)
            .field("tracked", &self.len())
            .finish()
    }
}
