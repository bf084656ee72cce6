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

use log::{debug, warn};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Receives a callback when the token it is registered with is cancelled.
///
/// Callbacks run on the thread calling [`CancellationToken::cancel`] and must
/// not block for long.
pub trait CancelListener: Send + Sync {
    fn on_cancel(&self);
}

struct TokenState {
    cancelled: Arc<AtomicBool>,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Arc<dyn CancelListener>)>>,
}

/// Token used to interrupt callers waiting for a lock.
///
/// Clones share state: cancelling any clone cancels them all.
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: Arc::new(AtomicBool::new(false)),
                next_id: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// True when both tokens share cancellation state.
    pub fn same_token(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Marks the token as cancelled and wakes every registered listener.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let listeners: Vec<Arc<dyn CancelListener>> = self
            .state
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        debug!("Cancellation requested; notifying {} waiter(s)", listeners.len());
        for listener in listeners {
            listener.on_cancel();
        }
    }

    /// Registers a listener for the lifetime of the returned registration.
    ///
    /// The listener may be invoked even if the token was cancelled just before
    /// registration; callers must re-check [`is_cancelled`](Self::is_cancelled)
    /// after registering.
    pub fn register(&self, listener: Arc<dyn CancelListener>) -> CancelRegistration {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.listeners.lock().push((id, listener));
        CancelRegistration {
            state: Arc::clone(&self.state),
            id,
        }
    }

    fn listener_count(&self) -> usize {
        self.state.listeners.lock().len()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Removes its listener from the token when dropped.
#[must_use = "the listener is unregistered as soon as the registration is dropped"]
pub struct CancelRegistration {
    state: Arc<TokenState>,
    id: u64,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        self.state
            .listeners
            .lock()
            .retain(|(id, _)| *id != self.id);
    }
}

#[cfg(unix)]
fn install_signal_forwarder(token: &CancellationToken) {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            warn!("Failed to register cancellation handlers: {err}");
            return;
        }
    };

    let forwarded = token.clone();
    let spawned = std::thread::Builder::new()
        .name("entity-locker-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                debug!("Received signal {signal}; cancelling lock waits");
                forwarded.cancel();
            }
        });
    if let Err(err) = spawned {
        warn!("Failed to start cancellation signal thread: {err}");
    }
}

// Without a signal iterator the flag is only observed when a waiter wakes.
#[cfg(not(unix))]
fn install_signal_forwarder(token: &CancellationToken) {
    use signal_hook::consts::signal::{SIGBREAK, SIGINT, SIGTERM};
    use signal_hook::flag;

    for signal in [SIGINT, SIGTERM, SIGBREAK] {
        if let Err(err) = flag::register(signal, Arc::clone(&token.state.cancelled)) {
            warn!("Failed to register cancellation handler for signal {signal}: {err}");
        }
    }
}

static GLOBAL_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

/// Returns a process-wide token cancelled on SIGINT or SIGTERM.
pub fn global_token() -> CancellationToken {
    GLOBAL_TOKEN
        .get_or_init(|| {
            let token = CancellationToken::new();
            install_signal_forwarder(&token);
            token
        })
        .clone()
}
