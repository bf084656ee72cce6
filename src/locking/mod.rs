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

pub mod acquisition;
pub mod cancellation;
pub mod handle;
pub mod key;
mod mutex;
pub mod owner;
pub mod registry;
pub mod scoped_guard;
pub mod timeout;
pub mod wait_observer;

pub use acquisition::{LockAcquisitionRequest, LockTimeoutBudget};
pub use cancellation::{CancelListener, CancelRegistration, CancellationToken, global_token};
pub use handle::LockHandle;
pub use key::EntityKey;
pub use owner::OwnerId;
pub use registry::{LockRegistry, RegistryReport, RegistrySettings};
pub use scoped_guard::EntityLockGuard;
pub use timeout::{
    LOCK_TIMEOUT_ENV, LockTimeoutResolution, LockTimeoutResolver, LockTimeoutSource,
    LockTimeoutValue, parse_timeout_override,
};
pub use wait_observer::{LockWaitObserver, LoggingWaitObserver, NoopLockWaitObserver};
