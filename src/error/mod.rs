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

mod context;
mod format;

pub use context::ErrorContext;
pub use format::format_error_chain;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockerError {
    #[error("Invalid entity key: {details}")]
    InvalidKey { details: String },

    #[error("Timed out waiting for lock on {key} after {waited_secs:.3}s")]
    LockTimeout { key: String, waited_secs: f64 },

    #[error("Cancelled while waiting for lock on {key} after {waited_secs:.3}s")]
    Cancelled { key: String, waited_secs: f64 },

    #[error("Lock on {key} is not held by the caller")]
    NotOwner { key: String, details: String },

    #[error("Lock on {key} exceeded the maximum reentrancy depth of {limit}")]
    ReentrancyOverflow { key: String, limit: usize },

    #[error("Configuration file error: {0}")]
    ConfigFile(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LockerError {
    /// Returns true for failures the caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LockerError::LockTimeout { .. } | LockerError::Cancelled { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LockerError>;
