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

use crate::error::LockerError;
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a LockerError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a LockerError) -> Self {
        let (suggestion, details) = match error {
            LockerError::InvalidKey { details } => {
                let suggestion = Some(
                    "Entity keys must be present and non-empty. Validate identifiers before \
                     locking."
                        .to_string(),
                );
                (suggestion, Some(details.clone()))
            }
            LockerError::LockTimeout { key, waited_secs } => {
                let suggestion = Some(
                    "Another owner is holding this entity. Retry later, raise the timeout, or set \
                     ENTITY_LOCKER_LOCK_TIMEOUT."
                        .to_string(),
                );
                let details = Some(format!(
                    "Waited {waited_secs:.3}s for {key}; the lock state was left unchanged."
                ));
                (suggestion, details)
            }
            LockerError::Cancelled { key, waited_secs } => {
                let suggestion =
                    Some("The wait was cancelled; rerun when the entity is free.".to_string());
                let details = Some(format!("Cancelled after {waited_secs:.3}s on {key}."));
                (suggestion, details)
            }
            LockerError::NotOwner { details, .. } => {
                let suggestion = Some(
                    "Release a lock from the same thread or owner that acquired it, once per \
                     successful lock."
                        .to_string(),
                );
                (suggestion, Some(details.clone()))
            }
            LockerError::ReentrancyOverflow { limit, .. } => {
                let suggestion = Some(format!(
                    "Check for unbalanced lock/unlock pairs or raise locking.max_reentrancy \
                     (currently {limit})."
                ));
                (suggestion, None)
            }
            LockerError::ConfigFile(msg) | LockerError::InvalidConfig(msg) => {
                let suggestion = Some(
                    "Check entity-locker.toml for syntax errors. Timeouts accept seconds, a 'ms' \
                     or 's' suffix, or 'infinite'."
                        .to_string(),
                );
                (suggestion, Some(msg.clone()))
            }
            _ => (None, None),
        };

        ErrorContext {
            error,
            suggestion,
            details,
        }
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}
