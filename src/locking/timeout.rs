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

use std::fmt;
use std::time::{Duration, Instant};

/// Environment variable consulted for the registry-wide default timeout.
pub const LOCK_TIMEOUT_ENV: &str = "ENTITY_LOCKER_LOCK_TIMEOUT";

/// Represents the wait budget for a lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTimeoutValue {
    Finite(Duration),
    Infinite,
}

impl LockTimeoutValue {
    pub const fn from_secs(seconds: u64) -> Self {
        Self::Finite(Duration::from_secs(seconds))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self::Finite(Duration::from_millis(millis))
    }

    /// A zero budget: acquire only if the lock is immediately available.
    pub const fn no_wait() -> Self {
        Self::Finite(Duration::ZERO)
    }

    pub fn as_duration(&self) -> Duration {
        match self {
            LockTimeoutValue::Finite(duration) => *duration,
            LockTimeoutValue::Infinite => Duration::MAX,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, LockTimeoutValue::Infinite)
    }

    /// Converts the budget into an absolute deadline measured from `start`.
    ///
    /// Returns `None` for infinite budgets and for finite budgets too large to
    /// be represented as an `Instant`; both mean "wait without a deadline".
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        match self {
            LockTimeoutValue::Infinite => None,
            LockTimeoutValue::Finite(duration) => start.checked_add(*duration),
        }
    }
}

impl From<Duration> for LockTimeoutValue {
    fn from(duration: Duration) -> Self {
        LockTimeoutValue::Finite(duration)
    }
}

impl fmt::Display for LockTimeoutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTimeoutValue::Infinite => f.write_str("infinite"),
            LockTimeoutValue::Finite(duration) if duration.subsec_nanos() == 0 => {
                write!(f, "{}s", duration.as_secs())
            }
            LockTimeoutValue::Finite(duration) if duration.subsec_nanos() % 1_000_000 == 0 => {
                write!(f, "{}ms", duration.as_millis())
            }
            LockTimeoutValue::Finite(duration) => write!(f, "{duration:?}"),
        }
    }
}

/// Source precedence used when resolving the effective timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeoutSource {
    #[default]
    Default,
    Config,
    Environment,
    Explicit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeoutResolution {
    pub value: LockTimeoutValue,
    pub source: LockTimeoutSource,
}

impl fmt::Display for LockTimeoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LockTimeoutSource::Default => "built-in default",
            LockTimeoutSource::Config => "configuration file",
            LockTimeoutSource::Environment => "environment variable",
            LockTimeoutSource::Explicit => "caller",
        };
        f.write_str(label)
    }
}

/// Error produced when parsing a timeout override fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeoutParseError {
    message: String,
}

impl fmt::Display for LockTimeoutParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LockTimeoutParseError {}

impl LockTimeoutParseError {
    fn invalid_value(value: &str) -> Self {
        Self {
            message: format!(
                "Lock timeout value '{value}' is invalid. Use a number of seconds, a value with an \
                 'ms' or 's' suffix, or the word 'infinite'."
            ),
        }
    }
}

/// Parses a lock-timeout value originating from the environment or configuration.
///
/// Accepted forms: `infinite`, `30` (seconds), `30s`, `250ms`.
pub fn parse_timeout_override(value: &str) -> Result<LockTimeoutValue, LockTimeoutParseError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("infinite") {
        return Ok(LockTimeoutValue::Infinite);
    }

    if let Some(millis) = trimmed.strip_suffix("ms") {
        return millis
            .trim()
            .parse::<u64>()
            .map(LockTimeoutValue::from_millis)
            .map_err(|_| LockTimeoutParseError::invalid_value(trimmed));
    }

    let seconds = trimmed.strip_suffix('s').unwrap_or(trimmed).trim();
    if let Ok(seconds) = seconds.parse::<u64>() {
        return Ok(LockTimeoutValue::from_secs(seconds));
    }

    Err(LockTimeoutParseError::invalid_value(trimmed))
}

/// Resolves the effective default timeout based on env > config > default precedence.
pub struct LockTimeoutResolver<'a> {
    env_override: Option<&'a str>,
    config_value: LockTimeoutValue,
    default_value: LockTimeoutValue,
}

impl<'a> LockTimeoutResolver<'a> {
    pub fn new(
        env_override: Option<&'a str>,
        config_value: LockTimeoutValue,
        default_value: LockTimeoutValue,
    ) -> Self {
        Self {
            env_override,
            config_value,
            default_value,
        }
    }

    pub fn resolve(self) -> Result<LockTimeoutResolution, LockTimeoutParseError> {
        if let Some(env_value) = self.env_override {
            let value = parse_timeout_override(env_value)?;
            return Ok(LockTimeoutResolution {
                value,
                source: LockTimeoutSource::Environment,
            });
        }

        if self.config_value != self.default_value {
            return Ok(LockTimeoutResolution {
                value: self.config_value,
                source: LockTimeoutSource::Config,
            });
        }

        Ok(LockTimeoutResolution {
            value: self.default_value,
            source: LockTimeoutSource::Default,
        })
    }
}
