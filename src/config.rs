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

use crate::error::{LockerError, Result};
use crate::locking::timeout::{
    LockTimeoutResolution, LockTimeoutResolver, LockTimeoutValue, parse_timeout_override,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "entity-locker.toml";
const DEFAULT_TIMEOUT: &str = "infinite";
const DEFAULT_SLOW_WAIT_WARN_MS: u64 = 1_000;
const DEFAULT_INITIAL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LockerConfig {
    #[serde(default)]
    pub locking: LockingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockingConfig {
    /// Default wait budget: seconds, a `ms`/`s` suffixed value, or `infinite`.
    #[serde(default = "default_timeout")]
    pub timeout: String,

    #[serde(default = "default_slow_wait_warn_ms")]
    pub slow_wait_warn_ms: u64,

    #[serde(default = "default_max_reentrancy")]
    pub max_reentrancy: usize,

    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            slow_wait_warn_ms: DEFAULT_SLOW_WAIT_WARN_MS,
            max_reentrancy: default_max_reentrancy(),
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

fn default_timeout() -> String {
    DEFAULT_TIMEOUT.to_string()
}

fn default_slow_wait_warn_ms() -> u64 {
    DEFAULT_SLOW_WAIT_WARN_MS
}

fn default_max_reentrancy() -> usize {
    u32::MAX as usize
}

fn default_initial_capacity() -> usize {
    DEFAULT_INITIAL_CAPACITY
}

impl LockingConfig {
    pub fn timeout_value(&self) -> Result<LockTimeoutValue> {
        parse_timeout_override(&self.timeout)
            .map_err(|e| LockerError::InvalidConfig(format!("locking.timeout: {e}")))
    }

    /// Resolves the effective default timeout with env > config > default precedence.
    pub fn resolve_timeout(&self, env_override: Option<&str>) -> Result<LockTimeoutResolution> {
        let config_value = self.timeout_value()?;
        LockTimeoutResolver::new(env_override, config_value, LockTimeoutValue::Infinite)
            .resolve()
            .map_err(|e| LockerError::InvalidConfig(format!("lock timeout override: {e}")))
    }

    fn validate(&self) -> Result<()> {
        self.timeout_value()?;
        if self.max_reentrancy == 0 {
            return Err(LockerError::InvalidConfig(
                "locking.max_reentrancy must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl LockerConfig {
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            log::debug!("Config file not found at {config_path:?}, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)?;
        let config = Self::from_toml_str(&contents)?;

        log::debug!("Loaded config from {config_path:?}");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: LockerConfig = toml::from_str(contents).map_err(|e| {
            LockerError::ConfigFile(format!("Failed to parse {CONFIG_FILE_NAME}: {e}"))
        })?;
        config.locking.validate()?;
        Ok(config)
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            LockerError::ConfigFile(format!("Failed to serialize config: {e}"))
        })?;

        fs::write(&config_path, contents)?;
        log::debug!("Saved config to {config_path:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::timeout::LockTimeoutSource;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = LockerConfig::default();
        assert_eq!(config.locking.timeout, "infinite");
        assert_eq!(config.locking.slow_wait_warn_ms, DEFAULT_SLOW_WAIT_WARN_MS);
        assert_eq!(
            config.locking.timeout_value().unwrap(),
            LockTimeoutValue::Infinite
        );
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = LockerConfig::load(temp_dir.path()).unwrap();
        assert_eq!(config, LockerConfig::default());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();

        let mut config = LockerConfig::default();
        config.locking.timeout = "30s".to_string();
        config.locking.max_reentrancy = 16;

        config.save(temp_dir.path()).unwrap();

        let loaded = LockerConfig::load(temp_dir.path()).unwrap();
        assert_eq!(loaded.locking.timeout, "30s");
        assert_eq!(loaded.locking.max_reentrancy, 16);
        assert_eq!(loaded.locking.initial_capacity, DEFAULT_INITIAL_CAPACITY);
    }

    #[test]
    fn test_partial_config() {
        let loaded = LockerConfig::from_toml_str(
            r#"
[locking]
timeout = "500ms"
"#,
        )
        .unwrap();
        assert_eq!(
            loaded.locking.timeout_value().unwrap(),
            LockTimeoutValue::from_millis(500)
        );
        assert_eq!(loaded.locking.slow_wait_warn_ms, DEFAULT_SLOW_WAIT_WARN_MS);
    }

    #[test]
    fn test_invalid_timeout_is_rejected() {
        let err = LockerConfig::from_toml_str(
            r#"
[locking]
timeout = "whenever"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, LockerError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_reentrancy_is_rejected() {
        let err = LockerConfig::from_toml_str("[locking]\nmax_reentrancy = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_reentrancy"));
    }

    #[test]
    fn test_malformed_toml_is_config_file_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "[locking").unwrap();
        let err = LockerConfig::load(temp_dir.path()).unwrap_err();
        assert!(matches!(err, LockerError::ConfigFile(_)));
    }

    #[test]
    fn test_resolve_timeout_sources() {
        let config = LockingConfig::default();
        let resolution = config.resolve_timeout(None).unwrap();
        assert_eq!(resolution.source, LockTimeoutSource::Default);

        let resolution = config.resolve_timeout(Some("15")).unwrap();
        assert_eq!(resolution.source, LockTimeoutSource::Environment);
        assert_eq!(resolution.value, LockTimeoutValue::from_secs(15));
    }
}
