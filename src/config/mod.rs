// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process settings with environment overrides.
//!
//! Recognized variables (anything else is ignored):
//! * `ARTIFICER_CACHE_DIR` - execution cache root
//! * `ARTIFICER_PLAN_DIR` - plan record root
//! * `ARTIFICER_MAX_WORKERS` - concurrent produce calls
//! * `ARTIFICER_LOG_LEVEL` - tracing filter for the binary

use std::path::PathBuf;

use crate::engine::wave_executor::default_concurrency;

pub const ENV_CACHE_DIR: &str = "ARTIFICER_CACHE_DIR";
pub const ENV_PLAN_DIR: &str = "ARTIFICER_PLAN_DIR";
pub const ENV_MAX_WORKERS: &str = "ARTIFICER_MAX_WORKERS";
pub const ENV_LOG_LEVEL: &str = "ARTIFICER_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub cache_dir: PathBuf,
    pub plan_dir: PathBuf,
    pub max_workers: usize,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        let root = PathBuf::from(".artificer");
        Self {
            cache_dir: root.join("cache"),
            plan_dir: root.join("plans"),
            max_workers: default_concurrency(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Defaults overridden by whatever recognized variables are set.
    /// An unparseable worker count keeps the default with a warning.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();
        if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
            settings.cache_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(ENV_PLAN_DIR) {
            settings.plan_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var(ENV_MAX_WORKERS) {
            match raw.parse::<usize>() {
                Ok(workers) if workers > 0 => settings.max_workers = workers.min(16),
                _ => {
                    tracing::warn!(value = %raw, "ignoring unparseable {ENV_MAX_WORKERS}");
                }
            }
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            settings.log_level = level;
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.max_workers >= 2);
        assert!(settings.max_workers <= 16);
        assert_eq!(settings.log_level, "info");
        assert!(settings.cache_dir.ends_with("cache"));
        assert!(settings.plan_dir.ends_with("plans"));
    }
}
