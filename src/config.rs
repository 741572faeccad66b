use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_WINDOW_SIZE_MINUTES: &str = "VIEW_WINDOWS_WINDOW_SIZE_MINUTES";
pub const ENV_MAX_WINDOWS_TO_KEEP: &str = "VIEW_WINDOWS_MAX_WINDOWS_TO_KEEP";

const MS_PER_MINUTE: f64 = 60_000.0;

/// Window sizing and retention for a [`WindowStore`](crate::store::WindowStore)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Width of each window in minutes (fractional values allowed)
    pub window_size_minutes: f64,
    /// Maximum windows retained per subject before oldest-first eviction.
    /// The default of 144 keeps 24 hours of 10 minute windows.
    pub max_windows_to_keep: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            window_size_minutes: 10.0,
            max_windows_to_keep: 144,
        }
    }
}

impl AggregatorConfig {
    pub fn new(window_size_minutes: f64, max_windows_to_keep: usize) -> Self {
        AggregatorConfig {
            window_size_minutes,
            max_windows_to_keep,
        }
    }

    /// Parse from a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: AggregatorConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Defaults overridden by `VIEW_WINDOWS_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_WINDOW_SIZE_MINUTES) {
            self.window_size_minutes = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_WINDOW_SIZE_MINUTES,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_MAX_WINDOWS_TO_KEEP) {
            self.max_windows_to_keep = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_MAX_WINDOWS_TO_KEEP,
                value: value.clone(),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_window_size_minutes(mut self, minutes: f64) -> Self {
        self.window_size_minutes = minutes;
        self
    }

    pub fn with_max_windows_to_keep(mut self, max: usize) -> Self {
        self.max_windows_to_keep = max;
        self
    }

    /// Window width in whole milliseconds
    pub fn window_size_ms(&self) -> i64 {
        (self.window_size_minutes * MS_PER_MINUTE).round() as i64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ms = self.window_size_minutes * MS_PER_MINUTE;
        if !ms.is_finite() || ms.round() < 1.0 || ms >= i64::MAX as f64 {
            return Err(ConfigError::Invalid(format!(
                "window_size_minutes must be finite and at least 1ms, got {}",
                self.window_size_minutes
            )));
        }
        if self.max_windows_to_keep == 0 {
            return Err(ConfigError::Invalid(
                "max_windows_to_keep must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Checkpoint worker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub interval_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        CheckpointConfig { interval_ms: 60_000 }
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "checkpoint interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
