//! Configuration value objects for the lease lock.
//!
//! Configuration is loaded in layers with the following precedence (lowest to highest):
//! 1. Built-in defaults ([`crate::constants`])
//! 2. Environment variables (ASPEN_LOCK_*)
//! 3. TOML configuration file
//!
//! The resulting [`LockOptions`] and [`RetryOptions`] are immutable once handed
//! to a coordinator.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;

use crate::constants::DEFAULT_LEASE_DURATION_SECS;
use crate::constants::DEFAULT_PARTITION_KEY_ATTRIBUTE;
use crate::constants::DEFAULT_RETRY_BACKOFF_MULTIPLIER;
use crate::constants::DEFAULT_RETRY_BASE_DELAY_MS;
use crate::constants::DEFAULT_RETRY_JITTER_FACTOR;
use crate::constants::DEFAULT_RETRY_MAX_ATTEMPTS;
use crate::constants::DEFAULT_RETRY_MAX_DELAY_MS;
use crate::constants::DEFAULT_SORT_KEY_ATTRIBUTE;
use crate::constants::DEFAULT_TABLE_NAME;

/// Key layout and lease settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockOptions {
    /// Name of the table holding lock items.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Partition key attribute name.
    #[serde(default = "default_partition_key_attribute")]
    pub partition_key_attribute: String,

    /// Sort key attribute name.
    #[serde(default = "default_sort_key_attribute")]
    pub sort_key_attribute: String,

    /// Lease duration in seconds. A crashed owner's lease can be taken over
    /// once this much time has passed since acquisition.
    #[serde(default = "default_lease_duration_secs")]
    pub lease_duration_secs: u64,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            partition_key_attribute: default_partition_key_attribute(),
            sort_key_attribute: default_sort_key_attribute(),
            lease_duration_secs: default_lease_duration_secs(),
        }
    }
}

impl LockOptions {
    /// Lease duration as a [`Duration`].
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    /// Validate the lock options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_name.is_empty() {
            return Err(ConfigError::Validation {
                message: "table_name must not be empty".into(),
            });
        }
        if self.partition_key_attribute.is_empty() {
            return Err(ConfigError::Validation {
                message: "partition_key_attribute must not be empty".into(),
            });
        }
        if self.sort_key_attribute.is_empty() {
            return Err(ConfigError::Validation {
                message: "sort_key_attribute must not be empty".into(),
            });
        }
        if self.lease_duration_secs == 0 {
            return Err(ConfigError::Validation {
                message: "lease_duration_secs must be non-zero".into(),
            });
        }
        Ok(())
    }
}

/// Retry tuning for lock acquisition.
///
/// The retry engine's delay math is total over any values: a multiplier at or
/// below 1 simply stops growing the delay, and the jitter factor is clamped to
/// `0.0..=1.0`. [`RetryOptions::validate`] rejects such values at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Whether acquisition attempts are retried at all.
    #[serde(default)]
    pub enabled: bool,

    /// Maximum attempts, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of a single delay (before jitter) in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential growth factor between consecutive delays.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter on top of each delay.
    #[serde(default = "default_use_jitter")]
    pub use_jitter: bool,

    /// Maximum jitter as a fraction of the capped delay.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            use_jitter: default_use_jitter(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryOptions {
    /// Default tuning with retries switched on.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Base delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Maximum delay as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Validate the retry options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "max_attempts must be at least 1".into(),
            });
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::Validation {
                message: "max_delay_ms must be greater than or equal to base_delay_ms".into(),
            });
        }
        if !(self.backoff_multiplier > 1.0) || !self.backoff_multiplier.is_finite() {
            return Err(ConfigError::Validation {
                message: "backoff_multiplier must be a finite value greater than 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::Validation {
                message: "jitter_factor must be between 0 and 1".into(),
            });
        }
        Ok(())
    }
}

/// Complete lease lock configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaseLockConfig {
    /// Key layout and lease settings.
    #[serde(default)]
    pub lock: LockOptions,

    /// Retry tuning.
    #[serde(default)]
    pub retry: RetryOptions,
}

impl LeaseLockConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        toml::from_str(&content).context(ParseTomlSnafu { path })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).context(ParseTomlSnafu {
            path: PathBuf::from("<inline>"),
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Variables follow the pattern ASPEN_LOCK_<FIELD_NAME> for lock options and
    /// ASPEN_LOCK_RETRY_<FIELD_NAME> for retry tuning.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            lock: LockOptions {
                table_name: lookup("ASPEN_LOCK_TABLE_NAME").unwrap_or_else(default_table_name),
                partition_key_attribute: lookup("ASPEN_LOCK_PARTITION_KEY")
                    .unwrap_or_else(default_partition_key_attribute),
                sort_key_attribute: lookup("ASPEN_LOCK_SORT_KEY").unwrap_or_else(default_sort_key_attribute),
                lease_duration_secs: parse_value(lookup("ASPEN_LOCK_LEASE_DURATION_SECS"))
                    .unwrap_or_else(default_lease_duration_secs),
            },
            retry: RetryOptions {
                enabled: parse_value(lookup("ASPEN_LOCK_RETRY_ENABLED")).unwrap_or(false),
                max_attempts: parse_value(lookup("ASPEN_LOCK_RETRY_MAX_ATTEMPTS")).unwrap_or_else(default_max_attempts),
                base_delay_ms: parse_value(lookup("ASPEN_LOCK_RETRY_BASE_DELAY_MS"))
                    .unwrap_or_else(default_base_delay_ms),
                max_delay_ms: parse_value(lookup("ASPEN_LOCK_RETRY_MAX_DELAY_MS")).unwrap_or_else(default_max_delay_ms),
                backoff_multiplier: parse_value(lookup("ASPEN_LOCK_RETRY_BACKOFF_MULTIPLIER"))
                    .unwrap_or_else(default_backoff_multiplier),
                use_jitter: parse_value(lookup("ASPEN_LOCK_RETRY_USE_JITTER")).unwrap_or_else(default_use_jitter),
                jitter_factor: parse_value(lookup("ASPEN_LOCK_RETRY_JITTER_FACTOR"))
                    .unwrap_or_else(default_jitter_factor),
            },
        }
    }

    /// Merge configuration from another source.
    ///
    /// Fields in `other` that differ from the defaults override fields in `self`.
    /// A field in `other` that equals its default is indistinguishable from an
    /// unset one and leaves `self` unchanged.
    pub fn merge(&mut self, other: Self) {
        let lock_defaults = LockOptions::default();
        if other.lock.table_name != lock_defaults.table_name {
            self.lock.table_name = other.lock.table_name;
        }
        if other.lock.partition_key_attribute != lock_defaults.partition_key_attribute {
            self.lock.partition_key_attribute = other.lock.partition_key_attribute;
        }
        if other.lock.sort_key_attribute != lock_defaults.sort_key_attribute {
            self.lock.sort_key_attribute = other.lock.sort_key_attribute;
        }
        if other.lock.lease_duration_secs != lock_defaults.lease_duration_secs {
            self.lock.lease_duration_secs = other.lock.lease_duration_secs;
        }

        let retry_defaults = RetryOptions::default();
        if other.retry.enabled != retry_defaults.enabled {
            self.retry.enabled = other.retry.enabled;
        }
        if other.retry.max_attempts != retry_defaults.max_attempts {
            self.retry.max_attempts = other.retry.max_attempts;
        }
        if other.retry.base_delay_ms != retry_defaults.base_delay_ms {
            self.retry.base_delay_ms = other.retry.base_delay_ms;
        }
        if other.retry.max_delay_ms != retry_defaults.max_delay_ms {
            self.retry.max_delay_ms = other.retry.max_delay_ms;
        }
        if other.retry.backoff_multiplier != retry_defaults.backoff_multiplier {
            self.retry.backoff_multiplier = other.retry.backoff_multiplier;
        }
        if other.retry.use_jitter != retry_defaults.use_jitter {
            self.retry.use_jitter = other.retry.use_jitter;
        }
        if other.retry.jitter_factor != retry_defaults.jitter_factor {
            self.retry.jitter_factor = other.retry.jitter_factor;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lock.validate()?;
        self.retry.validate()
    }

    /// Load environment, then file, then validate.
    ///
    /// File values override environment values only where they differ from
    /// the built-in defaults. Setting a file field back to its default (for
    /// example `enabled = false` under `[retry]`) does not undo an environment
    /// override such as `ASPEN_LOCK_RETRY_ENABLED=true`; unset the variable
    /// instead.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_env();
        if let Some(path) = path {
            config.merge(Self::from_toml_file(path)?);
        }
        config.validate()?;
        Ok(config)
    }
}

// Default value functions
fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.into()
}

fn default_partition_key_attribute() -> String {
    DEFAULT_PARTITION_KEY_ATTRIBUTE.into()
}

fn default_sort_key_attribute() -> String {
    DEFAULT_SORT_KEY_ATTRIBUTE.into()
}

fn default_lease_duration_secs() -> u64 {
    DEFAULT_LEASE_DURATION_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_RETRY_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_RETRY_MAX_DELAY_MS
}

fn default_backoff_multiplier() -> f64 {
    DEFAULT_RETRY_BACKOFF_MULTIPLIER
}

fn default_use_jitter() -> bool {
    true
}

fn default_jitter_factor() -> f64 {
    DEFAULT_RETRY_JITTER_FACTOR
}

fn parse_value<T: std::str::FromStr>(raw: Option<String>) -> Option<T> {
    raw?.trim().parse().ok()
}

/// Configuration loading and parsing errors.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse TOML config file {}: {source}", path.display()))]
    ParseToml { path: PathBuf, source: toml::de::Error },

    #[snafu(display("configuration validation failed: {message}"))]
    Validation { message: String },
}
