//! Configuration management module for the shared informer.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod monitoring;
mod queue;
mod retry;
mod sync;
pub use monitoring::*;
pub use queue::*;
pub use retry::*;
pub use sync::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for informer components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with `INFORMER__` prefix (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct InformerConfig {
    /// Delta queue sizing
    #[serde(default)]
    pub queue: QueueConfig,
    /// Backoff policies for remote list/watch calls
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Cache sync barrier defaults
    #[serde(default)]
    pub sync: SyncConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for InformerConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("InformerConfig")
            .field("queue", &self.queue)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

impl InformerConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `INFORMER__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred to allow further overrides via
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("INFORMER__QUEUE__CAPACITY", "4096");
    /// let cfg = InformerConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("INFORMER")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("INFORMER")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.queue.validate()?;
        self.retry.validate()?;
        self.sync.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}
