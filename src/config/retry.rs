use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of consecutive failures (0 means unlimited retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig(format!("retry.{name}.timeout_ms must be greater than 0")));
        }
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.base_delay_ms must be greater than 0"
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Divide strategies by remote call
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Full listing of a collection
    #[serde(default = "default_list_policy")]
    pub list: BackoffPolicy,

    // Opening and consuming the change stream
    #[serde(default = "default_watch_policy")]
    pub watch: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            list: default_list_policy(),
            watch: default_watch_policy(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.list.validate("list")?;
        self.watch.validate("watch")?;
        Ok(())
    }
}

fn default_list_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        timeout_ms: 60_000,
        base_delay_ms: 800,
        max_delay_ms: 30_000,
    }
}
fn default_watch_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        timeout_ms: 10_000,
        base_delay_ms: 800,
        max_delay_ms: 30_000,
    }
}
fn default_max_retries() -> usize {
    0
}
fn default_op_timeout_ms() -> u64 {
    10_000
}
fn default_base_delay_ms() -> u64 {
    800
}
fn default_max_delay_ms() -> u64 {
    30_000
}
