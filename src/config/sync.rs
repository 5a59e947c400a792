use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Default deadline used by `Informer::wait_for_sync_default` (milliseconds)
    #[serde(default = "default_sync_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_sync_timeout_ms(),
        }
    }
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("sync.timeout_ms must be greater than 0".into()));
        }
        Ok(())
    }
}

fn default_sync_timeout_ms() -> u64 {
    30_000
}
