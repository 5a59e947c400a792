use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueConfig {
    /// Maximum number of distinct keys buffered per collection.
    /// A watcher pushing a new key into a full queue waits for the dispatcher.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig("queue.capacity must be greater than 0".into()));
        }
        Ok(())
    }
}

fn default_queue_capacity() -> usize {
    1024
}
