use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;
use crate::WatchError;

/// Capped exponential backoff with jitter, driven by a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: BackoffPolicy,
    attempts: usize,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            current: Duration::from_millis(policy.base_delay_ms),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
        self.current = Duration::from_millis(self.policy.base_delay_ms);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts
    }

    /// True once `max_retries` consecutive failures were recorded (never when 0).
    pub(crate) fn exhausted(&self) -> bool {
        self.policy.max_retries > 0 && self.attempts >= self.policy.max_retries
    }

    /// Delay before the next attempt; doubles each call up to `max_delay_ms`.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let max = Duration::from_millis(self.policy.max_delay_ms);
        let base = self.current.min(max);
        self.attempts += 1;
        self.current = (self.current * 2).min(max);

        let jitter_ms = (base.as_millis() as u64) / 4;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        (base + jitter).min(max)
    }

    /// Sleeps for the next delay. Returns `false` if `cancel` fired first.
    pub(crate) async fn wait(
        &mut self,
        cancel: &CancellationToken,
    ) -> bool {
        let delay = self.next_delay();
        debug!(?delay, attempts = self.attempts, "backing off");
        tokio::select! {
            _ = sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

/// Runs one remote call under the policy's per-operation timeout.
pub(crate) async fn call_with_timeout<T, F>(
    duration: Duration,
    call: F,
) -> std::result::Result<T, WatchError>
where
    F: Future<Output = std::result::Result<T, WatchError>>,
{
    match timeout(duration, call).await {
        Ok(result) => result,
        Err(_) => Err(WatchError::Timeout(duration)),
    }
}

// Helper function to spawn tasks; failures are logged and handed to `on_error`
pub(crate) fn spawn_task<F, Fut, E>(
    name: &str,
    task_fn: F,
    on_error: E,
) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
    E: FnOnce(Error) + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        match task_fn().await {
            Ok(()) => debug!("spawned task: {name} exited"),
            Err(e) => {
                error!("spawned task: {name} stopped or encountered an error: {:?}", e);
                on_error(e);
            }
        }
    })
}
