//! Shutdown coordination.
//!
//! A single [`CancellationToken`] is shared by every watcher and dispatcher.
//! Stopping cancels it and closes the delta queues: watchers exit at their
//! next suspension point, dispatchers hand out what is still buffered and
//! then exit.

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use super::DeltaQueue;
use crate::utils::async_task::spawn_task;
use crate::Error;
use crate::Result;

#[derive(Debug, Default)]
struct ControllerInner {
    token: CancellationToken,
    stopped: AtomicBool,
    queues: Mutex<Vec<Arc<DeltaQueue>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Held while joining, so concurrent `wait` calls all block until the
    /// tasks have exited.
    joining: tokio::sync::Mutex<()>,
    /// First fatal error reported by any task.
    failure: Mutex<Option<Error>>,
}

#[derive(Debug, Clone, Default)]
pub struct StopController {
    inner: Arc<ControllerInner>,
}

impl StopController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn register_queue(
        &self,
        queue: Arc<DeltaQueue>,
    ) {
        self.inner.queues.lock().push(queue);
    }

    /// Spawns a task whose error, if any, shuts everything down.
    pub(crate) fn spawn<Fut>(
        &self,
        name: &str,
        task: Fut,
    ) where
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let controller = self.clone();
        let handle = spawn_task(name, move || task, move |e| controller.fail(e));
        self.inner.tasks.lock().push(handle);
    }

    /// Signals every task to finish. Safe to call more than once.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("stopping informer");
        self.inner.token.cancel();
        for queue in self.inner.queues.lock().iter() {
            queue.close();
        }
    }

    /// Records `error` as the shutdown cause (first one wins) and stops.
    pub(crate) fn fail(
        &self,
        error: Error,
    ) {
        {
            let mut failure = self.inner.failure.lock();
            if failure.is_none() {
                *failure = Some(error);
            } else {
                warn!("additional failure during shutdown: {error}");
            }
        }
        self.stop();
    }

    /// Joins every spawned task.
    ///
    /// Resolves with the fatal error that caused the shutdown, if any. The
    /// error is handed out once; later calls return `Ok`.
    pub async fn wait(&self) -> Result<()> {
        let _joining = self.inner.joining.lock().await;
        let handles = std::mem::take(&mut *self.inner.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    self.fail(Error::Join(e));
                }
            }
        }

        match self.inner.failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
