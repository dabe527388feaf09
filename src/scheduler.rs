//! An opt-in periodic driver for `sync()`. Purely a convenience: a caller that
//! drives sync from its own event loop (push notification, app foregrounded) can
//! ignore this module entirely — it has no effect on the core algorithms.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Clone)]
pub struct SyncSchedulerHandle {
    trigger: mpsc::Sender<()>,
}

impl SyncSchedulerHandle {
    /// Requests an out-of-band sync at the next opportunity, without waiting for
    /// the current interval to elapse. A full channel (a trigger already pending)
    /// is treated as a no-op rather than blocking the caller.
    pub fn trigger_now(&self) {
        let _ = self.trigger.try_send(());
    }
}

pub struct SyncScheduler {
    handle: SyncSchedulerHandle,
    join: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawns a task that calls `sync_fn` every `interval`, and immediately again
    /// whenever [`SyncSchedulerHandle::trigger_now`] fires.
    pub fn start<F, Fut>(interval: Duration, mut sync_fn: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (trigger, mut triggered) = mpsc::channel(1);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("scheduler: interval tick");
                        sync_fn().await;
                    }
                    msg = triggered.recv() => {
                        match msg {
                            Some(()) => {
                                debug!("scheduler: triggered out of band");
                                sync_fn().await;
                            }
                            None => break,
                        }
                    }
                }
            }
        });
        Self { handle: SyncSchedulerHandle { trigger }, join }
    }

    pub fn handle(&self) -> SyncSchedulerHandle {
        self.handle.clone()
    }

    /// Stops the scheduler and waits for its task to exit.
    pub async fn stop(self) {
        drop(self.handle);
        let _ = self.join.await;
    }
}
