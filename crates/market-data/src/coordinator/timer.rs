//! Cancel-and-replace one-shot timers.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

/// Holds at most one pending one-shot timer.
///
/// Arming aborts whatever was pending. When the timer fires, the callback is
/// spawned as its own task, so re-arming from inside the callback never
/// aborts the callback itself.
#[derive(Default)]
pub(crate) struct TimerSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| {
            warn!("Timer mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `callback` after `delay`, replacing any pending timer.
    pub fn arm<F, Fut>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(callback());
        }));
    }

    pub fn cancel(&self) {
        if let Some(previous) = self.lock().take() {
            previous.abort();
        }
    }

    /// True while a timer is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
