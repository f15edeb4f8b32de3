use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;

/// Cancellable one-shot timer.
///
/// Runs on the current tokio runtime when there is one, otherwise on a
/// dedicated thread. The callback never runs after `cancel`.
pub(crate) struct SyncTimer {
    cancelled: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl SyncTimer {
    pub(crate) fn start(duration: Duration, on_fire: impl FnOnce() + Send + 'static) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(async move {
                    tokio::time::sleep(duration).await;
                    if !flag.load(Ordering::SeqCst) {
                        on_fire();
                    }
                });
                Self {
                    cancelled,
                    task: Some(task.abort_handle()),
                }
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("store-sync-timer".to_string())
                    .spawn(move || {
                        std::thread::sleep(duration);
                        if !flag.load(Ordering::SeqCst) {
                            on_fire();
                        }
                    });
                if let Err(err) = spawned {
                    tracing::error!(error = %err, "Failed to spawn store sync timer thread");
                }
                Self {
                    cancelled,
                    task: None,
                }
            }
        }
    }

    pub(crate) fn cancel(mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn fires_after_duration() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _timer = SyncTimer::start(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let timer = SyncTimer::start(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn works_without_a_runtime() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _timer = SyncTimer::start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
