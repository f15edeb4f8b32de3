use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::StoreError;

/// Single-resolution readiness outcome.
///
/// The first `settle` wins; later settles are no-ops. `fail` additionally
/// records a terminal error that happens after the store became ready
/// (leader conflict), so later waiters observe it.
pub(crate) struct Readiness {
    outcome: Mutex<Option<Result<(), StoreError>>>,
    notify: Notify,
}

impl Readiness {
    pub(crate) fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Returns `true` if this call settled the outcome.
    pub(crate) fn settle(&self, outcome: Result<(), StoreError>) -> bool {
        {
            let mut current = self.outcome.lock();
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
        }
        self.notify.notify_waiters();
        true
    }

    /// Record a terminal error, replacing an earlier success.
    pub(crate) fn fail(&self, error: StoreError) {
        {
            let mut current = self.outcome.lock();
            if matches!(*current, Some(Err(_))) {
                return;
            }
            *current = Some(Err(error));
        }
        self.notify.notify_waiters();
    }

    pub(crate) fn outcome(&self) -> Option<Result<(), StoreError>> {
        self.outcome.lock().clone()
    }

    pub(crate) async fn wait(&self) -> Result<(), StoreError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }
}
