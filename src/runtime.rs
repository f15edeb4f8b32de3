//! Process-wide runtime binding (the preparation gate).
//!
//! A [`RuntimeContext`] resolves exactly once to a channel plus the local
//! environment. Stores created before that moment queue their preparation
//! and run it as soon as [`RuntimeContext::bind`] is called.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::actor::EnvironmentId;
use crate::channel::Channel;

type PendingPreparation = Box<dyn FnOnce(RuntimeBinding) + Send>;

/// The resolved {channel, environment} pair.
#[derive(Clone)]
pub struct RuntimeBinding {
    pub channel: Arc<dyn Channel>,
    pub environment: EnvironmentId,
}

impl std::fmt::Debug for RuntimeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBinding")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

/// Cloneable handle to the preparation gate of one process.
#[derive(Clone)]
pub struct RuntimeContext {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    binding: Mutex<Option<RuntimeBinding>>,
    pending: Mutex<Vec<PendingPreparation>>,
    notify: Notify,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                binding: Mutex::new(None),
                pending: Mutex::new(Vec::new()),
                notify: Notify::new(),
            }),
        }
    }

    /// Resolve the gate.
    ///
    /// Production code binds once; binding again replaces the previous
    /// binding for already-waiting stores only and is meant for tests.
    pub fn bind(&self, channel: Arc<dyn Channel>, environment: EnvironmentId) {
        let binding = RuntimeBinding {
            channel,
            environment,
        };

        {
            let mut current = self.inner.binding.lock();
            if current.is_some() {
                tracing::warn!(
                    environment = %environment,
                    "Runtime binding resolved more than once"
                );
            }
            *current = Some(binding.clone());
        }

        let pending = std::mem::take(&mut *self.inner.pending.lock());
        tracing::debug!(
            environment = %environment,
            pending = pending.len(),
            "Runtime binding resolved"
        );
        for preparation in pending {
            preparation(binding.clone());
        }

        self.inner.notify.notify_waiters();
    }

    /// The binding, if already resolved.
    pub fn binding(&self) -> Option<RuntimeBinding> {
        self.inner.binding.lock().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.inner.binding.lock().is_some()
    }

    /// Wait until the gate is resolved.
    pub async fn await_binding(&self) -> RuntimeBinding {
        loop {
            // Register interest before checking to avoid missing a bind that
            // happens between the check and the await.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(binding) = self.binding() {
                return binding;
            }
            notified.await;
        }
    }

    /// Run `preparation` with the binding: immediately if resolved,
    /// otherwise when [`RuntimeContext::bind`] is called.
    pub(crate) fn when_bound(&self, preparation: impl FnOnce(RuntimeBinding) + Send + 'static) {
        let binding = {
            let current = self.inner.binding.lock();
            match current.as_ref() {
                Some(binding) => binding.clone(),
                None => {
                    self.inner.pending.lock().push(Box::new(preparation));
                    return;
                }
            }
        };

        preparation(binding);
    }

    /// Forget the binding and any queued preparations. Test isolation only.
    pub fn reset(&self) {
        *self.inner.binding.lock() = None;
        self.inner.pending.lock().clear();
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}
