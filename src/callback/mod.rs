//! Synchronous callback bridge.
//!
//! Lets an API caller block on a workflow key until the asynchronous workflow
//! engine reports the step as finished, or until a timeout elapses. Each
//! registration is a single-fire `oneshot` channel; at most one caller may wait on
//! a key at a time. Registrations live in this process only, so a notification
//! raised by another process never reaches a local waiter; such waiters fall back
//! to their timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::observability::{CallbackMetrics, CallbackStats};
use crate::workflows::{WorkflowKey, WorkflowRecord};

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("A caller is already waiting for workflow {0}")]
    AlreadyWaiting(WorkflowKey),
}

struct Registration {
    id: u64,
    sender: oneshot::Sender<WorkflowRecord>,
}

struct Registry {
    pending: Mutex<HashMap<WorkflowKey, Registration>>,
    next_id: AtomicU64,
    metrics: CallbackMetrics,
}

impl Registry {
    // The map is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<WorkflowKey, Registration>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_if_owned(&self, key: &WorkflowKey, id: u64) -> bool {
        let mut pending = self.lock();
        match pending.get(key) {
            Some(registration) if registration.id == id => {
                pending.remove(key);
                true
            }
            _ => false,
        }
    }
}

/// Registry of callers waiting on workflow keys
#[derive(Clone)]
pub struct CallbackBridge {
    registry: Arc<Registry>,
    default_timeout: Duration,
    max_timeout: Duration,
}

impl Default for CallbackBridge {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_TIMEOUT)
    }
}

impl std::fmt::Debug for CallbackBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackBridge")
            .field("pending", &self.pending_count())
            .field("default_timeout", &self.default_timeout)
            .field("max_timeout", &self.max_timeout)
            .finish()
    }
}

impl CallbackBridge {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(Registry {
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                metrics: CallbackMetrics::new(),
            }),
            default_timeout,
            max_timeout: Duration::MAX,
        }
    }

    /// Cap applied to every per-call timeout
    pub fn with_max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Register interest in `key` without blocking yet.
    ///
    /// Register before triggering the work that will notify, then await the
    /// returned handle; dropping the handle releases the registration.
    pub fn register(&self, key: &WorkflowKey) -> Result<PendingCallback, CallbackError> {
        let (sender, receiver) = oneshot::channel();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut pending = self.registry.lock();
            if pending.contains_key(key) {
                drop(pending);
                self.registry.metrics.record_rejected_registration();
                return Err(CallbackError::AlreadyWaiting(key.clone()));
            }
            pending.insert(key.clone(), Registration { id, sender });
        }

        self.registry.metrics.record_registration();
        debug!(workflow = %key, registration_id = id, "Callback registered");

        Ok(PendingCallback {
            registry: Arc::clone(&self.registry),
            key: key.clone(),
            id,
            receiver,
            default_timeout: self.default_timeout,
            max_timeout: self.max_timeout,
            resolved: false,
        })
    }

    /// Block until `key` is notified or `timeout` (default when `None`) elapses.
    ///
    /// Returns the notified record, or `None` on timeout.
    pub async fn wait_for_callback(
        &self,
        key: &WorkflowKey,
        timeout: Option<Duration>,
    ) -> Result<Option<WorkflowRecord>, CallbackError> {
        let pending = self.register(key)?;
        Ok(pending.wait(timeout).await)
    }

    /// Wake the caller waiting on `key`, if any. Without a waiter this does nothing.
    pub fn notify_callback(&self, key: &WorkflowKey, record: WorkflowRecord) -> bool {
        let registration = self.registry.lock().remove(key);

        let Some(registration) = registration else {
            self.registry.metrics.record_orphaned_notification();
            debug!(workflow = %key, "No caller waiting for workflow callback");
            return false;
        };

        match registration.sender.send(record) {
            Ok(()) => {
                self.registry.metrics.record_delivery();
                info!(workflow = %key, registration_id = registration.id, "Workflow callback delivered");
                true
            }
            Err(_) => {
                self.registry.metrics.record_orphaned_notification();
                warn!(workflow = %key, "Waiting caller went away before callback delivery");
                false
            }
        }
    }

    pub fn has_pending_callback(&self, key: &WorkflowKey) -> bool {
        self.registry.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Release every waiter; each returns as if its timeout had elapsed.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.registry.lock().drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "Cancelled pending workflow callbacks");
        }
        drained.len()
    }

    pub fn stats(&self) -> CallbackStats {
        self.registry.metrics.get_stats()
    }

    pub fn log_stats(&self) {
        self.registry.metrics.log_stats();
    }
}

/// A live registration on one workflow key
pub struct PendingCallback {
    registry: Arc<Registry>,
    key: WorkflowKey,
    id: u64,
    receiver: oneshot::Receiver<WorkflowRecord>,
    default_timeout: Duration,
    max_timeout: Duration,
    resolved: bool,
}

impl PendingCallback {
    pub fn key(&self) -> &WorkflowKey {
        &self.key
    }

    pub async fn wait(mut self, timeout: Option<Duration>) -> Option<WorkflowRecord> {
        let timeout = timeout.unwrap_or(self.default_timeout).min(self.max_timeout);

        let result = tokio::time::timeout(timeout, &mut self.receiver).await;
        self.resolved = true;

        match result {
            Ok(Ok(record)) => Some(record),
            Ok(Err(_)) => {
                debug!(workflow = %self.key, "Callback registration cancelled");
                None
            }
            Err(_) => {
                self.registry.remove_if_owned(&self.key, self.id);
                self.registry.metrics.record_timeout();
                info!(
                    workflow = %self.key,
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for workflow callback"
                );
                None
            }
        }
    }
}

impl Drop for PendingCallback {
    fn drop(&mut self) {
        if self.registry.remove_if_owned(&self.key, self.id) && !self.resolved {
            self.registry.metrics.record_abandoned_wait();
            debug!(workflow = %self.key, "Abandoned callback registration removed");
        }
    }
}
