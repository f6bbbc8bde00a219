use tracing::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Callback bridge usage metrics
#[derive(Debug, Default)]
pub struct CallbackMetrics {
    pub registrations: AtomicU64,
    pub deliveries: AtomicU64,
    pub timeouts: AtomicU64,
    pub orphaned_notifications: AtomicU64,
    pub rejected_registrations: AtomicU64,
    pub abandoned_waits: AtomicU64,
}

impl CallbackMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_orphaned_notification(&self) {
        self.orphaned_notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_registration(&self) {
        self.rejected_registrations.fetch_add(1, Ordering::Relaxed);
        warn!("Callback registration rejected: a caller is already waiting on this workflow");
    }

    pub fn record_abandoned_wait(&self) {
        self.abandoned_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> CallbackStats {
        CallbackStats {
            registrations: self.registrations.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            orphaned_notifications: self.orphaned_notifications.load(Ordering::Relaxed),
            rejected_registrations: self.rejected_registrations.load(Ordering::Relaxed),
            abandoned_waits: self.abandoned_waits.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Callback bridge metrics: registrations={}, deliveries={}, timeouts={}, orphaned={}, rejected={}, abandoned={}",
            stats.registrations,
            stats.deliveries,
            stats.timeouts,
            stats.orphaned_notifications,
            stats.rejected_registrations,
            stats.abandoned_waits
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackStats {
    pub registrations: u64,
    pub deliveries: u64,
    pub timeouts: u64,
    pub orphaned_notifications: u64,
    pub rejected_registrations: u64,
    pub abandoned_waits: u64,
}

/// Create correlated spans for a single workflow operation
pub fn create_workflow_span(
    operation: &str,
    request_number: &str,
    loan_number: &str,
    correlation_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "workflow",
        operation = operation,
        request.number = request_number,
        loan.number = loan_number,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}

#[macro_export]
macro_rules! time_operation {
    ($operation:expr) => {
        let _timer = $crate::observability::OperationTimer::new($operation);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_snapshot_reflects_counters() {
        let metrics = CallbackMetrics::new();
        metrics.record_registration();
        metrics.record_registration();
        metrics.record_delivery();
        metrics.record_timeout();
        metrics.record_orphaned_notification();

        let stats = metrics.get_stats();
        assert_eq!(stats.registrations, 2);
        assert_eq!(stats.deliveries, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.orphaned_notifications, 1);
        assert_eq!(stats.rejected_registrations, 0);
    }
}
