//! Per-operation latency and outcome statistics.
//!
//! Every expensive step of the pipeline (page classification, listing
//! extraction, validation, the per-URL unit and the batch itself) runs
//! through [`OperationMonitor::track`], which times the future, records
//! success or failure, and hands the result back unchanged. The monitor
//! observes errors; it never swallows them.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::util::{duration_secs, truncate_chars};

/// Calls slower than this are logged as warnings.
pub const SLOW_OPERATION_THRESHOLD: Duration = Duration::from_secs(30);

/// Error strings kept per operation.
pub const MAX_RECENT_ERRORS: usize = 50;

const ERROR_MESSAGE_CHARS: usize = 200;
const SUMMARY_ERRORS: usize = 5;

/// Raw counters for one named operation.
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Sum of successful call durations.
    pub cumulative_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Duration,
    /// Most recent errors, oldest first.
    pub recent_errors: VecDeque<String>,
}

impl OperationStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.successful_calls as f64 / self.total_calls as f64
    }

    /// Mean duration of successful calls.
    pub fn average_duration(&self) -> Duration {
        if self.successful_calls == 0 {
            return Duration::ZERO;
        }
        let calls = u32::try_from(self.successful_calls).unwrap_or(u32::MAX);
        self.cumulative_duration / calls
    }

    fn record(&mut self, duration: Duration, success: bool, error: Option<&str>) {
        self.total_calls += 1;
        if success {
            self.successful_calls += 1;
            self.cumulative_duration += duration;
            self.min_duration = Some(self.min_duration.map_or(duration, |m| m.min(duration)));
            self.max_duration = self.max_duration.max(duration);
        } else {
            self.failed_calls += 1;
            if let Some(error) = error {
                if self.recent_errors.len() == MAX_RECENT_ERRORS {
                    self.recent_errors.pop_front();
                }
                self.recent_errors.push_back(format!(
                    "{}: {}",
                    Utc::now().format("%H:%M:%S"),
                    truncate_chars(error, ERROR_MESSAGE_CHARS)
                ));
            }
        }
    }

    pub fn summary(&self) -> OperationSummary {
        OperationSummary {
            total_calls: self.total_calls,
            successful_calls: self.successful_calls,
            failed_calls: self.failed_calls,
            success_rate: self.success_rate(),
            average_duration: self.average_duration(),
            min_duration: self.min_duration.unwrap_or_default(),
            max_duration: self.max_duration,
            recent_errors: self
                .recent_errors
                .iter()
                .skip(self.recent_errors.len().saturating_sub(SUMMARY_ERRORS))
                .cloned()
                .collect(),
        }
    }
}

/// Reporting view of [`OperationStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSummary {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub success_rate: f64,
    #[serde(with = "duration_secs")]
    pub average_duration: Duration,
    #[serde(with = "duration_secs")]
    pub min_duration: Duration,
    #[serde(with = "duration_secs")]
    pub max_duration: Duration,
    pub recent_errors: Vec<String>,
}

/// Point-in-time view of every operation.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    #[serde(with = "duration_secs")]
    pub uptime: Duration,
    pub operations: BTreeMap<String, OperationSummary>,
    pub total_operations: u64,
    pub total_successful: u64,
    pub total_failed: u64,
    pub overall_success_rate: f64,
}

#[derive(Debug)]
struct MonitorInner {
    stats: HashMap<String, OperationStats>,
    started_at: Instant,
}

/// Thread-safe registry of [`OperationStats`], one per operation name.
#[derive(Debug)]
pub struct OperationMonitor {
    inner: Mutex<MonitorInner>,
}

impl Default for OperationMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationMonitor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MonitorInner {
                stats: HashMap::new(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned monitor mutex");
            poisoned.into_inner()
        })
    }

    /// Record the outcome of one call.
    pub fn record(&self, operation: &str, duration: Duration, success: bool, error: Option<&str>) {
        let mut inner = self.lock_inner();
        inner
            .stats
            .entry(operation.to_string())
            .or_default()
            .record(duration, success, error);
    }

    /// Raw counters for one operation.
    pub fn stats(&self, operation: &str) -> Option<OperationStats> {
        self.lock_inner().stats.get(operation).cloned()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.lock_inner();
        let operations: BTreeMap<String, OperationSummary> = inner
            .stats
            .iter()
            .map(|(name, stats)| (name.clone(), stats.summary()))
            .collect();
        let total_operations: u64 = inner.stats.values().map(|s| s.total_calls).sum();
        let total_successful: u64 = inner.stats.values().map(|s| s.successful_calls).sum();
        let total_failed: u64 = inner.stats.values().map(|s| s.failed_calls).sum();

        MonitorSnapshot {
            uptime: inner.started_at.elapsed(),
            operations,
            total_operations,
            total_successful,
            total_failed,
            overall_success_rate: if total_operations == 0 {
                0.0
            } else {
                total_successful as f64 / total_operations as f64
            },
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        inner.stats.clear();
        inner.started_at = Instant::now();
        tracing::info!("Operation monitor stats reset");
    }

    /// Log the current snapshot, one line per operation.
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            uptime_secs = snapshot.uptime.as_secs(),
            total = snapshot.total_operations,
            success_pct = snapshot.overall_success_rate * 100.0,
            "Job discovery monitor summary"
        );
        for (name, op) in &snapshot.operations {
            tracing::info!(
                operation = %name,
                successful = op.successful_calls,
                total = op.total_calls,
                avg_secs = op.average_duration.as_secs_f64(),
                "Operation stats"
            );
        }
    }

    /// Run `operation`, record its duration and outcome under `name`, and
    /// return its result untouched.
    pub async fn track<T, E, Fut>(&self, name: &str, operation: Fut) -> Result<T, E>
    where
        E: Display,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let result = operation.await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => self.record(name, duration, true, None),
            Err(e) => {
                let message = e.to_string();
                tracing::error!(operation = %name, error = %message, "Operation failed");
                self.record(name, duration, false, Some(&message));
            }
        }

        if duration > SLOW_OPERATION_THRESHOLD {
            tracing::warn!(
                operation = %name,
                secs = duration.as_secs_f64(),
                "Slow operation"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::AppError;

    #[test]
    fn record_updates_counters_and_durations() {
        let monitor = OperationMonitor::new();
        monitor.record("op", Duration::from_millis(100), true, None);
        monitor.record("op", Duration::from_millis(300), true, None);
        monitor.record("op", Duration::from_millis(50), false, Some("boom"));

        let stats = monitor.stats("op").unwrap();
        assert_eq!(stats.total_calls, 3);
        assert_eq!(stats.successful_calls, 2);
        assert_eq!(stats.failed_calls, 1);
        assert_eq!(stats.min_duration, Some(Duration::from_millis(100)));
        assert_eq!(stats.max_duration, Duration::from_millis(300));
        assert_eq!(stats.average_duration(), Duration::from_millis(200));
        assert!(stats.recent_errors[0].ends_with("boom"));
    }

    #[test]
    fn recent_errors_keep_the_newest() {
        let monitor = OperationMonitor::new();
        for i in 0..(MAX_RECENT_ERRORS + 10) {
            monitor.record("op", Duration::ZERO, false, Some(&format!("error {i}")));
        }
        let stats = monitor.stats("op").unwrap();
        assert_eq!(stats.recent_errors.len(), MAX_RECENT_ERRORS);
        assert!(stats.recent_errors[0].ends_with("error 10"));
        assert!(stats.recent_errors.back().unwrap().ends_with("error 59"));

        let summary = stats.summary();
        assert_eq!(summary.recent_errors.len(), SUMMARY_ERRORS);
        assert!(summary.recent_errors.last().unwrap().ends_with("error 59"));
    }

    #[test]
    fn snapshot_derives_rates() {
        let monitor = OperationMonitor::new();
        monitor.record("a", Duration::from_millis(10), true, None);
        monitor.record("b", Duration::from_millis(10), false, Some("x"));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_operations, 2);
        assert_eq!(snapshot.total_successful, 1);
        assert_eq!(snapshot.total_failed, 1);
        assert_eq!(snapshot.overall_success_rate, 0.5);
        assert_eq!(snapshot.operations["a"].success_rate, 1.0);
        assert_eq!(snapshot.operations["b"].min_duration, Duration::ZERO);

        monitor.reset();
        assert!(monitor.snapshot().operations.is_empty());
    }

    #[tokio::test]
    async fn track_passes_results_through() {
        let monitor = OperationMonitor::new();

        let ok = monitor
            .track("op", async { Ok::<_, AppError>("value") })
            .await;
        assert_eq!(ok.unwrap(), "value");

        let err = monitor
            .track("op", async {
                Err::<(), _>(AppError::BrowserError("tab crashed".into()))
            })
            .await;
        assert!(matches!(err, Err(AppError::BrowserError(_))));

        let stats = monitor.stats("op").unwrap();
        assert_eq!(stats.successful_calls, 1);
        assert_eq!(stats.failed_calls, 1);
        assert!(stats.recent_errors[0].contains("tab crashed"));
    }

    #[tokio::test]
    async fn concurrent_recording_loses_no_updates() {
        let monitor = Arc::new(OperationMonitor::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let monitor = Arc::clone(&monitor);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    monitor.record("op", Duration::from_millis(1), i % 2 == 0, Some("e"));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = monitor.stats("op").unwrap();
        assert_eq!(stats.total_calls, 800);
        assert_eq!(stats.successful_calls, 400);
        assert_eq!(stats.failed_calls, 400);
    }
}
