use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::constants::SESSIONS_KILLED_METRIC;

/// Why a session was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KillReason {
    LongRunningQuery,
    LongRunningTransaction,
}

impl KillReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LongRunningQuery => "long_running_query",
            Self::LongRunningTransaction => "long_running_transaction",
        }
    }
}

/// Sink for terminated-session events. Implementations must tolerate
/// concurrent calls from every monitor.
pub trait KillRecorder: Send + Sync {
    fn record_kill(&self, database: &str, reason: KillReason, command: &str, elapsed_secs: i64);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KillLabels {
    pub database: String,
    pub reason: &'static str,
    pub command: String,
}

/// In-process counter of terminated sessions keyed by database, reason and command.
#[derive(Default)]
pub struct KillMetrics {
    counters: Mutex<HashMap<KillLabels, Arc<AtomicU64>>>,
}

impl KillMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, labels: KillLabels) -> Arc<AtomicU64> {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        counters.entry(labels).or_default().clone()
    }

    pub fn snapshot(&self) -> Vec<(KillLabels, u64)> {
        let counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out: Vec<_> = counters
            .iter()
            .map(|(labels, count)| (labels.clone(), count.load(Ordering::Relaxed)))
            .collect();
        out.sort_by(|a, b| {
            (&a.0.database, a.0.reason, &a.0.command).cmp(&(&b.0.database, b.0.reason, &b.0.command))
        });
        out
    }

    pub fn total(&self) -> u64 {
        self.snapshot().iter().map(|(_, count)| count).sum()
    }

    /// Write every counter to the log; called once on shutdown.
    pub fn log_snapshot(&self) {
        for (labels, count) in self.snapshot() {
            tracing::info!(
                metric = SESSIONS_KILLED_METRIC,
                database = %labels.database,
                reason = labels.reason,
                command = %labels.command,
                count,
                "metric snapshot"
            );
        }
    }
}

impl KillRecorder for KillMetrics {
    fn record_kill(&self, database: &str, reason: KillReason, command: &str, elapsed_secs: i64) {
        let counter = self.counter(KillLabels {
            database: database.to_string(),
            reason: reason.as_str(),
            command: command.to_string(),
        });
        counter.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            metric = SESSIONS_KILLED_METRIC,
            database,
            reason = reason.as_str(),
            command,
            duration = elapsed_secs,
            "recorded query_killed metric"
        );
    }
}
