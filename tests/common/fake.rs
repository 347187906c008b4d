use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use query_sniper::sniper::{QuerySession, SessionSource, SniperError, TransactionSession};

/// In-memory stand-in for a MySQL server. Clones share state, so a test can
/// keep one handle while a monitor owns another.
#[derive(Clone, Default)]
pub struct FakeSource {
    inner: Arc<FakeState>,
}

#[derive(Default)]
struct FakeState {
    processes: Mutex<Vec<QuerySession>>,
    transactions: Mutex<Vec<TransactionSession>>,
    fail_kill: Mutex<HashSet<i64>>,
    hang_detection: Mutex<bool>,
    fail_queries: Mutex<bool>,
    detection_calls: AtomicUsize,
    kill_calls: Mutex<Vec<i64>>,
}

impl FakeSource {
    pub fn with_processes(processes: Vec<QuerySession>) -> Self {
        let fake = Self::default();
        *fake.inner.processes.lock().expect("lock") = processes;
        fake
    }

    pub fn set_transactions(&self, transactions: Vec<TransactionSession>) {
        *self.inner.transactions.lock().expect("lock") = transactions;
    }

    pub fn fail_kill_for(&self, id: i64) {
        self.inner.fail_kill.lock().expect("lock").insert(id);
    }

    /// Detection calls never complete; only shutdown can end them.
    pub fn hang_detection(&self) {
        *self.inner.hang_detection.lock().expect("lock") = true;
    }

    /// Long running query detection fails with a query error.
    pub fn fail_queries(&self) {
        *self.inner.fail_queries.lock().expect("lock") = true;
    }

    pub fn detection_calls(&self) -> usize {
        self.inner.detection_calls.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> Vec<i64> {
        self.inner.kill_calls.lock().expect("lock").clone()
    }

    async fn detect(&self) {
        self.inner.detection_calls.fetch_add(1, Ordering::SeqCst);
        let hang = *self.inner.hang_detection.lock().expect("lock");
        if hang {
            futures::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl SessionSource for FakeSource {
    async fn long_running_queries(&self, _sql: &str) -> Result<Vec<QuerySession>, SniperError> {
        self.detect().await;
        if *self.inner.fail_queries.lock().expect("lock") {
            return Err(SniperError::Query(sqlx::Error::Protocol(
                "Table 'performance_schema.processlist' doesn't exist".to_string(),
            )));
        }
        Ok(self.inner.processes.lock().expect("lock").clone())
    }

    async fn long_running_transactions(
        &self,
        _sql: &str,
    ) -> Result<Vec<TransactionSession>, SniperError> {
        self.detect().await;
        Ok(self.inner.transactions.lock().expect("lock").clone())
    }

    async fn kill(&self, id: i64) -> Result<(), SniperError> {
        self.inner.kill_calls.lock().expect("lock").push(id);
        if self.inner.fail_kill.lock().expect("lock").contains(&id) {
            return Err(SniperError::Termination {
                id,
                source: sqlx::Error::Protocol(format!("Unknown thread id: {id}")),
            });
        }
        Ok(())
    }
}
