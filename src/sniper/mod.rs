pub mod connection;
pub mod monitor;
pub mod queries;
pub mod reaper;
pub mod session;
pub mod shutdown;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

pub use monitor::{Monitor, TickSummary};
pub use queries::HunterQueries;
pub use session::{QuerySession, SessionSource, TransactionSession};
pub use shutdown::Shutdown;

use crate::config::Config;
use crate::metrics::KillRecorder;

#[derive(Debug, Error)]
pub enum SniperError {
    #[error("configuration error for database {database}: {message}")]
    Configuration { database: String, message: String },
    #[error("error opening database: {0}")]
    Connection(String),
    #[error("error executing template: {0}")]
    QueryTemplate(String),
    #[error("error getting long running sessions: {0}")]
    Query(#[source] sqlx::Error),
    #[error("error scanning row: {0}")]
    Scan(#[source] sqlx::Error),
    #[error("error killing process {id}: {source}")]
    Termination {
        id: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("cancelled by shutdown")]
    Cancelled,
}

/// Runs one [`Monitor`] per configured database until shutdown.
pub struct Supervisor {
    config: Config,
    recorder: Arc<dyn KillRecorder>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Supervisor {
    pub fn new(
        config: &Config,
        recorder: Arc<dyn KillRecorder>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config: config.clone(),
            recorder,
            shutdown_rx,
        }
    }

    /// Build a MySQL-backed monitor for every configured database and run
    /// them until shutdown.
    pub async fn run(self) -> usize {
        let config = self.config.clone();
        let recorder = self.recorder.clone();
        self.run_with(|name| Monitor::from_config(name, &config, recorder.clone()))
            .await
    }

    /// Like [`run`](Self::run) with a caller-supplied monitor factory. A
    /// database whose monitor cannot be built is logged and skipped. Returns
    /// the number of monitors that were launched, once all have stopped.
    pub async fn run_with<F>(self, mut build: F) -> usize
    where
        F: FnMut(&str) -> Result<Monitor, SniperError>,
    {
        // Monitors listen on a relay channel that is only fired after every
        // one of them has subscribed, so none can miss the signal.
        let (relay_tx, _) = broadcast::channel::<()>(1);
        let mut handles = Vec::new();

        for name in self.config.databases.keys() {
            let monitor = match build(name) {
                Ok(monitor) => monitor,
                Err(e) => {
                    tracing::error!(db_name = %name, error = %e, "Failed to create sniper, skipping");
                    continue;
                }
            };

            let shutdown = Shutdown::new(relay_tx.subscribe());
            tracing::info!(db_name = %name, interval = ?monitor.interval(), "Starting sniper");
            handles.push(tokio::spawn(monitor.run(shutdown)));
        }

        let launched = handles.len();
        if launched == 0 {
            tracing::warn!("No snipers could be started");
            return 0;
        }

        let mut shutdown = Shutdown::new(self.shutdown_rx);
        shutdown.recv().await;

        tracing::info!(snipers = launched, "Stopping snipers");
        let _ = relay_tx.send(());

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Sniper task panicked");
            }
        }

        tracing::info!("All snipers stopped");
        launched
    }
}
