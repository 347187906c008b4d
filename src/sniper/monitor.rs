use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;

use super::connection::{self, MySqlSessions, TlsMode};
use super::queries::HunterQueries;
use super::reaper::Reaper;
use super::session::SessionSource;
use super::shutdown::Shutdown;
use super::SniperError;
use crate::config::{Config, DatabaseConfig};
use crate::metrics::KillRecorder;

/// Sessions handled during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub queries: usize,
    pub transactions: usize,
}

/// Watches a single database: owns its connection and compiled hunter queries.
pub struct Monitor {
    name: String,
    schema: String,
    interval: Duration,
    query_limit: Duration,
    transaction_limit: Duration,
    dry_run: bool,
    queries: HunterQueries,
    source: Box<dyn SessionSource>,
    recorder: Arc<dyn KillRecorder>,
}

impl Monitor {
    /// Look `name` up in `config` and build a MySQL-backed monitor for it.
    pub fn from_config(
        name: &str,
        config: &Config,
        recorder: Arc<dyn KillRecorder>,
    ) -> Result<Self, SniperError> {
        let db = config
            .databases
            .get(name)
            .ok_or_else(|| SniperError::Configuration {
                database: name.to_string(),
                message: "no such database in configuration".to_string(),
            })?;
        Self::new(name, db, config.safe_mode, recorder)
    }

    pub fn new(
        name: &str,
        db: &DatabaseConfig,
        safe_mode: bool,
        recorder: Arc<dyn KillRecorder>,
    ) -> Result<Self, SniperError> {
        let pool = connection::connect(db)?;
        let monitor = Self::with_source(
            name,
            db,
            safe_mode,
            Box::new(MySqlSessions::new(pool)),
            recorder,
        )?;

        tracing::info!(
            name = %monitor.name,
            address = %db.address,
            port = db.port,
            username = %db.username,
            schema = %monitor.schema,
            tls = TlsMode::from_config(db).is_enabled(),
            interval = ?monitor.interval,
            query_limit = ?monitor.query_limit,
            transaction_limit = ?monitor.transaction_limit,
            dry_run = monitor.dry_run,
            safe_mode_active = safe_mode,
            lrq_query = %monitor.queries.long_query,
            lrtxn_query = %monitor.queries.long_transaction,
            "Created new sniper"
        );

        Ok(monitor)
    }

    /// Build around an existing session source. Safe mode forces dry run
    /// regardless of the database's own setting.
    pub fn with_source(
        name: &str,
        db: &DatabaseConfig,
        safe_mode: bool,
        source: Box<dyn SessionSource>,
        recorder: Arc<dyn KillRecorder>,
    ) -> Result<Self, SniperError> {
        if db.interval.is_zero() {
            return Err(SniperError::Configuration {
                database: name.to_string(),
                message: "interval must be greater than zero".to_string(),
            });
        }

        let queries =
            HunterQueries::build(db.long_query_limit, db.long_transaction_limit, &db.schema)?;

        Ok(Self {
            name: name.to_string(),
            schema: db.schema.clone(),
            interval: db.interval,
            query_limit: db.long_query_limit,
            transaction_limit: db.long_transaction_limit,
            dry_run: db.dry_run || safe_mode,
            queries,
            source,
            recorder,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn queries(&self) -> &HunterQueries {
        &self.queries
    }

    /// Tick every `interval` until shutdown. The first tick fires one interval
    /// after start; a tick that is already running finishes before shutdown
    /// is looked at again.
    pub async fn run(self, shutdown: Shutdown) {
        let span = tracing::info_span!("sniper", db = %self.name);
        self.run_loop(shutdown).instrument(span).await;
    }

    async fn run_loop(&self, mut shutdown: Shutdown) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = shutdown.recv() => {
                    tracing::debug!(db = %self.name, "Shutdown received, stopping ticker");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick(&mut shutdown).await;
                }
            }
        }
    }

    /// One detection pass for queries, then one for transactions. Either may
    /// fail without affecting the other.
    pub async fn tick(&self, shutdown: &mut Shutdown) -> TickSummary {
        let reaper = Reaper {
            database: &self.name,
            dry_run: self.dry_run,
            source: self.source.as_ref(),
            recorder: self.recorder.as_ref(),
        };

        let queries = match reaper
            .find_long_running_queries(&self.queries.long_query, shutdown)
            .await
        {
            Ok(found) if found.is_empty() => 0,
            Ok(found) => reaper.kill_processes(&found, shutdown).await,
            Err(e) => {
                tracing::error!(
                    db = %self.name,
                    query = %self.queries.long_query,
                    error = %e,
                    "Error finding long running queries"
                );
                0
            }
        };

        let transactions = match reaper
            .find_long_running_transactions(&self.queries.long_transaction, shutdown)
            .await
        {
            Ok(found) if found.is_empty() => 0,
            Ok(found) => reaper.kill_transactions(&found, shutdown).await,
            Err(e) => {
                tracing::error!(
                    db = %self.name,
                    query = %self.queries.long_transaction,
                    error = %e,
                    "Error finding long running transactions"
                );
                0
            }
        };

        if queries + transactions > 0 {
            tracing::info!(
                db = %self.name,
                queries,
                transactions,
                dry_run = self.dry_run,
                "Sniper tick handled sessions"
            );
        }

        TickSummary {
            queries,
            transactions,
        }
    }
}
