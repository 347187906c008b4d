use super::session::{QuerySession, SessionSource, TransactionSession};
use super::shutdown::Shutdown;
use super::SniperError;
use crate::metrics::{KillReason, KillRecorder};

/// One detect-and-kill pass against a single database.
///
/// Kill failures are logged per session and never stop the batch; the count
/// returned covers dry-run candidates plus successful kills.
pub struct Reaper<'a> {
    pub database: &'a str,
    pub dry_run: bool,
    pub source: &'a dyn SessionSource,
    pub recorder: &'a dyn KillRecorder,
}

impl Reaper<'_> {
    pub async fn find_long_running_queries(
        &self,
        sql: &str,
        shutdown: &mut Shutdown,
    ) -> Result<Vec<QuerySession>, SniperError> {
        shutdown.guard(self.source.long_running_queries(sql)).await
    }

    pub async fn find_long_running_transactions(
        &self,
        sql: &str,
        shutdown: &mut Shutdown,
    ) -> Result<Vec<TransactionSession>, SniperError> {
        shutdown
            .guard(self.source.long_running_transactions(sql))
            .await
    }

    pub async fn kill_processes(&self, processes: &[QuerySession], shutdown: &mut Shutdown) -> usize {
        let mut killed = 0;

        for process in processes {
            if process.id <= 0 {
                continue;
            }

            let user = process.user.as_deref().unwrap_or_default();
            let schema = process.schema.as_deref().unwrap_or_default();
            let digest_text = process.digest_text.as_deref().unwrap_or_default();

            if self.dry_run {
                tracing::info!(
                    db = self.database,
                    user,
                    dry_run = self.dry_run,
                    time = process.time,
                    process_id = process.id,
                    command = %process.command,
                    schema,
                    digest_text,
                    "DRY RUN - Would kill mysql process"
                );
                killed += 1;
                continue;
            }

            if let Err(e) = shutdown.guard(self.source.kill(process.id)).await {
                tracing::error!(
                    db = self.database,
                    user,
                    dry_run = self.dry_run,
                    time = process.time,
                    process_id = process.id,
                    command = %process.command,
                    schema,
                    digest_text,
                    error = %e,
                    "Error killing mysql process"
                );
                continue;
            }

            tracing::info!(
                db = self.database,
                user,
                dry_run = self.dry_run,
                time = process.time,
                process_id = process.id,
                command = %process.command,
                schema,
                digest_text,
                "Killed mysql process"
            );
            self.recorder.record_kill(
                self.database,
                KillReason::LongRunningQuery,
                &process.command,
                process.time,
            );
            killed += 1;
        }

        killed
    }

    /// Transactions are killed through the processlist thread that holds them.
    pub async fn kill_transactions(
        &self,
        transactions: &[TransactionSession],
        shutdown: &mut Shutdown,
    ) -> usize {
        let mut killed = 0;

        for trx in transactions {
            if trx.process_id <= 0 {
                continue;
            }

            let user = trx.user.as_deref().unwrap_or_default();
            let schema = trx.schema.as_deref().unwrap_or_default();
            let state = trx.state.as_deref().unwrap_or_default();
            let digest_text = trx.digest_text.as_deref().unwrap_or_default();

            if self.dry_run {
                tracing::info!(
                    db = self.database,
                    user,
                    dry_run = self.dry_run,
                    time = trx.time,
                    trx_id = trx.trx_id,
                    process_id = trx.process_id,
                    state,
                    schema,
                    digest_text,
                    "DRY RUN - Would kill mysql transaction"
                );
                killed += 1;
                continue;
            }

            if let Err(e) = shutdown.guard(self.source.kill(trx.process_id)).await {
                tracing::error!(
                    db = self.database,
                    user,
                    dry_run = self.dry_run,
                    time = trx.time,
                    trx_id = trx.trx_id,
                    process_id = trx.process_id,
                    state,
                    schema,
                    digest_text,
                    error = %e,
                    "Error killing mysql transaction"
                );
                continue;
            }

            tracing::info!(
                db = self.database,
                user,
                dry_run = self.dry_run,
                time = trx.time,
                trx_id = trx.trx_id,
                process_id = trx.process_id,
                state,
                schema,
                digest_text,
                "Killed mysql transaction"
            );
            self.recorder.record_kill(
                self.database,
                KillReason::LongRunningTransaction,
                state,
                trx.time,
            );
            killed += 1;
        }

        killed
    }
}
