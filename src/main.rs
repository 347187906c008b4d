use std::process;
use std::sync::Arc;

use clap::Parser;
use query_sniper::cli::CliArguments;
use query_sniper::config::Config;
use query_sniper::logging::{init_tracing, log_build_info, LogConfig};
use query_sniper::metrics::KillMetrics;
use query_sniper::sniper::Supervisor;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = CliArguments::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            process::exit(1);
        }
    };
    cli.apply(&mut config);

    if cli.show_config {
        match serde_json::to_string_pretty(&config.redacted()) {
            Ok(json) => {
                println!("{json}");
                process::exit(0);
            }
            Err(e) => {
                eprintln!("FATAL: failed to render config: {e}");
                process::exit(1);
            }
        }
    }

    if let Err(e) = config.validate() {
        eprintln!("FATAL: invalid config: {e}");
        process::exit(1);
    }

    init_tracing(&LogConfig::from(&config.log));
    log_build_info();
    tracing::info!(
        databases = config.databases.len(),
        safe_mode = config.safe_mode,
        "Starting QuerySniper"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let metrics = Arc::new(KillMetrics::new());

    let supervisor = Supervisor::new(&config, metrics.clone(), shutdown_tx.subscribe());
    let mut supervisor_handle = tokio::spawn(supervisor.run());

    let exited_early = tokio::select! {
        () = shutdown_signal() => None,
        res = &mut supervisor_handle => Some(res),
    };

    let finished = match exited_early {
        Some(res) => {
            tracing::warn!("Supervisor exited before shutdown was requested");
            res
        }
        None => {
            let _ = shutdown_tx.send(());
            supervisor_handle.await
        }
    };

    match finished {
        Ok(launched) => tracing::info!(snipers = launched, "Supervisor exited"),
        Err(e) => tracing::error!(error = %e, "Supervisor task panicked"),
    }

    metrics.log_snapshot();
    tracing::info!("QuerySniper shut down");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
}
