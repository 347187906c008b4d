use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use query_sniper::config::DatabaseConfig;
use query_sniper::sniper::{QuerySession, TransactionSession};

pub fn database(schema: &str, interval: Duration) -> DatabaseConfig {
    DatabaseConfig {
        address: "127.0.0.1:3306".to_string(),
        schema: schema.to_string(),
        username: "sniper".to_string(),
        password: "hunter2".to_string(),
        interval,
        long_query_limit: Duration::from_secs(60),
        long_transaction_limit: Duration::from_secs(300),
        ..DatabaseConfig::default()
    }
}

pub fn process(id: i64) -> QuerySession {
    QuerySession {
        id,
        user: Some("app".to_string()),
        schema: Some("prod".to_string()),
        command: "Query".to_string(),
        time: 120,
        digest_text: Some("SELECT * FROM `orders` WHERE `id` = ?".to_string()),
    }
}

pub fn transaction(trx_id: i64, process_id: i64) -> TransactionSession {
    TransactionSession {
        trx_id,
        process_id,
        state: Some("LOCK WAIT".to_string()),
        time: 600,
        user: Some("app".to_string()),
        schema: Some("prod".to_string()),
        digest_text: None,
    }
}

/// Write `contents` to `name` inside `dir` and return the full path.
pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write fixture file");
    path
}
