use async_trait::async_trait;
use futures::{TryStream, TryStreamExt};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use sqlx::Executor;

use super::session::{QuerySession, SessionSource, TransactionSession};
use super::SniperError;
use crate::config::DatabaseConfig;
use crate::constants::{DEFAULT_MYSQL_PORT, MAX_POOL_CONNECTIONS};

/// TLS settings derived from the `ssl_*` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Any combination other than the two below; no TLS is requested.
    Disabled,
    /// Encrypted, server verified against the CA, no client certificate.
    CaOnly { ca: String },
    /// Encrypted with a client certificate.
    Mutual {
        ca: String,
        cert: String,
        key: String,
    },
}

impl TlsMode {
    /// Partial combinations (cert or key without a CA, or a CA with only one
    /// of cert/key) quietly fall back to `Disabled`.
    pub fn from_config(db: &DatabaseConfig) -> Self {
        let has_ca = !db.ssl_ca.is_empty();
        let has_cert = !db.ssl_cert.is_empty();
        let has_key = !db.ssl_key.is_empty();

        match (has_ca, has_cert, has_key) {
            (true, false, false) => Self::CaOnly {
                ca: db.ssl_ca.clone(),
            },
            (true, true, true) => Self::Mutual {
                ca: db.ssl_ca.clone(),
                cert: db.ssl_cert.clone(),
                key: db.ssl_key.clone(),
            },
            _ => Self::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Split `host:port` (or `[v6]:port`), falling back to `port` and then 3306
/// when the address names no port.
pub fn split_address(address: &str, port: Option<u16>) -> Result<(String, u16), SniperError> {
    let address = address.trim();

    let (host, parsed_port) = if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| SniperError::Connection(format!("malformed address {address}")))?;
        match tail.strip_prefix(':') {
            Some(p) => (host, Some(p)),
            None if tail.is_empty() => (host, None),
            None => {
                return Err(SniperError::Connection(format!(
                    "malformed address {address}"
                )))
            }
        }
    } else {
        match address.rsplit_once(':') {
            Some((host, p)) => (host, Some(p)),
            None => (address, None),
        }
    };

    if host.is_empty() {
        return Err(SniperError::Connection(format!(
            "missing host in address {address}"
        )));
    }

    let port = match parsed_port {
        Some(p) => p.parse::<u16>().map_err(|e| {
            SniperError::Connection(format!("invalid port in address {address}: {e}"))
        })?,
        None => port.unwrap_or(DEFAULT_MYSQL_PORT),
    };

    Ok((host.to_string(), port))
}

pub fn connect_options(db: &DatabaseConfig) -> Result<MySqlConnectOptions, SniperError> {
    let (host, port) = split_address(&db.address, db.port)?;

    let options = MySqlConnectOptions::new()
        .host(&host)
        .port(port)
        .username(&db.username)
        .password(&db.password);

    let options = match TlsMode::from_config(db) {
        TlsMode::Disabled => options.ssl_mode(MySqlSslMode::Disabled),
        TlsMode::CaOnly { ca } => options.ssl_mode(MySqlSslMode::VerifyCa).ssl_ca(ca),
        TlsMode::Mutual { ca, cert, key } => options
            .ssl_mode(MySqlSslMode::VerifyCa)
            .ssl_ca(ca)
            .ssl_client_cert(cert)
            .ssl_client_key(key),
    };

    Ok(options)
}

/// Build a lazily connecting pool; nothing touches the network until the
/// first query. Must be called from within a Tokio runtime.
pub fn connect(db: &DatabaseConfig) -> Result<MySqlPool, SniperError> {
    let options = connect_options(db)?;
    Ok(MySqlPoolOptions::new()
        .max_connections(MAX_POOL_CONNECTIONS)
        .connect_lazy_with(options))
}

/// [`SessionSource`] backed by a MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlSessions {
    pool: MySqlPool,
}

impl MySqlSessions {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionSource for MySqlSessions {
    async fn long_running_queries(&self, sql: &str) -> Result<Vec<QuerySession>, SniperError> {
        collect_rows(sqlx::query(sql).fetch(&self.pool), QuerySession::from_row).await
    }

    async fn long_running_transactions(
        &self,
        sql: &str,
    ) -> Result<Vec<TransactionSession>, SniperError> {
        collect_rows(
            sqlx::query(sql).fetch(&self.pool),
            TransactionSession::from_row,
        )
        .await
    }

    async fn kill(&self, id: i64) -> Result<(), SniperError> {
        // KILL cannot be prepared; a bare &str goes over the text protocol.
        let statement = format!("KILL {id}");
        self.pool
            .execute(statement.as_str())
            .await
            .map_err(|source| SniperError::Termination { id, source })?;
        Ok(())
    }
}

/// Drain a row stream through `decode`. A stream error is a `Query` failure,
/// a decode error a `Scan` failure; either way nothing decoded so far is kept.
async fn collect_rows<S, R, T, F>(mut rows: S, decode: F) -> Result<Vec<T>, SniperError>
where
    S: TryStream<Ok = R, Error = sqlx::Error> + Unpin,
    F: Fn(&R) -> Result<T, sqlx::Error>,
{
    let mut out = Vec::new();

    while let Some(row) = rows.try_next().await.map_err(SniperError::Query)? {
        out.push(decode(&row).map_err(SniperError::Scan)?);
    }

    Ok(out)
}
