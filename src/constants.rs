/// Config files tried, in order, when `SNIPER_CONFIG_FILE` is unset
pub const DEFAULT_CONFIG_SEARCH_PATHS: &[&str] = &["config.yaml", "configs/config.yaml"];

/// Placeholder written over secrets in debug output and `--show-config`
pub const REDACTED: &str = "[REDACTED]";

/// MySQL port used when neither the address nor the `port` field names one
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Pool size per monitored database; one connection scans, one kills
pub const MAX_POOL_CONNECTIONS: u32 = 2;

/// Metric name for the terminated-session counter
pub const SESSIONS_KILLED_METRIC: &str = "query_sniper.queries_killed_total";
