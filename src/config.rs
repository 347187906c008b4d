use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_CONFIG_SEARCH_PATHS, REDACTED};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no credentials file specified")]
    NoCredentialsFile,
    #[error("no databases have been configured")]
    NoDatabases,
    #[error("username is missing for database {0}")]
    EmptyUsername(String),
    #[error("password is missing for database {0}")]
    EmptyPassword(String),
    #[error("address is missing for database {0}")]
    EmptyAddress(String),
    #[error("address {address} must contain a port for database {name}")]
    InvalidAddressFormat { name: String, address: String },
    #[error("schema is missing for database {0}")]
    EmptySchema(String),
    #[error("interval {interval:?} is invalid for database {name}")]
    InvalidInterval { name: String, interval: Duration },
    #[error("long_query_limit {limit:?} is invalid for database {name}")]
    InvalidQueryLimit { name: String, limit: Duration },
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,
    #[serde(default)]
    pub credential_file: String,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default, rename = "safe-mode", alias = "safe_mode")]
    pub safe_mode: bool,
}

/// Settings for one monitored database, keyed by name in [`Config::databases`].
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub address: String,
    /// Only consulted when `address` carries no port of its own.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl_ca: String,
    #[serde(default)]
    pub ssl_cert: String,
    #[serde(default)]
    pub ssl_key: String,
    #[serde(default, with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default, with = "humantime_serde")]
    pub long_query_limit: Duration,
    #[serde(default, with = "humantime_serde")]
    pub long_transaction_limit: Duration,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub include_caller: bool,
    #[serde(default)]
    pub enable_file_logs: bool,
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: default_log_level(),
            include_caller: false,
            enable_file_logs: false,
            dir: default_log_dir(),
        }
    }
}

fn default_log_format() -> String {
    "JSON".to_string()
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

/// Shape of the credentials file; merged over the main config per database.
#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    databases: BTreeMap<String, Credentials>,
}

#[derive(Default, Deserialize)]
struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("databases", &self.databases)
            .field("credential_file", &self.credential_file)
            .field("log", &self.log)
            .field("safe_mode", &self.safe_mode)
            .finish()
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("schema", &self.schema)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("ssl_ca", &self.ssl_ca)
            .field("ssl_cert", &self.ssl_cert)
            .field("ssl_key", &self.ssl_key)
            .field("interval", &self.interval)
            .field("long_query_limit", &self.long_query_limit)
            .field("long_transaction_limit", &self.long_transaction_limit)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Config {
    /// Load the main config and credentials files named by the environment,
    /// then apply environment overrides. Validation is left to the caller.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = env_path("SNIPER_CONFIG_FILE");
        let creds_path = env_path("SNIPER_CREDS_FILE");

        let mut config = Self::from_files(config_path.as_deref(), creds_path.as_deref())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// An explicitly named config file must exist; without one the default
    /// search paths are tried and a miss yields an empty config.
    pub fn from_files(
        config_path: Option<&Path>,
        creds_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_yaml_file(path)?,
            None => match DEFAULT_CONFIG_SEARCH_PATHS
                .iter()
                .map(Path::new)
                .find(|p| p.is_file())
            {
                Some(path) => Self::from_yaml_file(path)?,
                None => {
                    tracing::debug!("No config file found in default locations");
                    Self::default()
                }
            },
        };

        let creds_path = match creds_path {
            Some(path) => path.to_path_buf(),
            None if !config.credential_file.is_empty() => PathBuf::from(&config.credential_file),
            None => return Err(ConfigError::NoCredentialsFile),
        };

        let raw = read_file(&creds_path)?;
        let creds: CredentialsFile = serde_yaml::from_str(&raw).map_err(|source| {
            ConfigError::Yaml {
                path: creds_path.clone(),
                source,
            }
        })?;
        config.merge_credentials(creds);

        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = read_file(path)?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn merge_credentials(&mut self, creds: CredentialsFile) {
        for (name, entry) in creds.databases {
            let db = self.databases.entry(name).or_default();
            if let Some(username) = entry.username {
                db.username = username;
            }
            if let Some(password) = entry.password {
                db.password = password;
            }
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.safe_mode = env_or_bool("SNIPER_SAFE_MODE", self.safe_mode);
        self.log.level = env_or("SNIPER_LOG_LEVEL", &self.log.level);
        self.log.format = env_or("SNIPER_LOG_FORMAT", &self.log.format);
        self.log.include_caller = env_or_bool("SNIPER_LOG_INCLUDE_CALLER", self.log.include_caller);
        self.log.enable_file_logs =
            env_or_bool("SNIPER_ENABLE_FILE_LOGS", self.log.enable_file_logs);
        self.log.dir = env_or("SNIPER_LOG_DIR", &self.log.dir);
    }

    /// Checks every database in name order and reports the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.databases.is_empty() {
            return Err(ConfigError::NoDatabases);
        }

        for (name, db) in &self.databases {
            db.validate(name)?;
        }

        Ok(())
    }

    /// Copy with every password replaced, for `--show-config`.
    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        for db in redacted.databases.values_mut() {
            db.password = REDACTED.to_string();
        }
        redacted
    }
}

impl DatabaseConfig {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.username.is_empty() {
            return Err(ConfigError::EmptyUsername(name.to_string()));
        }
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword(name.to_string()));
        }
        if self.address.is_empty() {
            return Err(ConfigError::EmptyAddress(name.to_string()));
        }
        if !self.address.contains(':') && self.port.is_none() {
            return Err(ConfigError::InvalidAddressFormat {
                name: name.to_string(),
                address: self.address.clone(),
            });
        }
        if self.schema.is_empty() {
            return Err(ConfigError::EmptySchema(name.to_string()));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidInterval {
                name: name.to_string(),
                interval: self.interval,
            });
        }
        if self.long_query_limit.is_zero() {
            return Err(ConfigError::InvalidQueryLimit {
                name: name.to_string(),
                limit: self.long_query_limit,
            });
        }
        // long_transaction_limit is unsigned, so any value including zero is accepted.
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
