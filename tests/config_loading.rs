mod common;

use std::path::Path;
use std::time::Duration;

use common::fixtures::write_file;
use query_sniper::config::{Config, ConfigError};

const MAIN_CONFIG: &str = r#"
safe-mode: true
log:
  format: TEXT
  level: DEBUG
databases:
  primary:
    address: db1.internal:3306
    schema: orders
    interval: 30s
    long_query_limit: 1m
    long_transaction_limit: 5m
    dry_run: true
  replica:
    address: db2.internal
    port: 3307
    schema: orders
    interval: 1m
    long_query_limit: 2m
"#;

const CREDENTIALS: &str = r#"
databases:
  primary:
    username: sniper
    password: s3cret
  replica:
    username: sniper_ro
    password: s3cret-too
"#;

#[test]
fn it_loads_config_and_merges_credentials() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_file(&dir, "config.yaml", MAIN_CONFIG);
    let creds_path = write_file(&dir, "creds.yaml", CREDENTIALS);

    let config = Config::from_files(Some(&config_path), Some(&creds_path)).expect("load");

    assert!(config.safe_mode);
    assert_eq!(config.log.format, "TEXT");
    assert_eq!(config.log.level, "DEBUG");
    assert_eq!(config.databases.len(), 2);

    let primary = &config.databases["primary"];
    assert_eq!(primary.username, "sniper");
    assert_eq!(primary.password, "s3cret");
    assert_eq!(primary.interval, Duration::from_secs(30));
    assert_eq!(primary.long_query_limit, Duration::from_secs(60));
    assert_eq!(primary.long_transaction_limit, Duration::from_secs(300));
    assert!(primary.dry_run);

    let replica = &config.databases["replica"];
    assert_eq!(replica.port, Some(3307));
    assert_eq!(replica.long_transaction_limit, Duration::ZERO);
    assert!(!replica.dry_run);

    config.validate().expect("valid config");
}

#[test]
fn it_uses_credential_file_named_in_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds_path = write_file(&dir, "creds.yaml", CREDENTIALS);
    let main = format!(
        "credential_file: {}\n{}",
        creds_path.display(),
        MAIN_CONFIG
    );
    let config_path = write_file(&dir, "config.yaml", &main);

    let config = Config::from_files(Some(&config_path), None).expect("load");
    assert_eq!(config.databases["replica"].username, "sniper_ro");
}

#[test]
fn it_credentials_may_introduce_databases() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_file(&dir, "config.yaml", MAIN_CONFIG);
    let creds_path = write_file(
        &dir,
        "creds.yaml",
        "databases:\n  orphan:\n    username: u\n    password: p\n",
    );

    let config = Config::from_files(Some(&config_path), Some(&creds_path)).expect("load");
    assert!(config.databases.contains_key("orphan"));

    // databases are checked in name order and orphan has no address
    assert!(matches!(
        config.validate(),
        Err(ConfigError::EmptyAddress(name)) if name == "orphan"
    ));
}

#[test]
fn it_requires_a_credentials_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_file(&dir, "config.yaml", MAIN_CONFIG);

    assert!(matches!(
        Config::from_files(Some(&config_path), None),
        Err(ConfigError::NoCredentialsFile)
    ));
}

#[test]
fn it_reports_missing_credentials_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_file(&dir, "config.yaml", MAIN_CONFIG);
    let missing = dir.path().join("nope.yaml");

    assert!(matches!(
        Config::from_files(Some(&config_path), Some(&missing)),
        Err(ConfigError::Io { .. })
    ));
}

#[test]
fn it_missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let creds_path = write_file(&dir, "creds.yaml", CREDENTIALS);

    let err = Config::from_files(Some(Path::new("/definitely/not/here.yaml")), Some(&creds_path))
        .err()
        .expect("should fail");
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("/definitely/not/here.yaml"));
}

#[test]
fn it_rejects_malformed_yaml() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_file(&dir, "config.yaml", "databases: [unclosed");
    let creds_path = write_file(&dir, "creds.yaml", CREDENTIALS);

    assert!(matches!(
        Config::from_files(Some(&config_path), Some(&creds_path)),
        Err(ConfigError::Yaml { .. })
    ));
}

#[test]
fn it_rejects_unparseable_duration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_file(
        &dir,
        "config.yaml",
        "databases:\n  primary:\n    address: h:1\n    interval: soon\n",
    );
    let creds_path = write_file(&dir, "creds.yaml", CREDENTIALS);

    assert!(matches!(
        Config::from_files(Some(&config_path), Some(&creds_path)),
        Err(ConfigError::Yaml { .. })
    ));
}

#[test]
fn it_rejects_negative_transaction_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_file(
        &dir,
        "config.yaml",
        "databases:\n  primary:\n    address: h:1\n    long_transaction_limit: -5s\n",
    );
    let creds_path = write_file(&dir, "creds.yaml", CREDENTIALS);

    assert!(matches!(
        Config::from_files(Some(&config_path), Some(&creds_path)),
        Err(ConfigError::Yaml { .. })
    ));
}

#[test]
fn it_show_config_output_hides_passwords() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = write_file(&dir, "config.yaml", MAIN_CONFIG);
    let creds_path = write_file(&dir, "creds.yaml", CREDENTIALS);
    let config = Config::from_files(Some(&config_path), Some(&creds_path)).expect("load");

    let json = serde_json::to_string_pretty(&config.redacted()).expect("json");

    assert!(json.contains("[REDACTED]"));
    assert!(!json.contains("s3cret"));
    assert!(json.contains("\"interval\": \"30s\""));
    assert!(json.contains("\"safe-mode\": true"));
    // the original is untouched
    assert_eq!(config.databases["primary"].password, "s3cret");
}
