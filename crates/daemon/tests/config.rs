//! Config file parsing and precedence.

use std::path::PathBuf;
use std::time::Duration;

use padsync_daemon::{Backend, ConfigError, FileConfig, RemoteArgs};
use store::ObjectStoreConfig;

#[test]
fn test_full_config_file_parses() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
bucket = "team-pads"
prefix = "scratch-pads/shared"
backend = "s3"
endpoint = "http://localhost:9000"
region = "us-east-1"
allow_http = true
quiet_period_ms = 750
poll_interval_ms = 200
base = "/srv/mirror"
allow_missing_marker = true
"#,
    )
    .unwrap();

    let config = FileConfig::load(&path).unwrap();
    assert_eq!(config.bucket.as_deref(), Some("team-pads"));
    assert_eq!(config.backend, Some(Backend::S3));
    assert_eq!(config.quiet_period(None), Duration::from_millis(750));
    assert_eq!(config.poll_interval(None), Duration::from_millis(200));
    assert_eq!(config.base(None).unwrap(), PathBuf::from("/srv/mirror"));
    assert_eq!(config.allow_missing_marker, Some(true));

    let remote = RemoteArgs::default().resolve(&config).unwrap();
    assert_eq!(remote.keyspace.prefix().as_ref(), "scratch-pads/shared");
    assert_eq!(
        remote.storage,
        ObjectStoreConfig::S3 {
            bucket: "team-pads".to_string(),
            region: Some("us-east-1".to_string()),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key: None,
            secret_key: None,
            allow_http: true,
        }
    );
}

#[test]
fn test_empty_file_is_all_defaults() {
    let config = FileConfig::parse("").unwrap();
    assert_eq!(config, FileConfig::default());
}

#[test]
fn test_unknown_keys_are_rejected() {
    assert!(FileConfig::parse("buckett = \"typo\"").is_err());
}

#[test]
fn test_backend_names_are_lowercase() {
    let config = FileConfig::parse("backend = \"local\"\nstore_root = \"/data\"").unwrap();
    assert_eq!(config.backend, Some(Backend::Local));
    assert!(FileConfig::parse("backend = \"Local\"").is_err());

    let remote = RemoteArgs::default().resolve(&config).unwrap();
    assert_eq!(
        remote.storage,
        ObjectStoreConfig::Local {
            path: PathBuf::from("/data")
        }
    );
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = FileConfig::discover(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_malformed_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "quiet_period_ms = \"soon\"").unwrap();

    let err = FileConfig::load(&path).unwrap_err();
    match err {
        ConfigError::Parse { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}
