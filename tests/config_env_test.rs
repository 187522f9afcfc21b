use serial_test::serial;
use std::path::{Path, PathBuf};

use skywatch::config::{SkywatchConfig, config_path};
use skywatch::notifier::subject_prefix;

const VARS: &[&str] = &[
    "SKYWATCH_CONFIG",
    "SKYWATCH_ENV",
    "DATABASE_PATH",
    "ALERT_EMAIL_TO",
    "HEALTH_EMAIL_TO",
    "OPENWEATHER_API_KEY",
    "SKYWATCH_FEED_URL",
];

fn clear_env() {
    for var in VARS {
        // SAFETY: every test touching the environment is #[serial]
        unsafe { std::env::remove_var(var) };
    }
}

fn set_env(key: &str, value: &str) {
    // SAFETY: every test touching the environment is #[serial]
    unsafe { std::env::set_var(key, value) };
}

#[test]
#[serial]
fn test_config_path_precedence() {
    clear_env();
    assert_eq!(config_path(None), PathBuf::from("./skywatch.toml"));

    set_env("SKYWATCH_ENV", "production");
    assert_eq!(config_path(None), PathBuf::from("/etc/skywatch/skywatch.toml"));

    set_env("SKYWATCH_CONFIG", "/srv/skywatch/custom.toml");
    assert_eq!(config_path(None), PathBuf::from("/srv/skywatch/custom.toml"));

    assert_eq!(
        config_path(Some(Path::new("cli.toml"))),
        PathBuf::from("cli.toml")
    );
    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let mut config = SkywatchConfig::parse(
        r#"
        [database]
        path = "from-file.db"

        [notify]
        alert_recipient = "file@example.com"
        "#,
    )
    .unwrap();

    set_env("DATABASE_PATH", "/var/lib/skywatch/history.db");
    set_env("ALERT_EMAIL_TO", "6145550100@sms.example.com");
    set_env("OPENWEATHER_API_KEY", "   ");
    config.apply_env();
    clear_env();

    assert_eq!(
        config.database.path,
        PathBuf::from("/var/lib/skywatch/history.db")
    );
    assert_eq!(
        config.notify.alert_recipient.as_deref(),
        Some("6145550100@sms.example.com")
    );
    // Blank values do not override
    assert_eq!(config.weather.api_key, None);
    assert_eq!(config.health_recipient(), Some("6145550100@sms.example.com"));
}

#[test]
#[serial]
fn test_staging_subject_prefix() {
    clear_env();
    assert_eq!(subject_prefix(), "");

    set_env("SKYWATCH_ENV", "staging");
    assert_eq!(subject_prefix(), "[STAGING] ");
    clear_env();
}

#[test]
#[serial]
fn test_missing_config_file_yields_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = SkywatchConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, SkywatchConfig::default());

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "[schedule\ntick_secs = ").unwrap();
    let err = SkywatchConfig::load(&broken).unwrap_err();
    assert_eq!(err.kind(), "config");
}
