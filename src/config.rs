use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, SkywatchError};
use crate::matchers::{default_military_prefixes, default_squawk_meanings};

/// Top-level `skywatch.toml` structure. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkywatchConfig {
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
    pub weather: WeatherConfig,
    pub reference: ReferenceConfig,
    pub schedule: ScheduleConfig,
    pub archive: ArchiveConfig,
    pub cooldowns: CooldownConfig,
    pub alerts: AlertsConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db/aircraft_history.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "http://adsbexchange.local/tar1090/data/aircraft.json".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Weather sampling is disabled while this is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openweathermap.org".to_string(),
            latitude: 40.121026,
            longitude: -82.949669,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// plane-alert-db CSVs, later files override earlier ones
    pub files: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchlist: Option<PathBuf>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            files: vec![
                PathBuf::from("reference/plane-alert-db-images.csv"),
                PathBuf::from("reference/plane-alert-pia.csv"),
            ],
            watchlist: Some(PathBuf::from("reference/watchlist.txt")),
        }
    }
}

/// Upper bound for every interval and cooldown window (ten years)
pub const MAX_INTERVAL_SECS: u64 = 10 * 365 * 86_400;
/// Upper bound for `archive.max_age_days`
pub const MAX_ARCHIVE_AGE_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub tick_secs: u64,
    pub weather_interval_secs: u64,
    pub sweep_interval_secs: u64,
    /// Wait after a failed sweep before trying again
    pub sweep_retry_secs: u64,
    pub health_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            weather_interval_secs: 300,
            sweep_interval_secs: 86_400,
            sweep_retry_secs: 3_600,
            health_interval_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub max_age_days: i64,
    pub batch_size: i64,
    /// Backups land next to the database file when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            batch_size: 1_000,
            backup_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub squawk_secs: i64,
    pub watchlist_secs: i64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            squawk_secs: 3_600,
            watchlist_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Squawk code → meaning. Replaces the built-in table when present.
    pub squawk_codes: BTreeMap<String, String>,
    pub military_prefixes: Vec<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            squawk_codes: default_squawk_meanings(),
            military_prefixes: default_military_prefixes(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_recipient: Option<String>,
    /// Falls back to `alert_recipient` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_recipient: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base name of the daily log file; `skywatch.log` is written as
    /// `skywatch.<YYYY-MM-DD>.log`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Rotated log files kept on disk
    pub keep_files: usize,
    /// Log lines quoted in the termination notice
    pub tail_lines: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from("skywatch.log")),
            keep_files: 30,
            tail_lines: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus `/metrics` listener; disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub timezone: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
        }
    }
}

impl SkywatchConfig {
    /// Load config from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))
            .map_err(|e| SkywatchError::config("load config", e))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse {:?}", path))
            .map_err(|e| SkywatchError::config("load config", e))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlay environment variables on top of file values
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("SKYWATCH_FEED_URL") {
            self.feed.url = url;
        }
        if let Some(key) = lookup("OPENWEATHER_API_KEY") {
            self.weather.api_key = Some(key);
        }
        if let Some(to) = lookup("ALERT_EMAIL_TO") {
            self.notify.alert_recipient = Some(to);
        }
        if let Some(to) = lookup("HEALTH_EMAIL_TO") {
            self.notify.health_recipient = Some(to);
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let fault = |msg: String| SkywatchError::config("validate config", anyhow!(msg));

        let intervals = [
            ("schedule.tick_secs", self.schedule.tick_secs),
            ("schedule.weather_interval_secs", self.schedule.weather_interval_secs),
            ("schedule.sweep_interval_secs", self.schedule.sweep_interval_secs),
            ("schedule.sweep_retry_secs", self.schedule.sweep_retry_secs),
            ("schedule.health_interval_secs", self.schedule.health_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 || value > MAX_INTERVAL_SECS {
                return Err(fault(format!(
                    "{name} must be between 1 and {MAX_INTERVAL_SECS}, got {value}"
                )));
            }
        }
        if self.archive.batch_size <= 0 {
            return Err(fault("archive.batch_size must be greater than zero".into()));
        }
        if !(0..=MAX_ARCHIVE_AGE_DAYS).contains(&self.archive.max_age_days) {
            return Err(fault(format!(
                "archive.max_age_days must be between 0 and {MAX_ARCHIVE_AGE_DAYS}"
            )));
        }
        let windows = [
            ("cooldowns.squawk_secs", self.cooldowns.squawk_secs),
            ("cooldowns.watchlist_secs", self.cooldowns.watchlist_secs),
        ];
        for (name, value) in windows {
            if !(0..=MAX_INTERVAL_SECS as i64).contains(&value) {
                return Err(fault(format!(
                    "{name} must be between 0 and {MAX_INTERVAL_SECS}, got {value}"
                )));
            }
        }
        if self.logging.keep_files == 0 {
            return Err(fault("logging.keep_files must be greater than zero".into()));
        }
        if let Some(code) = self
            .alerts
            .squawk_codes
            .keys()
            .find(|code| code.len() != 4 || !code.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(fault(format!("squawk code {code:?} is not four digits")));
        }
        self.display_timezone()?;
        Ok(())
    }

    pub fn display_timezone(&self) -> Result<chrono_tz::Tz> {
        self.display.timezone.parse::<chrono_tz::Tz>().map_err(|e| {
            SkywatchError::config(
                "parse display.timezone",
                anyhow!("unknown timezone {}: {}", self.display.timezone, e),
            )
        })
    }

    pub fn health_recipient(&self) -> Option<&str> {
        self.notify
            .health_recipient
            .as_deref()
            .or(self.notify.alert_recipient.as_deref())
    }
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` flag
/// 2. `SKYWATCH_CONFIG` env var
/// 3. `/etc/skywatch/skywatch.toml` (production)
/// 4. `./skywatch.toml` (development)
pub fn config_path(flag: Option<&Path>) -> PathBuf {
    resolve_config_path(flag, |key| std::env::var(key).ok())
}

pub fn resolve_config_path(flag: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Some(path) = lookup("SKYWATCH_CONFIG") {
        return PathBuf::from(path);
    }
    match lookup("SKYWATCH_ENV").as_deref() {
        Some("production") => PathBuf::from("/etc/skywatch/skywatch.toml"),
        _ => PathBuf::from("./skywatch.toml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SkywatchConfig::default();
        assert_eq!(config.schedule.tick_secs, 30);
        assert_eq!(config.schedule.weather_interval_secs, 300);
        assert_eq!(config.schedule.sweep_interval_secs, 86_400);
        assert_eq!(config.schedule.sweep_retry_secs, 3_600);
        assert_eq!(config.schedule.health_interval_secs, 3_600);
        assert_eq!(config.logging.keep_files, 30);
        assert_eq!(config.archive.max_age_days, 30);
        assert_eq!(config.archive.batch_size, 1_000);
        assert_eq!(config.cooldowns.squawk_secs, 3_600);
        assert_eq!(config.alerts.squawk_codes.get("7700").unwrap(), "Emergency");
        assert_eq!(config.alerts.military_prefixes.len(), 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = SkywatchConfig::parse(
            r#"
[schedule]
health_interval_secs = 10800

[alerts]
military_prefixes = ["RCH"]

[notify]
alert_recipient = "5551234567@vtext.com"
"#,
        )
        .unwrap();

        assert_eq!(config.schedule.health_interval_secs, 10_800);
        assert_eq!(config.schedule.tick_secs, 30);
        assert_eq!(config.alerts.military_prefixes, vec!["RCH".to_string()]);
        assert_eq!(config.alerts.squawk_codes.len(), 10);
        assert_eq!(config.health_recipient(), Some("5551234567@vtext.com"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = SkywatchConfig::default();
        config.metrics.port = Some(9464);
        config.weather.api_key = Some("abc".into());

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = SkywatchConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_file_yields_defaults_and_bad_file_is_fault() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SkywatchConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing, SkywatchConfig::default());

        let bad = dir.path().join("skywatch.toml");
        std::fs::write(&bad, "[schedule\ntick_secs = ").unwrap();
        let err = SkywatchConfig::load(&bad).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = SkywatchConfig::default();
        config.notify.health_recipient = Some("file@example.org".into());
        config.apply_overrides(lookup(&[
            ("DATABASE_PATH", "/var/lib/skywatch/history.db"),
            ("OPENWEATHER_API_KEY", "key123"),
            ("HEALTH_EMAIL_TO", "ops@example.org"),
        ]));

        assert_eq!(config.database.path, PathBuf::from("/var/lib/skywatch/history.db"));
        assert_eq!(config.weather.api_key.as_deref(), Some("key123"));
        assert_eq!(config.health_recipient(), Some("ops@example.org"));
        assert_eq!(config.notify.alert_recipient, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SkywatchConfig::default();
        config.schedule.tick_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SkywatchConfig::default();
        config.alerts.squawk_codes.insert("77".into(), "short".into());
        assert!(config.validate().is_err());

        let mut config = SkywatchConfig::default();
        config.display.timezone = "Mars/Olympus_Mons".into();
        assert_eq!(config.validate().unwrap_err().kind(), "config");
    }

    #[test]
    fn test_validate_bounds_durations() {
        let mut config = SkywatchConfig::default();
        config.schedule.sweep_interval_secs = u64::MAX;
        assert_eq!(config.validate().unwrap_err().kind(), "config");

        let mut config = SkywatchConfig::default();
        config.cooldowns.watchlist_secs = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = SkywatchConfig::default();
        config.archive.max_age_days = 999_999_999_999;
        assert!(config.validate().is_err());

        let mut config = SkywatchConfig::default();
        config.logging.keep_files = 0;
        assert!(config.validate().is_err());

        let mut config = SkywatchConfig::default();
        config.schedule.health_interval_secs = MAX_INTERVAL_SECS;
        config.archive.max_age_days = MAX_ARCHIVE_AGE_DAYS;
        config.validate().unwrap();
    }

    #[test]
    fn test_config_path_priority() {
        let flag = PathBuf::from("/tmp/flag.toml");
        assert_eq!(
            resolve_config_path(Some(&flag), lookup(&[("SKYWATCH_CONFIG", "/tmp/env.toml")])),
            flag
        );
        assert_eq!(
            resolve_config_path(None, lookup(&[("SKYWATCH_CONFIG", "/tmp/env.toml")])),
            PathBuf::from("/tmp/env.toml")
        );
        assert_eq!(
            resolve_config_path(None, lookup(&[("SKYWATCH_ENV", "production")])),
            PathBuf::from("/etc/skywatch/skywatch.toml")
        );
        assert_eq!(
            resolve_config_path(None, lookup(&[])),
            PathBuf::from("./skywatch.toml")
        );
    }
}
