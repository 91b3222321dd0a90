//! Application configuration structures.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::collector::Domain;
use crate::eventlog::{
    DEFAULT_LOOKBACK, DEFAULT_MAX_INTERVAL, DEFAULT_SLOW_SCAN_THRESHOLD, EventKind, MAX_LOOKBACK,
};
use crate::scheduler::{
    DEFAULT_AGGREGATION_COUNT, DEFAULT_INVENTORY_INTERVAL, DEFAULT_SAMPLING_INTERVAL, clamp_interval,
};
use crate::sink::{DEFAULT_SINK_TIMEOUT, InfluxConfig, StaticTags, TlsMode};

use super::validation::{ConfigError, expand_env_vars, nonzero_or};

// =============================================================================
// Constants
// =============================================================================

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "configs/hostwatch.yaml";

/// Default checkpoint database path.
pub const DEFAULT_DB_PATH: &str = "hostwatch.db";

/// Default event-log scan interval (24 hours).
pub const DEFAULT_EVENT_LOG_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound for the aggregation count.
pub const MAX_AGGREGATION_COUNT: usize = 1000;

// =============================================================================
// Sampling Configuration
// =============================================================================

/// Metric sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Enabled collectors by domain name.
    pub collectors: Vec<String>,

    /// Sampling interval (default: 3s, minimum: 1s).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Samples per aggregation window (default: 10, range 1..=1000).
    pub aggregation_count: usize,

    /// Volume sampled by the disk collector (default: system volume).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_mount: Option<PathBuf>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            collectors: Domain::SAMPLED.iter().map(|d| d.to_string()).collect(),
            interval: DEFAULT_SAMPLING_INTERVAL,
            aggregation_count: DEFAULT_AGGREGATION_COUNT,
            disk_mount: None,
        }
    }
}

impl SamplingConfig {
    /// Enabled sampled domains. Unknown names are ignored.
    pub fn domains(&self) -> BTreeSet<Domain> {
        self.collectors
            .iter()
            .filter_map(|name| Domain::from_str(name.trim()).ok())
            .filter(|d| Domain::SAMPLED.contains(d))
            .collect()
    }

    fn sanitize(&mut self) {
        self.collectors.retain(|name| {
            let known = Domain::from_str(name.trim())
                .is_ok_and(|d| Domain::SAMPLED.contains(&d));
            if !known {
                tracing::warn!(collector = %name, "Unknown collector in config, ignoring");
            }
            known
        });

        self.interval = clamp_interval(nonzero_or(
            "sampling.interval",
            self.interval,
            DEFAULT_SAMPLING_INTERVAL,
        ));

        if self.aggregation_count == 0 {
            tracing::warn!(
                default = DEFAULT_AGGREGATION_COUNT,
                "sampling.aggregation_count is zero, using default"
            );
            self.aggregation_count = DEFAULT_AGGREGATION_COUNT;
        } else if self.aggregation_count > MAX_AGGREGATION_COUNT {
            tracing::warn!(
                value = self.aggregation_count,
                max = MAX_AGGREGATION_COUNT,
                "sampling.aggregation_count too large, clamping"
            );
            self.aggregation_count = MAX_AGGREGATION_COUNT;
        }
    }
}

// =============================================================================
// Event Log Configuration
// =============================================================================

/// Event-log scanning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Whether the event-log trigger runs (Windows only).
    pub enabled: bool,

    /// Base scan interval (default: 24h).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// History read for kinds without a checkpoint (default: 24h).
    #[serde(with = "humantime_serde")]
    pub lookback: Duration,

    /// Scan duration above which the interval doubles (default: 10s).
    #[serde(with = "humantime_serde")]
    pub slow_scan_threshold: Duration,

    /// Cap for the adaptive interval (default: 24h).
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,

    /// Halve the interval again after fast scans (default: true).
    pub decay: bool,

    /// Monitored event kinds.
    pub kinds: Vec<String>,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_EVENT_LOG_INTERVAL,
            lookback: DEFAULT_LOOKBACK,
            slow_scan_threshold: DEFAULT_SLOW_SCAN_THRESHOLD,
            max_interval: DEFAULT_MAX_INTERVAL,
            decay: true,
            kinds: EventKind::ALL.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl EventLogConfig {
    /// Monitored kinds. Unknown names are ignored.
    pub fn kinds(&self) -> BTreeSet<EventKind> {
        self.kinds
            .iter()
            .filter_map(|name| EventKind::from_str(name.trim()).ok())
            .collect()
    }

    fn sanitize(&mut self) {
        self.kinds.retain(|name| {
            let known = EventKind::from_str(name.trim()).is_ok();
            if !known {
                tracing::warn!(kind = %name, "Unknown event kind in config, ignoring");
            }
            known
        });

        self.interval = clamp_interval(nonzero_or(
            "event_log.interval",
            self.interval,
            DEFAULT_EVENT_LOG_INTERVAL,
        ));
        self.lookback = nonzero_or("event_log.lookback", self.lookback, DEFAULT_LOOKBACK);
        if self.lookback > MAX_LOOKBACK {
            tracing::warn!(
                lookback = ?self.lookback,
                max = ?MAX_LOOKBACK,
                "event_log.lookback too long, capping"
            );
            self.lookback = MAX_LOOKBACK;
        }
        self.slow_scan_threshold = nonzero_or(
            "event_log.slow_scan_threshold",
            self.slow_scan_threshold,
            DEFAULT_SLOW_SCAN_THRESHOLD,
        );
        self.max_interval = nonzero_or(
            "event_log.max_interval",
            self.max_interval,
            DEFAULT_MAX_INTERVAL,
        );
        if self.max_interval < self.interval {
            tracing::warn!(
                interval = ?self.interval,
                max_interval = ?self.max_interval,
                "event_log.max_interval below interval, raising it"
            );
            self.max_interval = self.interval;
        }
    }
}

// =============================================================================
// Inventory / Database Configuration
// =============================================================================

/// Inventory refresh settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Refresh interval and cache lifetime (default: 24h).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INVENTORY_INTERVAL,
        }
    }
}

/// Checkpoint database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

// =============================================================================
// Overrides
// =============================================================================

/// Values supplied on the command line or environment; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Enabled collector set.
    pub collectors: Option<Vec<String>>,
    /// Sampling interval.
    pub interval: Option<Duration>,
    /// Aggregation count.
    pub aggregation_count: Option<usize>,
    /// Checkpoint database path.
    pub db_path: Option<PathBuf>,
    /// Sink token.
    pub sink_token: Option<String>,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Static tags added to every point.
    pub host_tags: StaticTags,

    /// Metric sampling.
    pub sampling: SamplingConfig,

    /// Event-log scanning.
    pub event_log: EventLogConfig,

    /// Inventory refresh.
    pub inventory: InventoryConfig,

    /// Checkpoint database.
    pub database: DatabaseConfig,

    /// Time-series sink.
    pub sink: InfluxConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// Sections that fail to deserialize are replaced by their defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or is not YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Like [`load`](Self::load), but any failure yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Configuration loaded");
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Config unavailable, using defaults");
                Self::default()
            }
        }
    }

    /// Parse configuration from YAML text, section by section.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let root: serde_yaml::Value = serde_yaml::from_str(content)?;
        let root = match root {
            serde_yaml::Value::Mapping(map) => map,
            serde_yaml::Value::Null => return Ok(Self::default()),
            _ => {
                return Err(ConfigError::ValidationError(
                    "top level must be a mapping".to_string(),
                ));
            }
        };

        Ok(Self {
            host_tags: section(&root, "host_tags"),
            sampling: section(&root, "sampling"),
            event_log: section(&root, "event_log"),
            inventory: section(&root, "inventory"),
            database: section(&root, "database"),
            sink: section(&root, "sink"),
        })
    }

    /// Apply overrides, repair invalid values and check credentials.
    ///
    /// # Errors
    /// `MissingCredential` when no sink token is configured, `ValidationError`
    /// when the sink URL is unusable.
    pub fn finalize(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        self.apply_overrides(overrides);
        self.sanitize();
        self.validate()?;
        Ok(self)
    }

    /// Apply command-line and environment overrides.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(collectors) = overrides.collectors {
            self.sampling.collectors = collectors;
        }
        if let Some(interval) = overrides.interval {
            self.sampling.interval = interval;
        }
        if let Some(count) = overrides.aggregation_count {
            self.sampling.aggregation_count = count;
        }
        if let Some(path) = overrides.db_path {
            self.database.path = path;
        }
        if let Some(token) = overrides.sink_token {
            self.sink.token = token;
        }
    }

    /// Replace invalid values with documented defaults, logging each repair.
    pub fn sanitize(&mut self) {
        self.host_tags.retain(|key, value| {
            let keep = !key.trim().is_empty() && !value.trim().is_empty();
            if !keep {
                tracing::warn!(tag = %key, "Empty host tag in config, ignoring");
            }
            keep
        });

        self.sampling.sanitize();
        self.event_log.sanitize();
        self.inventory.interval = clamp_interval(nonzero_or(
            "inventory.interval",
            self.inventory.interval,
            DEFAULT_INVENTORY_INTERVAL,
        ));

        if self.database.path.as_os_str().is_empty() {
            tracing::warn!(default = DEFAULT_DB_PATH, "database.path is empty, using default");
            self.database.path = PathBuf::from(DEFAULT_DB_PATH);
        }

        self.sink.token = expand_env_vars(self.sink.token.trim());
        self.sink.timeout = nonzero_or("sink.timeout", self.sink.timeout, DEFAULT_SINK_TIMEOUT);
        if self.sink.tls.mode == TlsMode::Pinned && self.sink.tls.ca_cert.is_none() {
            tracing::warn!("sink.tls.mode is pinned without ca_cert, using strict verification");
            self.sink.tls.mode = TlsMode::Strict;
        }
    }

    /// Fatal checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sink.token.trim().is_empty() {
            return Err(ConfigError::MissingCredential("sink.token"));
        }
        self.sink
            .write_url()
            .map_err(|e| ConfigError::ValidationError(format!("sink.url: {e}")))?;
        Ok(())
    }
}

fn section<T: DeserializeOwned + Default>(root: &serde_yaml::Mapping, key: &str) -> T {
    match root.get(key) {
        None | Some(serde_yaml::Value::Null) => T::default(),
        Some(value) => serde_yaml::from_value(value.clone()).unwrap_or_else(|e| {
            tracing::warn!(section = key, error = %e, "Invalid config section, using defaults");
            T::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TlsConfig;

    const FULL: &str = r#"
host_tags:
  site: lab
sampling:
  collectors: [memory, processor]
  interval: 5s
  aggregation_count: 12
  disk_mount: /data
event_log:
  enabled: false
  interval: 12h
  lookback: 48h
  decay: false
  kinds: [application_error, unexpected_shutdown]
inventory:
  interval: 6h
database:
  path: /var/lib/hostwatch/state.db
sink:
  url: https://influx.example:8086
  org: ops
  bucket: telemetry
  token: abc123
  timeout: 15s
  tls:
    mode: pinned
    ca_cert: /etc/hostwatch/ca.pem
"#;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.sampling.interval, Duration::from_secs(3));
        assert_eq!(config.sampling.aggregation_count, DEFAULT_AGGREGATION_COUNT);
        assert_eq!(config.sampling.domains().len(), 4);
        assert_eq!(config.event_log.interval, Duration::from_secs(86400));
        assert_eq!(config.event_log.lookback, Duration::from_secs(86400));
        assert_eq!(config.event_log.kinds().len(), 4);
        assert!(config.event_log.decay);
        assert_eq!(config.inventory.interval, Duration::from_secs(86400));
        assert_eq!(config.database.path, PathBuf::from("hostwatch.db"));
        assert_eq!(config.sink.tls.mode, TlsMode::Strict);
    }

    #[test]
    fn test_full_file() {
        let config = AppConfig::from_yaml_str(FULL).unwrap();
        assert_eq!(config.host_tags["site"], "lab");
        assert_eq!(
            config.sampling.domains(),
            [Domain::Memory, Domain::Processor].into_iter().collect()
        );
        assert_eq!(config.sampling.interval, Duration::from_secs(5));
        assert_eq!(config.sampling.aggregation_count, 12);
        assert_eq!(config.sampling.disk_mount, Some(PathBuf::from("/data")));
        assert!(!config.event_log.enabled);
        assert_eq!(config.event_log.lookback, Duration::from_secs(48 * 3600));
        assert!(!config.event_log.decay);
        assert_eq!(
            config.event_log.kinds(),
            [EventKind::ApplicationError, EventKind::UnexpectedShutdown]
                .into_iter()
                .collect()
        );
        assert_eq!(config.event_log.slow_scan_threshold, DEFAULT_SLOW_SCAN_THRESHOLD);
        assert_eq!(config.inventory.interval, Duration::from_secs(6 * 3600));
        assert_eq!(config.sink.org, "ops");
        assert_eq!(config.sink.timeout, Duration::from_secs(15));
        assert_eq!(
            config.sink.tls,
            TlsConfig {
                mode: TlsMode::Pinned,
                ca_cert: Some(PathBuf::from("/etc/hostwatch/ca.pem")),
            }
        );
        assert!(config.finalize(Overrides::default()).is_ok());
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let config = AppConfig::from_yaml_str("sink:\n  url: http://localhost:8086\n").unwrap();
        let err = config.finalize(Overrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("sink.token")));
    }

    #[test]
    fn test_unset_env_token_is_fatal() {
        let yaml = "sink:\n  token: ${HOSTWATCH_TEST_UNSET_TOKEN_4711}\n";
        let err = AppConfig::from_yaml_str(yaml)
            .unwrap()
            .finalize(Overrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential(_)));
    }

    #[test]
    fn test_token_override_wins() {
        let config = AppConfig::from_yaml_str("sink:\n  token: from-file\n")
            .unwrap()
            .finalize(Overrides {
                sink_token: Some("from-env".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.sink.token, "from-env");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let yaml = r#"
sampling:
  collectors: [memory, gpu]
  interval: 0s
  aggregation_count: 5000
event_log:
  interval: 1h
  max_interval: 10m
  kinds: [application_error, blue_screen]
inventory:
  interval: 0s
sink:
  token: t
  timeout: 0s
  tls:
    mode: pinned
"#;
        let config = AppConfig::from_yaml_str(yaml)
            .unwrap()
            .finalize(Overrides::default())
            .unwrap();
        assert_eq!(config.sampling.collectors, vec!["memory".to_string()]);
        assert_eq!(config.sampling.interval, DEFAULT_SAMPLING_INTERVAL);
        assert_eq!(config.sampling.aggregation_count, MAX_AGGREGATION_COUNT);
        assert_eq!(config.event_log.max_interval, Duration::from_secs(3600));
        assert_eq!(config.event_log.kinds, vec!["application_error".to_string()]);
        assert_eq!(config.inventory.interval, DEFAULT_INVENTORY_INTERVAL);
        assert_eq!(config.sink.timeout, DEFAULT_SINK_TIMEOUT);
        assert_eq!(config.sink.tls.mode, TlsMode::Strict);
    }

    #[test]
    fn test_zero_aggregation_count_uses_default() {
        let config = AppConfig::default()
            .finalize(Overrides {
                aggregation_count: Some(0),
                sink_token: Some("t".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.sampling.aggregation_count, DEFAULT_AGGREGATION_COUNT);
    }

    #[test]
    fn test_broken_section_falls_back_alone() {
        let yaml = r#"
sampling:
  interval: [not, a, duration]
sink:
  token: t
  org: ops
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.sampling, SamplingConfig::default());
        assert_eq!(config.sink.org, "ops");
    }

    #[test]
    fn test_sub_second_interval_clamped() {
        let config = AppConfig::default()
            .finalize(Overrides {
                interval: Some(Duration::from_millis(200)),
                sink_token: Some("t".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.sampling.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::default()
            .finalize(Overrides {
                collectors: Some(vec!["disk".into()]),
                aggregation_count: Some(7),
                db_path: Some("/tmp/x.db".into()),
                sink_token: Some("t".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.sampling.domains(), [Domain::Disk].into_iter().collect());
        assert_eq!(config.sampling.aggregation_count, 7);
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_bad_sink_url_is_fatal() {
        let yaml = "sink:\n  url: not a url\n  token: t\n";
        let err = AppConfig::from_yaml_str(yaml)
            .unwrap()
            .finalize(Overrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::IoError(_))));
        assert_eq!(AppConfig::load_or_default(&path), AppConfig::default());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostwatch.yaml");
        std::fs::write(&path, FULL).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.sampling.aggregation_count, 12);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(AppConfig::from_yaml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_non_mapping_rejected() {
        assert!(matches!(
            AppConfig::from_yaml_str("- a\n- b\n"),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_oversized_lookback_is_capped() {
        let yaml = "event_log:\n  lookback: 1000000years\nsink:\n  token: t\n";
        let config = AppConfig::from_yaml_str(yaml)
            .unwrap()
            .finalize(Overrides::default())
            .unwrap();
        assert_eq!(config.event_log.lookback, MAX_LOOKBACK);
    }

    #[test]
    fn test_shipped_sample_config_parses() {
        let sample = include_str!("../../configs/hostwatch.yaml");
        let config = AppConfig::from_yaml_str(sample).unwrap();
        assert_eq!(config.sampling.aggregation_count, 10);
        assert_eq!(config.event_log.kinds().len(), EventKind::ALL.len());
        assert_eq!(config.sink.tls.mode, TlsMode::Strict);
        assert_eq!(config.host_tags.get("role").map(String::as_str), Some("workstation"));
    }
}
