//! Configuration errors and value helpers.

use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
///
/// Only [`ConfigError::MissingCredential`] and an unusable sink endpoint stop
/// startup; every other problem is repaired with a default and a warning.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),

    /// A required credential is absent or empty.
    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),
}

/// Parse duration string using humantime.
///
/// Supports various formats: `3s`, `1m`, `5m30s`, `24h`, `1d`, `100ms`, etc.
///
/// # Examples
///
/// ```
/// use hostwatch::config::parse_duration;
///
/// assert_eq!(parse_duration("3s").unwrap().as_secs(), 3);
/// assert_eq!(parse_duration("24h").unwrap().as_secs(), 86400);
/// assert_eq!(parse_duration("1h30m").unwrap().as_secs(), 5400);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Expand environment variables in a string.
/// Supports ${VAR} and ${VAR:-default} syntax.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<Option<regex::Regex>> = std::sync::OnceLock::new();

    let Some(regex) = ENV_VAR_REGEX
        .get_or_init(|| regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").ok())
    else {
        return input.to_string();
    };

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}

/// Replace a zero duration with `default`, logging the repair.
pub(crate) fn nonzero_or(field: &'static str, value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        tracing::warn!(field, default = ?default, "Zero duration in config, using default");
        default
    } else {
        value
    }
}
