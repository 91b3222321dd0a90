//! Configuration module.
//!
//! Provides YAML-based configuration loading for:
//! - Metric sampling (enabled collectors, interval, aggregation count)
//! - Event-log scanning (interval, lookback, adaptive backoff, kinds)
//! - Inventory refresh and the checkpoint database
//! - The time-series sink (endpoint, credentials, TLS mode)

mod app;
mod validation;

pub use app::{
    AppConfig, DatabaseConfig, EventLogConfig, InventoryConfig, Overrides, SamplingConfig,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{
    DEFAULT_CONFIG_PATH, DEFAULT_DB_PATH, DEFAULT_EVENT_LOG_INTERVAL, MAX_AGGREGATION_COUNT,
};
