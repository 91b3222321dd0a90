//! Core collector traits and types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::aggregate::Window;

/// Errors that can occur while reading one metric domain.
///
/// A source error only ever skips that domain's sample for the current tick.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The platform does not expose this domain (e.g. no battery present).
    #[error("not supported on this host")]
    Unsupported,

    /// The platform query failed.
    #[error("counter unavailable: {0}")]
    Unavailable(String),

    /// I/O error while reading platform files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking collection task panicked or was cancelled.
    #[error("collection task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for SourceError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e.to_string())
    }
}

/// Metric domain classification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Domain {
    /// Battery charge and health.
    Battery,
    /// Physical memory and swap.
    Memory,
    /// Processor load.
    Processor,
    /// Disk capacity.
    Disk,
    /// Static host inventory.
    Inventory,
}

impl Domain {
    /// Domains that are sampled on the metric trigger and aggregated.
    pub const SAMPLED: [Domain; 4] = [
        Domain::Battery,
        Domain::Memory,
        Domain::Processor,
        Domain::Disk,
    ];
}

/// One immutable reading of a sampled metric domain.
///
/// Implementors define how a window of readings reduces to one summary
/// reading, choosing mean or last-value per field.
pub trait Sample: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Domain this sample belongs to.
    const DOMAIN: Domain;

    /// When the reading was taken.
    fn collected_at(&self) -> DateTime<Utc>;

    /// Reduce a non-empty window into one summary sample.
    fn reduce(window: &Window<'_, Self>) -> Self;
}

/// A per-domain metric collector.
///
/// Sources are independent: each call returns one reading or fails without
/// affecting other domains.
#[async_trait::async_trait]
pub trait MetricSource: Send + Sync + 'static {
    /// Reading produced by one call.
    type Output: Send + 'static;

    /// Domain this source reads.
    fn domain(&self) -> Domain;

    /// Take one reading.
    async fn sample(&self) -> Result<Self::Output, SourceError>;
}
