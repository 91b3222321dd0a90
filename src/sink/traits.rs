//! Sink trait and error type.

use async_trait::async_trait;
use thiserror::Error;

use crate::sink::MetricPoint;

/// Errors raised while publishing points.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport-level failure (connect, TLS handshake, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("write rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The configured TLS material could not be used.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Reading TLS material from disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured endpoint is not a valid URL.
    #[error("invalid sink URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Destination for assembled points.
///
/// Implementations must be cheap to share; the dispatcher calls `publish`
/// from detached tasks.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Write one batch of points.
    async fn publish(&self, points: &[MetricPoint]) -> Result<(), SinkError>;
}
