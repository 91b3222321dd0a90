//! InfluxDB v2 HTTP write sink.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::sink::{MetricPoint, MetricsSink, SinkError};

/// Default request timeout (10 seconds).
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Server certificate verification policy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TlsMode {
    /// Verify against the platform's trusted roots.
    #[default]
    Strict,
    /// Accept any certificate.
    Skip,
    /// Trust only the configured CA certificate.
    Pinned,
}

/// TLS settings for the sink connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Verification policy.
    #[serde(default)]
    pub mode: TlsMode,
    /// PEM file holding the pinned CA certificate (pinned mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
}

/// Connection settings for an InfluxDB v2 endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    /// Base URL, e.g. `https://influx.example.com:8086`.
    pub url: String,
    /// Organization name.
    pub org: String,
    /// Destination bucket.
    pub bucket: String,
    /// API token. `${VAR}` references are expanded at load time.
    pub token: String,
    /// Request timeout (default: 10s).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// TLS settings.
    pub tls: TlsConfig,
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("tls", &self.tls)
            .finish()
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            org: String::new(),
            bucket: "hostwatch".to_string(),
            token: String::new(),
            timeout: DEFAULT_SINK_TIMEOUT,
            tls: TlsConfig::default(),
        }
    }
}

impl InfluxConfig {
    /// Write endpoint with org, bucket and millisecond precision applied.
    pub fn write_url(&self) -> Result<Url, SinkError> {
        let mut base = self.url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let mut url = Url::parse(&base)?.join("api/v2/write")?;
        url.query_pairs_mut()
            .append_pair("org", &self.org)
            .append_pair("bucket", &self.bucket)
            .append_pair("precision", "ms");
        Ok(url)
    }
}

/// Sink posting line protocol to `/api/v2/write`.
pub struct InfluxSink {
    client: Client,
    write_url: Url,
    token: String,
}

impl fmt::Debug for InfluxSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxSink")
            .field("write_url", &self.write_url.as_str())
            .finish_non_exhaustive()
    }
}

impl InfluxSink {
    /// Build the HTTP client for `config`, applying its TLS mode.
    pub fn new(config: &InfluxConfig) -> Result<Self, SinkError> {
        let write_url = config.write_url()?;
        let mut builder = Client::builder().timeout(config.timeout);

        match config.tls.mode {
            TlsMode::Strict => {}
            TlsMode::Skip => {
                tracing::warn!(url = %config.url, "TLS certificate verification disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }
            TlsMode::Pinned => {
                let path = config.tls.ca_cert.as_ref().ok_or_else(|| {
                    SinkError::Tls("pinned mode requires tls.ca_cert".to_string())
                })?;
                let pem = std::fs::read(path)?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| SinkError::Tls(format!("{}: {e}", path.display())))?;
                builder = builder
                    .tls_built_in_root_certs(false)
                    .add_root_certificate(cert);
            }
        }

        let client = builder.build()?;
        tracing::debug!(url = %write_url, tls = %config.tls.mode, "Influx sink ready");
        Ok(Self {
            client,
            write_url,
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl MetricsSink for InfluxSink {
    async fn publish(&self, points: &[MetricPoint]) -> Result<(), SinkError> {
        let body = points
            .iter()
            .filter_map(MetricPoint::to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n");
        if body.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.write_url.clone())
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
