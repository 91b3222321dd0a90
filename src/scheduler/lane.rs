//! Per-domain sampling lane: one source feeding one bounded window.

use async_trait::async_trait;

use crate::aggregate::{SampleBuffer, WindowStatus, aggregate};
use crate::collector::{Domain, MetricSource, Sample, SourceError};
use crate::sink::{Measurement, MetricPoint, PayloadAssembler};

/// Object-safe view of a sampling lane.
#[async_trait]
pub trait SamplingLane: Send {
    /// Domain sampled by this lane.
    fn domain(&self) -> Domain;

    /// Samples waiting for the next flush.
    fn buffered(&self) -> usize;

    /// Whether the lane stopped sampling because its domain is unsupported.
    fn is_disabled(&self) -> bool;

    /// Take one reading into the window. Returns `true` if a sample was kept.
    async fn sample(&mut self) -> bool;

    /// Drain and reduce the window into one point, if it holds any samples.
    fn flush(&mut self, assembler: &PayloadAssembler) -> Option<MetricPoint>;
}

/// Lane for a typed [`MetricSource`].
pub struct Lane<S: MetricSource> {
    source: S,
    buffer: SampleBuffer<S::Output>,
    disabled: bool,
    failures: u64,
}

impl<S> std::fmt::Debug for Lane<S>
where
    S: MetricSource,
    S::Output: Sample,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("domain", &self.source.domain())
            .field("buffered", &self.buffer.len())
            .field("disabled", &self.disabled)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl<S> Lane<S>
where
    S: MetricSource,
    S::Output: Sample,
{
    /// Create a lane with a window of `window` samples.
    pub fn new(source: S, window: usize) -> Self {
        Self {
            source,
            buffer: SampleBuffer::new(window),
            disabled: false,
            failures: 0,
        }
    }

    /// Failed reads so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[async_trait]
impl<S> SamplingLane for Lane<S>
where
    S: MetricSource,
    S::Output: Sample + Measurement,
{
    fn domain(&self) -> Domain {
        self.source.domain()
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    async fn sample(&mut self) -> bool {
        if self.disabled {
            return false;
        }

        match self.source.sample().await {
            Ok(sample) => {
                if let WindowStatus::ReadyToFlush = self.buffer.append(sample) {
                    tracing::trace!(domain = %self.domain(), "Window full");
                }
                true
            }
            Err(SourceError::Unsupported) => {
                tracing::warn!(domain = %self.domain(), "Domain not supported on this host, disabling");
                self.disabled = true;
                false
            }
            Err(e) => {
                self.failures += 1;
                tracing::warn!(domain = %self.domain(), error = %e, "Sample failed, skipping tick");
                false
            }
        }
    }

    fn flush(&mut self, assembler: &PayloadAssembler) -> Option<MetricPoint> {
        let samples = self.buffer.drain();
        let summary = aggregate(&samples).ok()?;
        tracing::debug!(domain = %self.domain(), samples = samples.len(), "Window aggregated");
        Some(assembler.assemble(&summary))
    }
}
