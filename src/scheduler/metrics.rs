//! Metric-sampling trigger.

use std::time::Duration;

use async_trait::async_trait;

use crate::collector::{MetricSource, Sample};
use crate::scheduler::{Job, Lane, SamplingLane};
use crate::sink::{Dispatcher, Measurement, PayloadAssembler};

/// Default sampling interval (3 seconds).
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_secs(3);

/// Default number of samples per aggregation window.
pub const DEFAULT_AGGREGATION_COUNT: usize = 10;

/// Samples every lane on each tick and flushes all windows every N ticks.
///
/// Flushing on the tick count keeps windows aligned: a lane that missed
/// ticks is reduced over the samples it has instead of holding the others.
pub struct MetricSampler {
    lanes: Vec<Box<dyn SamplingLane>>,
    window: usize,
    ticks: usize,
    interval: Duration,
    assembler: PayloadAssembler,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for MetricSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSampler")
            .field("lanes", &self.lanes.len())
            .field("window", &self.window)
            .field("ticks", &self.ticks)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl MetricSampler {
    /// Create a sampler with windows of `window` samples (minimum 1).
    pub fn new(
        interval: Duration,
        window: usize,
        assembler: PayloadAssembler,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            lanes: Vec::new(),
            window: window.max(1),
            ticks: 0,
            interval,
            assembler,
            dispatcher,
        }
    }

    /// Add a source, wrapped in a lane sized to this sampler's window.
    pub fn with_source<S>(self, source: S) -> Self
    where
        S: MetricSource,
        S::Output: Sample + Measurement,
    {
        let window = self.window;
        self.with_lane(Lane::new(source, window))
    }

    /// Add a prepared lane.
    pub fn with_lane(mut self, lane: impl SamplingLane + 'static) -> Self {
        tracing::debug!(domain = %lane.domain(), window = self.window, "Sampling lane added");
        self.lanes.push(Box::new(lane));
        self
    }

    /// Number of lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Ticks since the last flush.
    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Samples buffered across all lanes.
    pub fn buffered(&self) -> usize {
        self.lanes.iter().map(|l| l.buffered()).sum()
    }

    /// Sample every lane once; flush when the window is complete.
    ///
    /// Returns the number of points dispatched.
    pub async fn tick(&mut self) -> usize {
        for lane in &mut self.lanes {
            lane.sample().await;
        }
        self.ticks += 1;

        if self.ticks >= self.window {
            self.flush()
        } else {
            0
        }
    }

    /// Aggregate and dispatch every non-empty window, then reset the count.
    pub fn flush(&mut self) -> usize {
        self.ticks = 0;
        let points: Vec<_> = self
            .lanes
            .iter_mut()
            .filter_map(|lane| lane.flush(&self.assembler))
            .collect();
        let count = points.len();
        self.dispatcher.dispatch(points, "metrics");
        count
    }
}

#[async_trait]
impl Job for MetricSampler {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&mut self) {
        let flushed = self.tick().await;
        if flushed > 0 {
            tracing::debug!(points = flushed, "Metric windows flushed");
        }
    }

    async fn on_shutdown(&mut self) {
        let pending = self.buffered();
        if pending > 0 {
            let flushed = self.flush();
            tracing::info!(samples = pending, points = flushed, "Partial windows flushed on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::battery::BatterySample;
    use crate::collector::processor::ProcessorSample;
    use crate::collector::{Domain, SourceError};
    use crate::sink::{FieldValue, MetricPoint, MetricsSink, SinkError};
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        points: Mutex<Vec<MetricPoint>>,
    }

    #[async_trait]
    impl MetricsSink for RecordingSink {
        async fn publish(&self, points: &[MetricPoint]) -> Result<(), SinkError> {
            self.points.lock().unwrap().extend_from_slice(points);
            Ok(())
        }
    }

    /// Processor source replaying scripted readings; `None` is a failed read.
    struct ScriptedCpu(Mutex<VecDeque<Option<f64>>>);

    impl ScriptedCpu {
        fn new(values: &[Option<f64>]) -> Self {
            Self(Mutex::new(values.iter().copied().collect()))
        }
    }

    #[async_trait]
    impl MetricSource for ScriptedCpu {
        type Output = ProcessorSample;

        fn domain(&self) -> Domain {
            Domain::Processor
        }

        async fn sample(&self) -> Result<ProcessorSample, SourceError> {
            let next = self.0.lock().unwrap().pop_front().flatten();
            let usage = next.ok_or_else(|| SourceError::Unavailable("scripted".into()))?;
            Ok(ProcessorSample {
                collected_at: Utc::now(),
                usage_percent: Some(usage),
                load_average: None,
                frequency_mhz: None,
                brand: Some("Test CPU".into()),
                logical_cores: 4,
            })
        }
    }

    struct NoBattery;

    #[async_trait]
    impl MetricSource for NoBattery {
        type Output = BatterySample;

        fn domain(&self) -> Domain {
            Domain::Battery
        }

        async fn sample(&self) -> Result<BatterySample, SourceError> {
            Err(SourceError::Unsupported)
        }
    }

    fn sampler(window: usize) -> (MetricSampler, Arc<RecordingSink>, Dispatcher) {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(sink.clone());
        let sampler = MetricSampler::new(
            Duration::from_secs(3),
            window,
            PayloadAssembler::new("test-host", Default::default()),
            dispatcher.clone(),
        );
        (sampler, sink, dispatcher)
    }

    #[tokio::test]
    async fn test_window_of_three_publishes_mean() {
        let (sampler, sink, dispatcher) = sampler(3);
        let mut sampler =
            sampler.with_source(ScriptedCpu::new(&[Some(10.0), Some(20.0), Some(30.0)]));

        assert_eq!(sampler.tick().await, 0);
        assert_eq!(sampler.tick().await, 0);
        assert_eq!(sampler.tick().await, 1);
        assert_eq!(sampler.ticks(), 0);
        assert_eq!(sampler.buffered(), 0);

        dispatcher.shutdown(Duration::from_secs(5)).await;
        let points = sink.points.lock().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].measurement, "processor");
        assert_eq!(points[0].tags["host"], "test-host");
        assert_eq!(points[0].fields["usage_percent"], FieldValue::Float(20.0));
    }

    #[tokio::test]
    async fn test_failed_tick_is_skipped_not_stalled() {
        let (sampler, sink, dispatcher) = sampler(3);
        let mut sampler = sampler.with_source(ScriptedCpu::new(&[Some(10.0), None, Some(30.0)]));

        sampler.tick().await;
        sampler.tick().await;
        assert_eq!(sampler.tick().await, 1);

        dispatcher.shutdown(Duration::from_secs(5)).await;
        let points = sink.points.lock().unwrap();
        assert_eq!(points[0].fields["usage_percent"], FieldValue::Float(20.0));
    }

    #[tokio::test]
    async fn test_unsupported_lane_is_disabled() {
        let (sampler, _sink, _dispatcher) = sampler(2);
        let mut lane = Lane::new(NoBattery, 2);
        assert!(!lane.sample().await);
        assert!(lane.is_disabled());
        assert!(!lane.sample().await);

        let mut sampler = sampler.with_lane(lane);
        sampler.tick().await;
        assert_eq!(sampler.tick().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_partial_window() {
        let (sampler, sink, dispatcher) = sampler(5);
        let mut sampler = sampler.with_source(ScriptedCpu::new(&[Some(40.0), Some(60.0)]));

        sampler.tick().await;
        sampler.tick().await;
        assert_eq!(sampler.buffered(), 2);

        sampler.on_shutdown().await;
        assert_eq!(sampler.buffered(), 0);

        dispatcher.shutdown(Duration::from_secs(5)).await;
        let points = sink.points.lock().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].fields["usage_percent"], FieldValue::Float(50.0));
    }

    #[tokio::test]
    async fn test_shutdown_with_empty_windows_publishes_nothing() {
        let (sampler, sink, dispatcher) = sampler(5);
        let mut sampler = sampler.with_source(ScriptedCpu::new(&[]));
        sampler.on_shutdown().await;
        dispatcher.shutdown(Duration::from_secs(5)).await;
        assert!(sink.points.lock().unwrap().is_empty());
    }
}
