//! Processor load collector.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sysinfo::System;

use crate::aggregate::Window;
use crate::collector::{Domain, MetricSource, Sample, SourceError};

/// One processor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorSample {
    /// When the reading was taken.
    pub collected_at: DateTime<Utc>,
    /// Global CPU utilisation across all cores, 0-100.
    pub usage_percent: Option<f64>,
    /// One-minute run-queue load average (not reported on Windows).
    pub load_average: Option<f64>,
    /// Mean current clock across cores.
    pub frequency_mhz: Option<f64>,
    /// Processor brand string.
    pub brand: Option<String>,
    /// Logical core count.
    pub logical_cores: u32,
}

impl Sample for ProcessorSample {
    const DOMAIN: Domain = Domain::Processor;

    fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    fn reduce(window: &Window<'_, Self>) -> Self {
        Self {
            collected_at: window.last(|s| s.collected_at),
            usage_percent: window.mean(|s| s.usage_percent),
            load_average: window.mean(|s| s.load_average),
            frequency_mhz: window.mean(|s| s.frequency_mhz),
            brand: window.last(|s| s.brand.clone()),
            logical_cores: window.last(|s| s.logical_cores),
        }
    }
}

/// Processor collector backed by `sysinfo`.
///
/// Holds one `System` across calls: CPU usage is the delta between two
/// refreshes, so the first refresh happens at construction.
#[derive(Clone)]
pub struct ProcessorSource {
    system: Arc<Mutex<System>>,
}

impl ProcessorSource {
    /// Create the collector and prime the CPU usage baseline.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }
}

impl Default for ProcessorSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcessorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorSource").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl MetricSource for ProcessorSource {
    type Output = ProcessorSample;

    fn domain(&self) -> Domain {
        Domain::Processor
    }

    async fn sample(&self) -> Result<ProcessorSample, SourceError> {
        let system = Arc::clone(&self.system);
        tokio::task::spawn_blocking(move || {
            let mut system = system
                .lock()
                .map_err(|_| SourceError::Unavailable("processor state poisoned".into()))?;
            system.refresh_cpu_all();

            let cpus = system.cpus();
            if cpus.is_empty() {
                return Err(SourceError::Unavailable("no processors reported".into()));
            }

            let frequency_mhz =
                cpus.iter().map(|c| c.frequency() as f64).sum::<f64>() / cpus.len() as f64;
            let load_average = if cfg!(windows) {
                None
            } else {
                Some(System::load_average().one)
            };
            let brand = cpus
                .first()
                .map(|c| c.brand().trim().to_string())
                .filter(|b| !b.is_empty());

            Ok(ProcessorSample {
                collected_at: Utc::now(),
                usage_percent: Some(f64::from(system.global_cpu_usage())),
                load_average,
                frequency_mhz: (frequency_mhz > 0.0).then_some(frequency_mhz),
                brand,
                logical_cores: cpus.len() as u32,
            })
        })
        .await?
    }
}
