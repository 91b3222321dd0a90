//! Physical memory collector.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sysinfo::System;

use crate::aggregate::Window;
use crate::collector::{Domain, MetricSource, Sample, SourceError};

/// One memory reading. Byte counts are physical memory unless noted.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySample {
    /// When the reading was taken.
    pub collected_at: DateTime<Utc>,
    /// Installed memory.
    pub total_bytes: u64,
    /// Memory in use.
    pub used_bytes: Option<u64>,
    /// Memory available for new allocations without swapping.
    pub available_bytes: Option<u64>,
    /// `used / total`, 0-100.
    pub used_percent: Option<f64>,
    /// Swap in use.
    pub swap_used_bytes: Option<u64>,
}

impl Sample for MemorySample {
    const DOMAIN: Domain = Domain::Memory;

    fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    fn reduce(window: &Window<'_, Self>) -> Self {
        Self {
            collected_at: window.last(|s| s.collected_at),
            total_bytes: window.last(|s| s.total_bytes),
            used_bytes: window.mean_u64(|s| s.used_bytes),
            available_bytes: window.mean_u64(|s| s.available_bytes),
            used_percent: window.mean(|s| s.used_percent),
            swap_used_bytes: window.mean_u64(|s| s.swap_used_bytes),
        }
    }
}

/// Memory collector backed by `sysinfo`.
#[derive(Clone)]
pub struct MemorySource {
    system: Arc<Mutex<System>>,
}

impl MemorySource {
    /// Create the collector.
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySource").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl MetricSource for MemorySource {
    type Output = MemorySample;

    fn domain(&self) -> Domain {
        Domain::Memory
    }

    async fn sample(&self) -> Result<MemorySample, SourceError> {
        let system = Arc::clone(&self.system);
        tokio::task::spawn_blocking(move || {
            let mut system = system
                .lock()
                .map_err(|_| SourceError::Unavailable("memory state poisoned".into()))?;
            system.refresh_memory();

            let total = system.total_memory();
            if total == 0 {
                return Err(SourceError::Unavailable("total memory reported as zero".into()));
            }
            let used = system.used_memory();

            Ok(MemorySample {
                collected_at: Utc::now(),
                total_bytes: total,
                used_bytes: Some(used),
                available_bytes: Some(system.available_memory()),
                used_percent: Some(used as f64 / total as f64 * 100.0),
                swap_used_bytes: (system.total_swap() > 0).then(|| system.used_swap()),
            })
        })
        .await?
    }
}
