//! Host inventory collector.
//!
//! Inventory changes rarely, so it is not windowed: the scheduler caches the
//! last reading and only queries the platform again once the cache is stale.

use chrono::{DateTime, Utc};
use sysinfo::System;

use crate::collector::{Domain, MetricSource, SourceError};

/// Static description of the host.
#[derive(Debug, Clone, PartialEq)]
pub struct InventorySample {
    /// When the inventory was read.
    pub collected_at: DateTime<Utc>,
    /// Host name.
    pub host_name: Option<String>,
    /// Operating system name.
    pub os_name: Option<String>,
    /// Operating system version.
    pub os_version: Option<String>,
    /// Kernel version.
    pub kernel_version: Option<String>,
    /// Processor brand string.
    pub cpu_brand: Option<String>,
    /// Logical core count.
    pub logical_cores: u32,
    /// Installed physical memory.
    pub total_memory_bytes: u64,
    /// Seconds since boot.
    pub uptime_secs: u64,
}

/// Inventory collector backed by `sysinfo`.
#[derive(Debug, Clone, Default)]
pub struct InventorySource;

impl InventorySource {
    /// Create the collector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl MetricSource for InventorySource {
    type Output = InventorySample;

    fn domain(&self) -> Domain {
        Domain::Inventory
    }

    async fn sample(&self) -> Result<InventorySample, SourceError> {
        tokio::task::spawn_blocking(|| {
            let mut system = System::new();
            system.refresh_cpu_all();
            system.refresh_memory();

            let cpus = system.cpus();
            Ok(InventorySample {
                collected_at: Utc::now(),
                host_name: System::host_name(),
                os_name: System::name(),
                os_version: System::os_version(),
                kernel_version: System::kernel_version(),
                cpu_brand: cpus
                    .first()
                    .map(|c| c.brand().trim().to_string())
                    .filter(|b| !b.is_empty()),
                logical_cores: cpus.len() as u32,
                total_memory_bytes: system.total_memory(),
                uptime_secs: System::uptime(),
            })
        })
        .await?
    }
}
