//! Typed mapping from domain samples and event records to measurement points.
//!
//! Every domain has one explicit `{tag, field}` table here. Fields a source
//! did not report are omitted from the point rather than zero-filled.

use crate::collector::battery::BatterySample;
use crate::collector::disk::DiskSample;
use crate::collector::inventory::InventorySample;
use crate::collector::memory::MemorySample;
use crate::collector::processor::ProcessorSample;
use crate::eventlog::EventRecord;
use crate::sink::{MetricPoint, StaticTags};

/// Conversion of one typed reading into a measurement point.
pub trait Measurement {
    /// Build the point, without static tags.
    fn to_point(&self) -> MetricPoint;
}

impl Measurement for ProcessorSample {
    fn to_point(&self) -> MetricPoint {
        MetricPoint::new("processor", self.collected_at)
            .with_opt_field("usage_percent", self.usage_percent)
            .with_opt_field("load_average", self.load_average)
            .with_opt_field("frequency_mhz", self.frequency_mhz)
            .with_opt_field("brand", self.brand.clone())
            .with_field("logical_cores", self.logical_cores)
    }
}

impl Measurement for MemorySample {
    fn to_point(&self) -> MetricPoint {
        MetricPoint::new("memory", self.collected_at)
            .with_field("total_bytes", self.total_bytes)
            .with_opt_field("used_bytes", self.used_bytes)
            .with_opt_field("available_bytes", self.available_bytes)
            .with_opt_field("used_percent", self.used_percent)
            .with_opt_field("swap_used_bytes", self.swap_used_bytes)
    }
}

impl Measurement for DiskSample {
    fn to_point(&self) -> MetricPoint {
        MetricPoint::new("disk", self.collected_at)
            .with_tag("mount_point", self.mount_point.clone())
            .with_field("total_bytes", self.total_bytes)
            .with_opt_field("available_bytes", self.available_bytes)
            .with_opt_field("used_percent", self.used_percent)
    }
}

impl Measurement for BatterySample {
    fn to_point(&self) -> MetricPoint {
        MetricPoint::new("battery", self.collected_at)
            .with_tag("battery", self.name.clone())
            .with_opt_field("charge_percent", self.charge_percent)
            .with_opt_field("power_watts", self.power_watts)
            .with_opt_field("cycle_count", self.cycle_count)
            .with_opt_field("full_capacity_wh", self.full_capacity_wh)
            .with_opt_field("design_capacity_wh", self.design_capacity_wh)
            .with_field("charging", self.charging)
            .with_field("discharging", self.discharging)
    }
}

impl Measurement for InventorySample {
    fn to_point(&self) -> MetricPoint {
        MetricPoint::new("inventory", self.collected_at)
            .with_opt_field("host_name", self.host_name.clone())
            .with_opt_field("os_name", self.os_name.clone())
            .with_opt_field("os_version", self.os_version.clone())
            .with_opt_field("kernel_version", self.kernel_version.clone())
            .with_opt_field("cpu_brand", self.cpu_brand.clone())
            .with_field("logical_cores", self.logical_cores)
            .with_field("total_memory_bytes", self.total_memory_bytes)
            .with_field("uptime_secs", self.uptime_secs)
    }
}

impl Measurement for EventRecord {
    fn to_point(&self) -> MetricPoint {
        MetricPoint::new("event_log", self.occurred_at)
            .with_tag("kind", self.kind.as_ref())
            .with_tag("source", self.source.clone())
            .with_field("event_id", self.raw_code)
            .with_field("message", self.message.clone())
    }
}

/// Builds sink-ready points, stamping the host's static tags on each.
#[derive(Debug, Clone, Default)]
pub struct PayloadAssembler {
    static_tags: StaticTags,
}

impl PayloadAssembler {
    /// Create an assembler tagging points with `host` plus `extra_tags`.
    pub fn new(host: impl Into<String>, extra_tags: StaticTags) -> Self {
        let mut static_tags = extra_tags;
        static_tags.insert("host".to_string(), host.into());
        Self { static_tags }
    }

    /// Tags added to every point.
    pub fn static_tags(&self) -> &StaticTags {
        &self.static_tags
    }

    /// Point for one reading or record.
    pub fn assemble<M: Measurement>(&self, item: &M) -> MetricPoint {
        item.to_point().with_tags(&self.static_tags)
    }

    /// Points for a batch of event records.
    pub fn events(&self, records: &[EventRecord]) -> Vec<MetricPoint> {
        records.iter().map(|r| self.assemble(r)).collect()
    }
}
