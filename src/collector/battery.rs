//! Battery collector.
//!
//! Reads the Linux power-supply class (`/sys/class/power_supply/BAT*`). Hosts
//! without a battery, and other platforms, report [`SourceError::Unsupported`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::aggregate::Window;
use crate::collector::{Domain, MetricSource, Sample, SourceError};

/// Default sysfs power-supply directory.
pub const DEFAULT_POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// One battery reading.
#[derive(Debug, Clone, PartialEq)]
pub struct BatterySample {
    /// When the reading was taken.
    pub collected_at: DateTime<Utc>,
    /// Battery identifier (e.g. `BAT0`).
    pub name: String,
    /// Remaining charge, 0-100.
    pub charge_percent: Option<f64>,
    /// Instantaneous charge or discharge power.
    pub power_watts: Option<f64>,
    /// Charge cycles reported by the battery controller.
    pub cycle_count: Option<u64>,
    /// Capacity when fully charged today.
    pub full_capacity_wh: Option<f64>,
    /// Capacity when new.
    pub design_capacity_wh: Option<f64>,
    /// External power is charging the battery.
    pub charging: bool,
    /// The host is running on battery.
    pub discharging: bool,
}

impl Sample for BatterySample {
    const DOMAIN: Domain = Domain::Battery;

    fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    fn reduce(window: &Window<'_, Self>) -> Self {
        Self {
            collected_at: window.last(|s| s.collected_at),
            name: window.last(|s| s.name.clone()),
            charge_percent: window.mean(|s| s.charge_percent),
            power_watts: window.mean(|s| s.power_watts),
            cycle_count: window.last(|s| s.cycle_count),
            full_capacity_wh: window.last(|s| s.full_capacity_wh),
            design_capacity_wh: window.last(|s| s.design_capacity_wh),
            charging: window.last(|s| s.charging),
            discharging: window.last(|s| s.discharging),
        }
    }
}

/// Battery collector over a power-supply class directory.
#[derive(Debug, Clone)]
pub struct BatterySource {
    root: PathBuf,
}

impl BatterySource {
    /// Read batteries from the system power-supply directory.
    pub fn new() -> Self {
        Self::with_root(DEFAULT_POWER_SUPPLY_DIR)
    }

    /// Read batteries from a custom directory laid out like sysfs.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for BatterySource {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a sysfs attribute; missing attributes are `None`.
fn attr(dir: &Path, name: &str) -> Option<String> {
    std::fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn attr_f64(dir: &Path, name: &str) -> Option<f64> {
    attr(dir, name).and_then(|s| s.parse().ok())
}

/// Micro-unit attribute scaled to base units.
fn attr_micro(dir: &Path, name: &str) -> Option<f64> {
    attr_f64(dir, name).map(|v| v / 1_000_000.0)
}

fn find_battery(root: &Path) -> Result<PathBuf, SourceError> {
    if !root.is_dir() {
        return Err(SourceError::Unsupported);
    }
    let mut batteries: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| attr(path, "type").is_some_and(|t| t.eq_ignore_ascii_case("battery")))
        .collect();
    batteries.sort();
    batteries.into_iter().next().ok_or(SourceError::Unsupported)
}

fn read_battery(dir: &Path) -> BatterySample {
    let status = attr(dir, "status").unwrap_or_default().to_ascii_lowercase();

    // Some controllers report energy (µWh), others charge (µAh) plus voltage (µV).
    let voltage = attr_micro(dir, "voltage_now");
    let energy = |energy_attr: &str, charge_attr: &str| {
        attr_micro(dir, energy_attr)
            .or_else(|| Some(attr_micro(dir, charge_attr)? * voltage?))
    };
    let power_watts = attr_micro(dir, "power_now")
        .or_else(|| Some(attr_micro(dir, "current_now")? * voltage?));

    let full_capacity_wh = energy("energy_full", "charge_full");
    let charge_percent = attr_f64(dir, "capacity").or_else(|| {
        let now = energy("energy_now", "charge_now")?;
        let full = full_capacity_wh.filter(|f| *f > 0.0)?;
        Some((now / full * 100.0).min(100.0))
    });

    BatterySample {
        collected_at: Utc::now(),
        name: dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        charge_percent,
        power_watts,
        cycle_count: attr(dir, "cycle_count")
            .and_then(|s| s.parse().ok())
            .filter(|c| *c > 0),
        full_capacity_wh,
        design_capacity_wh: energy("energy_full_design", "charge_full_design"),
        charging: status == "charging",
        discharging: status == "discharging",
    }
}

#[async_trait::async_trait]
impl MetricSource for BatterySource {
    type Output = BatterySample;

    fn domain(&self) -> Domain {
        Domain::Battery
    }

    async fn sample(&self) -> Result<BatterySample, SourceError> {
        if !cfg!(target_os = "linux") && self.root == Path::new(DEFAULT_POWER_SUPPLY_DIR) {
            return Err(SourceError::Unsupported);
        }
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || find_battery(&root).map(|dir| read_battery(&dir)))
            .await?
    }
}
