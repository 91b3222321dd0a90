//! Disk capacity collector.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sysinfo::Disks;

use crate::aggregate::Window;
use crate::collector::{Domain, MetricSource, Sample, SourceError};

/// One reading of a mounted volume.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSample {
    /// When the reading was taken.
    pub collected_at: DateTime<Utc>,
    /// Mount point (or drive root) of the volume.
    pub mount_point: String,
    /// Volume size.
    pub total_bytes: u64,
    /// Space available to unprivileged users.
    pub available_bytes: Option<u64>,
    /// `(total - available) / total`, 0-100.
    pub used_percent: Option<f64>,
}

impl Sample for DiskSample {
    const DOMAIN: Domain = Domain::Disk;

    fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    fn reduce(window: &Window<'_, Self>) -> Self {
        Self {
            collected_at: window.last(|s| s.collected_at),
            mount_point: window.last(|s| s.mount_point.clone()),
            total_bytes: window.last(|s| s.total_bytes),
            available_bytes: window.mean_u64(|s| s.available_bytes),
            used_percent: window.mean(|s| s.used_percent),
        }
    }
}

/// Disk collector for one configured mount point.
#[derive(Debug, Clone)]
pub struct DiskSource {
    mount_point: PathBuf,
}

impl DiskSource {
    /// Watch the volume mounted at `mount_point`.
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
        }
    }

    /// Default system volume for the platform.
    pub fn system_volume() -> Self {
        if cfg!(windows) {
            Self::new("C:\\")
        } else {
            Self::new("/")
        }
    }
}

fn read_volume(mount_point: &Path) -> Result<DiskSample, SourceError> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == mount_point)
        .ok_or_else(|| {
            SourceError::Unavailable(format!("no volume mounted at {}", mount_point.display()))
        })?;

    let total = disk.total_space();
    let available = disk.available_space();
    let used_percent = (total > 0)
        .then(|| total.saturating_sub(available) as f64 / total as f64 * 100.0);

    Ok(DiskSample {
        collected_at: Utc::now(),
        mount_point: mount_point.display().to_string(),
        total_bytes: total,
        available_bytes: Some(available),
        used_percent,
    })
}

#[async_trait::async_trait]
impl MetricSource for DiskSource {
    type Output = DiskSample;

    fn domain(&self) -> Domain {
        Domain::Disk
    }

    async fn sample(&self) -> Result<DiskSample, SourceError> {
        let mount_point = self.mount_point.clone();
        tokio::task::spawn_blocking(move || read_volume(&mount_point)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use chrono::Duration;

    #[test]
    fn test_disk_window_keeps_last_capacity() {
        let at = DateTime::<Utc>::UNIX_EPOCH;
        let samples = vec![
            DiskSample {
                collected_at: at,
                mount_point: "/".into(),
                total_bytes: 500,
                available_bytes: Some(200),
                used_percent: Some(60.0),
            },
            DiskSample {
                collected_at: at + Duration::seconds(3),
                mount_point: "/".into(),
                total_bytes: 1000,
                available_bytes: Some(400),
                used_percent: Some(60.0),
            },
        ];
        let summary = aggregate(&samples).unwrap();
        assert_eq!(summary.total_bytes, 1000);
        assert_eq!(summary.available_bytes, Some(300));
        assert_eq!(summary.used_percent, Some(60.0));
    }

    #[tokio::test]
    async fn test_unknown_mount_point_is_unavailable() {
        let source = DiskSource::new("/definitely/not/a/mount/point");
        let err = source.sample().await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }
}
