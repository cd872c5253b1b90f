use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::network::RateSampler;
use super::source::MetricSource;
use super::types::{
    bytes_to_gb, round_to, ErrorRecord, Metrics, PartitionUsage, SamplePayload,
};
use crate::error::SourceError;

/// Virtual and kernel filesystems that do not describe real storage.
const PSEUDO_FILESYSTEMS: &[&str] = &[
    "autofs",
    "binfmt_misc",
    "bpf",
    "cgroup",
    "cgroup2",
    "configfs",
    "debugfs",
    "devfs",
    "devpts",
    "devtmpfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nsfs",
    "overlay",
    "proc",
    "pstore",
    "ramfs",
    "securityfs",
    "sysfs",
    "tmpfs",
    "tracefs",
];

pub fn is_real_filesystem(fstype: &str) -> bool {
    !fstype.is_empty() && !PSEUDO_FILESYSTEMS.contains(&fstype)
}

/// Step timings of one collection round.
#[derive(Debug, Clone)]
pub struct RoundTimer {
    start_time: Instant,
    checkpoints: Vec<(&'static str, Duration)>,
}

impl RoundTimer {
    pub fn new() -> Self {
        RoundTimer {
            start_time: Instant::now(),
            checkpoints: Vec::new(),
        }
    }

    pub fn checkpoint(&mut self, name: &'static str) {
        self.checkpoints.push((name, self.start_time.elapsed()));
    }

    pub fn total(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn summary(&self) -> String {
        self.checkpoints
            .iter()
            .map(|(name, at)| format!("{}={}ms", name, at.as_millis()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for RoundTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one sampling round against a [`MetricSource`].
pub struct Collector {
    source: Arc<dyn MetricSource>,
    rates: RateSampler,
}

impl Collector {
    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        let rates = RateSampler::new(Arc::clone(&source));
        Collector { source, rates }
    }

    /// Never fails: a source error becomes an [`ErrorRecord`] payload.
    /// A successful round takes at least the rate window.
    pub async fn collect_sample(&self) -> SamplePayload {
        let mut timer = RoundTimer::new();
        match self.collect_metrics(&mut timer).await {
            Ok(metrics) => {
                debug!(
                    "collection round finished in {}ms ({})",
                    timer.total().as_millis(),
                    timer.summary()
                );
                SamplePayload::Metrics(metrics)
            }
            Err(err) => {
                warn!("collection round failed: {}", err);
                SamplePayload::Error(ErrorRecord {
                    error: err.to_string(),
                })
            }
        }
    }

    async fn collect_metrics(&self, timer: &mut RoundTimer) -> Result<Metrics, SourceError> {
        let cpu_usage = self.source.cpu_percent()?;
        let per_core = self.source.cpu_percent_per_core()?;
        let frequency = self.source.cpu_frequency_mhz()?;
        timer.checkpoint("cpu");

        let memory = self.source.virtual_memory()?;
        timer.checkpoint("memory");

        let root = self.source.disk_usage(Path::new("/"))?;
        let disk_usages = self.partition_usages()?;
        timer.checkpoint("disks");

        let network_stats = self.rates.measure().await?.into_values().collect();
        timer.checkpoint("network");

        Ok(Metrics {
            cpu_usage_percent: round_to(cpu_usage, 2),
            cpu_usage_per_core_percent: per_core.into_iter().map(|c| round_to(c, 2)).collect(),
            cpu_freq_current_mhz: frequency.max(0.0).round() as u64,
            memory_total_gb: bytes_to_gb(memory.total),
            memory_used_gb: bytes_to_gb(memory.used),
            memory_percent: round_to(memory.percent, 2),
            disk_total_gb: bytes_to_gb(root.total),
            disk_used_gb: bytes_to_gb(root.used),
            disk_percent: round_to(root.percent, 2),
            disk_usages,
            network_stats,
        })
    }

    fn partition_usages(&self) -> Result<Vec<PartitionUsage>, SourceError> {
        let mut usages = Vec::new();
        for partition in self.source.disk_partitions()? {
            if !is_real_filesystem(&partition.fstype) {
                continue;
            }
            let usage = self.source.disk_usage(Path::new(&partition.mountpoint))?;
            usages.push(PartitionUsage {
                mountpoint: partition.mountpoint,
                fstype: partition.fstype,
                used_bytes: usage.used,
                total_bytes: usage.total,
                percent: round_to(usage.percent, 2),
            });
        }
        Ok(usages)
    }
}
