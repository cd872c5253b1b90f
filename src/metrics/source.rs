//! Boundary between the collector and whatever answers host metric queries.

use std::collections::HashMap;
use std::path::Path;

use crate::error::SourceError;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    pub mountpoint: String,
    pub fstype: String,
}

/// Cumulative per-interface counters as reported by the OS.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: u64,
    pub dropout: u64,
}

pub trait MetricSource: Send + Sync {
    fn cpu_percent(&self) -> Result<f64, SourceError>;
    fn cpu_percent_per_core(&self) -> Result<Vec<f64>, SourceError>;
    fn cpu_frequency_mhz(&self) -> Result<f64, SourceError>;
    fn virtual_memory(&self) -> Result<MemoryUsage, SourceError>;
    fn disk_usage(&self, path: &Path) -> Result<DiskUsage, SourceError>;
    fn disk_partitions(&self) -> Result<Vec<Partition>, SourceError>;
    fn net_io_counters_per_interface(&self) -> Result<HashMap<String, NetCounters>, SourceError>;
}

pub(crate) fn percent_of(used: u64, total: u64) -> f64 {
    if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
