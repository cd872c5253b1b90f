use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Unix milliseconds to the nearest whole second.
pub fn round_millis_to_secs(millis: i64) -> i64 {
    (millis + 500).div_euclid(1000)
}

/// Current Unix time, rounded to the nearest second.
pub fn unix_now_secs() -> i64 {
    round_millis_to_secs(Utc::now().timestamp_millis())
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    round_to(bytes as f64 / BYTES_PER_GB, 4)
}

/// One timestamped result of a collection round. Never mutated after it is
/// appended to the history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub payload: SamplePayload,
}

impl Sample {
    pub fn new(timestamp: i64, payload: SamplePayload) -> Self {
        Sample { timestamp, payload }
    }

    pub fn now(payload: SamplePayload) -> Self {
        Sample::new(unix_now_secs(), payload)
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.payload {
            SamplePayload::Metrics(metrics) => Some(metrics),
            SamplePayload::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, SamplePayload::Error(_))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SamplePayload {
    Metrics(Metrics),
    Error(ErrorRecord),
}

impl From<Metrics> for SamplePayload {
    fn from(metrics: Metrics) -> Self {
        SamplePayload::Metrics(metrics)
    }
}

impl From<ErrorRecord> for SamplePayload {
    fn from(record: ErrorRecord) -> Self {
        SamplePayload::Error(record)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub cpu_usage_percent: f64,
    pub cpu_usage_per_core_percent: Vec<f64>,
    pub cpu_freq_current_mhz: u64,
    pub memory_total_gb: f64,
    pub memory_used_gb: f64,
    pub memory_percent: f64,
    pub disk_total_gb: f64,
    pub disk_used_gb: f64,
    pub disk_percent: f64,
    pub disk_usages: Vec<PartitionUsage>,
    pub network_stats: Vec<InterfaceStat>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionUsage {
    pub mountpoint: String,
    pub fstype: String,
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

/// Throughput and counter deltas of one interface over the rate window.
/// Deltas are signed: a counter reset between reads shows up negative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStat {
    pub interface: String,
    pub upload_mbps: f64,
    pub download_mbps: f64,
    pub errors_in: i64,
    pub errors_out: i64,
    pub dropped_in: i64,
    pub dropped_out: i64,
}
