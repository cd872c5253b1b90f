pub mod anomaly;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod metrics;

pub use anomaly::{AnomalyDetector, AnomalyMonitor, AnomalyReport, DetectorSettings};
pub use config::MonitorConfig;
pub use error::{ConfigError, LoopError, SourceError};
pub use metrics::{
    Collector, HistoryStore, LoopState, MetricSource, Metrics, Sample, SamplePayload,
    SamplingLoop, SysinfoSource,
};
