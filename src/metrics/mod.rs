mod collector;
mod history;
mod network;
mod sampler;
pub mod source;
mod sysinfo_source;
#[cfg(test)]
mod tests;
mod types;

pub use collector::{is_real_filesystem, Collector, RoundTimer};
pub use history::HistoryStore;
pub use network::{interface_deltas, RateSampler, RATE_WINDOW};
pub use sampler::{LoopState, SamplingLoop};
pub use source::MetricSource;
pub use sysinfo_source::SysinfoSource;
pub use types::{
    bytes_to_gb, round_millis_to_secs, round_to, unix_now_secs, ErrorRecord, InterfaceStat,
    Metrics, PartitionUsage, Sample, SamplePayload,
};
