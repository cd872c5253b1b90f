use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use super::source::{MetricSource, NetCounters};
use super::types::{round_to, InterfaceStat, BYTES_PER_MB};
use crate::error::SourceError;

/// Gap between the two counter reads of one rate measurement.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Per-interface throughput over a fixed one-second window.
pub struct RateSampler {
    source: Arc<dyn MetricSource>,
}

impl RateSampler {
    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        RateSampler { source }
    }

    /// Reads counters, waits [`RATE_WINDOW`], reads again and diffs.
    pub async fn measure(&self) -> Result<BTreeMap<String, InterfaceStat>, SourceError> {
        let before = self.source.net_io_counters_per_interface()?;
        sleep(RATE_WINDOW).await;
        let after = self.source.net_io_counters_per_interface()?;
        Ok(interface_deltas(&before, &after))
    }
}

/// Interfaces missing from either snapshot are left out.
pub fn interface_deltas(
    before: &HashMap<String, NetCounters>,
    after: &HashMap<String, NetCounters>,
) -> BTreeMap<String, InterfaceStat> {
    before
        .iter()
        .filter_map(|(name, t0)| {
            let t1 = after.get(name)?;
            Some((name.clone(), interface_stat(name, t0, t1)))
        })
        .collect()
}

fn interface_stat(name: &str, t0: &NetCounters, t1: &NetCounters) -> InterfaceStat {
    InterfaceStat {
        interface: name.to_string(),
        upload_mbps: mbps(t0.bytes_sent, t1.bytes_sent),
        download_mbps: mbps(t0.bytes_recv, t1.bytes_recv),
        errors_in: signed_delta(t0.errin, t1.errin),
        errors_out: signed_delta(t0.errout, t1.errout),
        dropped_in: signed_delta(t0.dropin, t1.dropin),
        dropped_out: signed_delta(t0.dropout, t1.dropout),
    }
}

fn mbps(bytes_t0: u64, bytes_t1: u64) -> f64 {
    round_to((bytes_t1 as f64 - bytes_t0 as f64) / BYTES_PER_MB * 8.0, 4)
}

fn signed_delta(t0: u64, t1: u64) -> i64 {
    t1.wrapping_sub(t0) as i64
}
