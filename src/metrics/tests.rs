#![cfg(test)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};

use super::source::{DiskUsage, MemoryUsage, NetCounters, Partition};
use super::sysinfo_source::parse_proc_net_dev;
use super::{
    bytes_to_gb, interface_deltas, is_real_filesystem, round_millis_to_secs, round_to, Collector,
    HistoryStore, LoopState, MetricSource, RateSampler, Sample, SamplePayload, SamplingLoop,
    SysinfoSource, RATE_WINDOW,
};
use crate::error::{LoopError, SourceError};

const GIB: u64 = 1024 * 1024 * 1024;

fn counters(sent: u64, recv: u64) -> NetCounters {
    NetCounters {
        bytes_sent: sent,
        bytes_recv: recv,
        ..Default::default()
    }
}

fn snapshot(entries: &[(&str, NetCounters)]) -> HashMap<String, NetCounters> {
    entries
        .iter()
        .map(|(name, c)| (name.to_string(), *c))
        .collect()
}

/// Replays queued network snapshots; everything else is fixed.
struct ScriptedSource {
    net: Mutex<VecDeque<HashMap<String, NetCounters>>>,
    partitions: Vec<Partition>,
    fail_disk: bool,
}

impl ScriptedSource {
    fn new() -> Self {
        ScriptedSource {
            net: Mutex::new(VecDeque::new()),
            partitions: vec![
                Partition {
                    mountpoint: "/".into(),
                    fstype: "ext4".into(),
                },
                Partition {
                    mountpoint: "/run".into(),
                    fstype: "tmpfs".into(),
                },
                Partition {
                    mountpoint: "/mnt/cdrom".into(),
                    fstype: "".into(),
                },
                Partition {
                    mountpoint: "/boot".into(),
                    fstype: "vfat".into(),
                },
            ],
            fail_disk: false,
        }
    }

    fn failing_disk() -> Self {
        ScriptedSource {
            fail_disk: true,
            ..Self::new()
        }
    }

    fn with_net(self, snapshots: Vec<HashMap<String, NetCounters>>) -> Self {
        *self.net.lock().unwrap() = snapshots.into();
        self
    }
}

impl MetricSource for ScriptedSource {
    fn cpu_percent(&self) -> Result<f64, SourceError> {
        Ok(12.3456)
    }

    fn cpu_percent_per_core(&self) -> Result<Vec<f64>, SourceError> {
        Ok(vec![10.004, 14.6871])
    }

    fn cpu_frequency_mhz(&self) -> Result<f64, SourceError> {
        Ok(2399.6)
    }

    fn virtual_memory(&self) -> Result<MemoryUsage, SourceError> {
        Ok(MemoryUsage {
            total: 8 * GIB,
            used: 2 * GIB,
            percent: 25.0,
        })
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage, SourceError> {
        if self.fail_disk {
            return Err(SourceError::query("disk_usage", "device not ready"));
        }
        let total = if path == Path::new("/boot") { GIB } else { 100 * GIB };
        Ok(DiskUsage {
            total,
            used: total / 4,
            percent: 25.0,
        })
    }

    fn disk_partitions(&self) -> Result<Vec<Partition>, SourceError> {
        Ok(self.partitions.clone())
    }

    fn net_io_counters_per_interface(&self) -> Result<HashMap<String, NetCounters>, SourceError> {
        let mut queue = self.net.lock().unwrap();
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }
}

#[test]
fn throughput_is_megabits_over_the_window() {
    let before = snapshot(&[("eth0", counters(1_000, 5_000))]);
    let after = snapshot(&[("eth0", counters(1_000 + 1_048_576, 5_000 + 3_000_000))]);
    let stats = interface_deltas(&before, &after);
    let eth0 = &stats["eth0"];

    assert_eq!(eth0.interface, "eth0");
    assert_eq!(eth0.upload_mbps, 8.0);
    assert_eq!(
        eth0.download_mbps,
        round_to(3_000_000.0 / 1_048_576.0 * 8.0, 4)
    );
    assert_eq!(eth0.download_mbps, 22.8882);
}

#[test]
fn interfaces_missing_from_either_snapshot_are_dropped() {
    let before = snapshot(&[("eth0", counters(0, 0)), ("wg0", counters(0, 0))]);
    let after = snapshot(&[("eth0", counters(10, 10)), ("usb0", counters(0, 0))]);
    let stats = interface_deltas(&before, &after);

    assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["eth0"]);
}

#[test]
fn counter_resets_produce_negative_deltas() {
    let before = snapshot(&[(
        "eth0",
        NetCounters {
            errin: 10,
            errout: 3,
            dropin: 7,
            dropout: 0,
            ..Default::default()
        },
    )]);
    let after = snapshot(&[(
        "eth0",
        NetCounters {
            errin: 4,
            errout: 5,
            dropin: 0,
            dropout: 2,
            ..Default::default()
        },
    )]);
    let eth0 = interface_deltas(&before, &after).remove("eth0").unwrap();

    assert_eq!(eth0.errors_in, -6);
    assert_eq!(eth0.errors_out, 2);
    assert_eq!(eth0.dropped_in, -7);
    assert_eq!(eth0.dropped_out, 2);
}

#[test]
fn proc_net_dev_drop_columns() {
    let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000      10    0    0    0     0          0         0     1000      10    0    0    0     0       0          0
  eth0: 98765    432    1    17   0     0          0         3    12345     321    0    4    0     0       0          0
";
    let drops = parse_proc_net_dev(content);
    assert_eq!(drops.get("lo"), Some(&(0, 0)));
    assert_eq!(drops.get("eth0"), Some(&(17, 4)));
}

#[test]
fn unit_conversions_and_rounding() {
    assert_eq!(bytes_to_gb(2 * GIB), 2.0);
    assert_eq!(bytes_to_gb(GIB / 3), 0.3333);
    assert_eq!(round_to(12.3456, 2), 12.35);
    assert!(is_real_filesystem("ext4"));
    assert!(is_real_filesystem("apfs"));
    assert!(!is_real_filesystem(""));
    assert!(!is_real_filesystem("tmpfs"));
    assert!(!is_real_filesystem("proc"));
}

#[test]
fn timestamps_round_to_nearest_second() {
    assert_eq!(round_millis_to_secs(1_791_971_069_470), 1_791_971_069);
    assert_eq!(round_millis_to_secs(1_791_971_069_500), 1_791_971_070);
    assert_eq!(round_millis_to_secs(1_499), 1);
    assert_eq!(round_millis_to_secs(0), 0);
}

#[tokio::test(start_paused = true)]
async fn rate_measurement_blocks_for_the_window() {
    let source = ScriptedSource::new().with_net(vec![
        snapshot(&[("eth0", counters(0, 0))]),
        snapshot(&[("eth0", counters(524_288, 0))]),
    ]);
    let sampler = RateSampler::new(Arc::new(source));

    let started = Instant::now();
    let stats = sampler.measure().await.unwrap();
    assert!(started.elapsed() >= RATE_WINDOW);
    assert_eq!(stats["eth0"].upload_mbps, 4.0);
    assert_eq!(stats["eth0"].download_mbps, 0.0);
}

#[tokio::test(start_paused = true)]
async fn collector_builds_rounded_metrics() {
    let source = ScriptedSource::new().with_net(vec![
        snapshot(&[("eth0", counters(0, 0)), ("lo", counters(0, 0))]),
        snapshot(&[("eth0", counters(1_048_576, 2_097_152)), ("lo", counters(5, 5))]),
    ]);
    let collector = Collector::new(Arc::new(source));

    let SamplePayload::Metrics(metrics) = collector.collect_sample().await else {
        panic!("expected metrics");
    };
    assert_eq!(metrics.cpu_usage_percent, 12.35);
    assert_eq!(metrics.cpu_usage_per_core_percent, vec![10.0, 14.69]);
    assert_eq!(metrics.cpu_freq_current_mhz, 2400);
    assert_eq!(metrics.memory_total_gb, 8.0);
    assert_eq!(metrics.memory_used_gb, 2.0);
    assert_eq!(metrics.memory_percent, 25.0);
    assert_eq!(metrics.disk_total_gb, 100.0);
    assert_eq!(metrics.disk_used_gb, 25.0);

    let mounts: Vec<&str> = metrics
        .disk_usages
        .iter()
        .map(|p| p.mountpoint.as_str())
        .collect();
    assert_eq!(mounts, vec!["/", "/boot"]);
    assert_eq!(metrics.disk_usages[1].total_bytes, GIB);

    let names: Vec<&str> = metrics
        .network_stats
        .iter()
        .map(|s| s.interface.as_str())
        .collect();
    assert_eq!(names, vec!["eth0", "lo"]);
    assert_eq!(metrics.network_stats[0].upload_mbps, 8.0);
    assert_eq!(metrics.network_stats[0].download_mbps, 16.0);
}

#[tokio::test(start_paused = true)]
async fn collector_turns_source_failure_into_error_record() {
    let collector = Collector::new(Arc::new(ScriptedSource::failing_disk()));
    match collector.collect_sample().await {
        SamplePayload::Error(record) => {
            assert!(!record.error.is_empty());
            assert!(record.error.contains("disk_usage"));
        }
        SamplePayload::Metrics(_) => panic!("expected an error record"),
    }
}

#[tokio::test]
async fn history_snapshot_is_point_in_time() {
    let history = HistoryStore::new();
    assert!(history.latest().await.is_none());
    assert!(history.is_empty().await);

    history.append(Sample::new(1, SamplePayload::Metrics(Default::default()))).await;
    let snap = history.snapshot().await;
    history.append(Sample::new(2, SamplePayload::Metrics(Default::default()))).await;

    assert_eq!(snap.len(), 1);
    assert_eq!(history.len().await, 2);
    assert_eq!(history.latest().await.map(|s| s.timestamp), Some(2));
}

fn sampling_loop(source: ScriptedSource, run_interval: Duration) -> SamplingLoop {
    let collector = Arc::new(Collector::new(Arc::new(source)));
    SamplingLoop::new(collector, HistoryStore::new(), run_interval)
}

#[tokio::test(start_paused = true)]
async fn loop_cadence_counts_collection_time() {
    let sampler = sampling_loop(ScriptedSource::new(), Duration::from_secs(2));
    assert_eq!(sampler.state(), LoopState::Idle);
    sampler.start().unwrap();
    assert_eq!(sampler.state(), LoopState::Running);

    // Rounds finish at t=1, 3 and 5 with a 2s total cycle.
    sleep(Duration::from_millis(5_500)).await;
    assert_eq!(sampler.history().len().await, 3);

    sampler.stop();
    sampler.join().await;
    assert_eq!(sampler.state(), LoopState::Stopped);
    assert_eq!(sampler.history().len().await, 3);

    let snap = sampler.history().snapshot().await;
    assert!(snap.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test(start_paused = true)]
async fn stop_during_sleep_phase_appends_nothing_more() {
    let sampler = sampling_loop(ScriptedSource::new(), Duration::from_secs(10));
    sampler.start().unwrap();
    sampler.wait_until_ready().await;
    sleep(Duration::from_millis(500)).await;
    assert_eq!(sampler.history().len().await, 1);

    sampler.stop();
    timeout(Duration::from_secs(9), sampler.join())
        .await
        .expect("loop did not stop within the remaining sleep");
    assert_eq!(sampler.state(), LoopState::Stopped);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(sampler.history().len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn failing_rounds_still_append_samples() {
    let sampler = sampling_loop(ScriptedSource::failing_disk(), Duration::from_secs(1));
    sampler.start().unwrap();

    // Failed rounds return at once, so samples land at t=0, 1 and 2.
    sleep(Duration::from_millis(2_500)).await;
    sampler.stop();
    sampler.join().await;

    let snap = sampler.history().snapshot().await;
    assert_eq!(snap.len(), 3);
    assert!(snap.iter().all(Sample::is_error));
}

#[tokio::test(start_paused = true)]
async fn loop_cannot_be_started_twice() {
    let sampler = sampling_loop(ScriptedSource::new(), Duration::from_secs(1));
    sampler.start().unwrap();
    assert!(matches!(
        sampler.start(),
        Err(LoopError::AlreadyStarted(LoopState::Running))
    ));
    sampler.stop();
    sampler.join().await;
    assert!(matches!(
        sampler.start(),
        Err(LoopError::AlreadyStarted(LoopState::Stopped))
    ));
}

#[test]
fn stopping_an_idle_loop_skips_running() {
    let sampler = sampling_loop(ScriptedSource::new(), Duration::from_secs(1));
    sampler.stop();
    assert_eq!(sampler.state(), LoopState::Stopped);
    assert!(sampler.start().is_err());
}

#[tokio::test]
async fn live_source_produces_a_sample() {
    let collector = Arc::new(Collector::new(Arc::new(SysinfoSource::new())));
    let sampler = SamplingLoop::new(collector, HistoryStore::new(), Duration::from_secs(1));
    sampler.start().unwrap();

    timeout(Duration::from_secs(10), sampler.wait_until_ready())
        .await
        .expect("sampler did not produce data in time");
    let latest = sampler.history().latest().await.expect("one sample");
    let age = chrono::Utc::now().timestamp() - latest.timestamp;
    assert!(age < 5, "sample too old: {}s", age);

    sampler.stop();
    sampler.join().await;
}

#[tokio::test]
async fn sample_is_stamped_at_round_start() {
    let collector = Arc::new(Collector::new(Arc::new(SysinfoSource::new())));
    let sampler = SamplingLoop::new(collector, HistoryStore::new(), Duration::from_secs(1));
    let started_ms = chrono::Utc::now().timestamp_millis();
    sampler.start().unwrap();

    timeout(Duration::from_secs(10), sampler.wait_until_ready())
        .await
        .expect("sampler did not produce data in time");
    sampler.stop();
    sampler.join().await;

    let first = sampler.history().snapshot().await.remove(0);
    // Nearest-second rounding moves the stamp by at most 500ms; allow
    // another 250ms for the task to be scheduled.
    assert!(
        first.timestamp * 1000 <= started_ms + 750,
        "round started at {} ms, sample stamped {} s",
        started_ms,
        first.timestamp
    );
    assert!(first.timestamp * 1000 >= started_ms - 500);
}
