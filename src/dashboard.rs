//! Text and JSON views over the sample history, and the poll loop that
//! refreshes them.

use std::fmt::Write as _;
use std::future::Future;
use std::io;

use bytesize::ByteSize;
use log::debug;
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};

use crate::anomaly::{AnomalyMonitor, AnomalyReport};
use crate::config::DisplayConfig;
use crate::metrics::{HistoryStore, Sample, SamplePayload};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: i64,
    pub cpu_usage_percent: f64,
    pub memory_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardFrame {
    pub samples_total: usize,
    pub latest: Option<Sample>,
    /// CPU and memory series over the last `window` samples, oldest first.
    pub series: Vec<SeriesPoint>,
    pub anomaly: Option<AnomalyReport>,
    pub model_trained: bool,
}

impl DashboardFrame {
    /// Truncates a derived window only; the history itself is left alone.
    pub fn build(
        history: &[Sample],
        window: usize,
        anomaly: Option<AnomalyReport>,
        model_trained: bool,
    ) -> Self {
        let start = history.len().saturating_sub(window);
        let series = history[start..]
            .iter()
            .filter_map(|sample| {
                sample.metrics().map(|m| SeriesPoint {
                    timestamp: sample.timestamp,
                    cpu_usage_percent: m.cpu_usage_percent,
                    memory_percent: m.memory_percent,
                })
            })
            .collect();
        DashboardFrame {
            samples_total: history.len(),
            latest: history.last().cloned(),
            series,
            anomaly,
            model_trained,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let Some(latest) = &self.latest else {
            out.push_str("waiting for first sample...\n");
            return out;
        };

        let _ = writeln!(
            out,
            "[{}] samples={} window={}",
            latest.timestamp,
            self.samples_total,
            self.series.len()
        );
        match &latest.payload {
            SamplePayload::Error(record) => {
                let _ = writeln!(out, "  collection error: {}", record.error);
            }
            SamplePayload::Metrics(m) => {
                let _ = writeln!(
                    out,
                    "  cpu {:>6.2}% @ {} MHz ({} cores)",
                    m.cpu_usage_percent,
                    m.cpu_freq_current_mhz,
                    m.cpu_usage_per_core_percent.len()
                );
                let _ = writeln!(
                    out,
                    "  mem {:>6.2}% ({:.2} / {:.2} GB)",
                    m.memory_percent, m.memory_used_gb, m.memory_total_gb
                );
                let _ = writeln!(
                    out,
                    "  disk {:>5.2}% ({:.2} / {:.2} GB)",
                    m.disk_percent, m.disk_used_gb, m.disk_total_gb
                );
                for part in &m.disk_usages {
                    let _ = writeln!(
                        out,
                        "    {} [{}] {} / {} ({:.2}%)",
                        part.mountpoint,
                        part.fstype,
                        ByteSize::b(part.used_bytes),
                        ByteSize::b(part.total_bytes),
                        part.percent
                    );
                }
                for net in &m.network_stats {
                    let _ = writeln!(
                        out,
                        "    {} up {:.4} Mbit/s down {:.4} Mbit/s err {}/{} drop {}/{}",
                        net.interface,
                        net.upload_mbps,
                        net.download_mbps,
                        net.errors_in,
                        net.errors_out,
                        net.dropped_in,
                        net.dropped_out
                    );
                }
            }
        }

        match (&self.anomaly, self.model_trained) {
            (Some(report), true) => {
                let verdict = if report.is_anomaly { "ANOMALY" } else { "normal" };
                let _ = writeln!(out, "  anomaly score {:+.4} ({})", report.score, verdict);
            }
            _ => {
                let _ = writeln!(out, "  anomaly model: collecting training data");
            }
        }
        out
    }
}

/// Polls the history every `display.poll_interval()`, feeds the monitor and
/// writes one frame per tick until `shutdown` resolves. Returns the number of
/// frames written.
///
/// `shutdown` is polled before the ticker on every pass, so a ready shutdown
/// wins over a due tick.
pub async fn run_dashboard<W, F>(
    history: &HistoryStore,
    monitor: &mut AnomalyMonitor,
    display: &DisplayConfig,
    json: bool,
    out: &mut W,
    shutdown: F,
) -> io::Result<usize>
where
    W: io::Write,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = interval(display.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frames = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let snapshot = history.snapshot().await;
                let report = monitor.observe(&snapshot);
                let frame =
                    DashboardFrame::build(&snapshot, display.window, report, monitor.is_trained());
                if json {
                    serde_json::to_writer(&mut *out, &frame)?;
                    out.write_all(b"\n")?;
                } else {
                    out.write_all(frame.render().as_bytes())?;
                }
                out.flush()?;
                frames += 1;
            }
        }
    }

    debug!("dashboard stopped after {} frames", frames);
    Ok(frames)
}
