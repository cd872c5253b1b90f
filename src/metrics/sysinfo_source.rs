use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use sysinfo::{Disks, Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::source::{
    percent_of, DiskUsage, MemoryUsage, MetricSource, NetCounters, Partition,
};
use crate::error::SourceError;

struct CpuState {
    system: System,
    last_refresh: Option<Instant>,
}

/// Local-host metric source backed by `sysinfo`.
pub struct SysinfoSource {
    cpu: Mutex<CpuState>,
    memory: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        SysinfoSource {
            cpu: Mutex::new(CpuState {
                system,
                last_refresh: Some(Instant::now()),
            }),
            memory: Mutex::new(System::new()),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }

    /// Overall and per-core figures share one refresh; a refresh sooner than
    /// sysinfo's minimum interval would only measure noise.
    fn cpu_state(&self) -> Result<MutexGuard<'_, CpuState>, SourceError> {
        let mut state = lock(&self.cpu, "cpu")?;
        let stale = state
            .last_refresh
            .map_or(true, |at| at.elapsed() >= MINIMUM_CPU_UPDATE_INTERVAL);
        if stale {
            state.system.refresh_cpu();
            state.last_refresh = Some(Instant::now());
        }
        Ok(state)
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &'static str) -> Result<MutexGuard<'a, T>, SourceError> {
    mutex.lock().map_err(|_| SourceError::LockPoisoned(name))
}

impl MetricSource for SysinfoSource {
    fn cpu_percent(&self) -> Result<f64, SourceError> {
        let state = self.cpu_state()?;
        if state.system.cpus().is_empty() {
            return Err(SourceError::query("cpu_percent", "cpu list empty"));
        }
        Ok(state.system.global_cpu_info().cpu_usage() as f64)
    }

    fn cpu_percent_per_core(&self) -> Result<Vec<f64>, SourceError> {
        let state = self.cpu_state()?;
        let cpus = state.system.cpus();
        if cpus.is_empty() {
            return Err(SourceError::query("cpu_percent_per_core", "cpu list empty"));
        }
        Ok(cpus.iter().map(|cpu| cpu.cpu_usage() as f64).collect())
    }

    fn cpu_frequency_mhz(&self) -> Result<f64, SourceError> {
        let state = self.cpu_state()?;
        state
            .system
            .cpus()
            .first()
            .map(|cpu| cpu.frequency() as f64)
            .ok_or_else(|| SourceError::query("cpu_frequency_mhz", "cpu list empty"))
    }

    fn virtual_memory(&self) -> Result<MemoryUsage, SourceError> {
        let mut system = lock(&self.memory, "memory")?;
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err(SourceError::query("virtual_memory", "total memory reported as 0"));
        }
        let used = system.used_memory();
        Ok(MemoryUsage {
            total,
            used,
            percent: percent_of(used, total),
        })
    }

    fn disk_usage(&self, path: &Path) -> Result<DiskUsage, SourceError> {
        let mut disks = lock(&self.disks, "disks")?;
        disks.refresh();
        // Longest matching mount point owns the path.
        let disk = disks
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .ok_or_else(|| SourceError::UnknownMount(path.to_path_buf()))?;
        let total = disk.total_space();
        let used = total.saturating_sub(disk.available_space());
        Ok(DiskUsage {
            total,
            used,
            percent: percent_of(used, total),
        })
    }

    fn disk_partitions(&self) -> Result<Vec<Partition>, SourceError> {
        let mut disks = lock(&self.disks, "disks")?;
        disks.refresh_list();
        Ok(disks
            .iter()
            .map(|disk| Partition {
                mountpoint: disk.mount_point().to_string_lossy().to_string(),
                fstype: disk.file_system().to_string_lossy().to_string(),
            })
            .collect())
    }

    fn net_io_counters_per_interface(&self) -> Result<HashMap<String, NetCounters>, SourceError> {
        let mut networks = lock(&self.networks, "networks")?;
        networks.refresh_list();
        let drops = read_drop_counters();
        Ok(networks
            .iter()
            .map(|(name, data)| {
                let (dropin, dropout) = drops.get(name).copied().unwrap_or((0, 0));
                let counters = NetCounters {
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    errin: data.total_errors_on_received(),
                    errout: data.total_errors_on_transmitted(),
                    dropin,
                    dropout,
                };
                (name.clone(), counters)
            })
            .collect())
    }
}

/// sysinfo has no drop counters; Linux exposes them in /proc/net/dev.
#[cfg(target_os = "linux")]
fn read_drop_counters() -> HashMap<String, (u64, u64)> {
    std::fs::read_to_string("/proc/net/dev")
        .map(|content| parse_proc_net_dev(&content))
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn read_drop_counters() -> HashMap<String, (u64, u64)> {
    HashMap::new()
}

/// Returns `(rx_drop, tx_drop)` per interface.
pub(crate) fn parse_proc_net_dev(content: &str) -> HashMap<String, (u64, u64)> {
    let mut drops = HashMap::new();
    // First two lines are column headers.
    for line in content.lines().skip(2) {
        let Some((name, fields)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<u64> = fields
            .split_whitespace()
            .filter_map(|field| field.parse().ok())
            .collect();
        if fields.len() < 12 {
            continue;
        }
        drops.insert(name.trim().to_string(), (fields[3], fields[11]));
    }
    drops
}
