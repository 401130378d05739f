//! Vitals sampler for vigil.
//!
//! One [`Sampler::sample`] call per tick reads CPU, memory, disk, network
//! and process state through `sysinfo` and normalizes it into a
//! [`MetricsSnapshot`]. Network figures are reported as deltas against the
//! previous tick's cumulative counters. The process table is refreshed on a
//! reduced cadence (every Nth tick) because walking every process is by far
//! the most expensive sub-reading; the ranked list is cached in between.
//!
//! A sub-reading that fails (a disk unmounted mid-scan, a process gone
//! between enumeration and read) is omitted from the snapshot rather than
//! failing the whole sample.

use std::cmp::Ordering;

use chrono::Utc;
use sysinfo::{Disks, Networks, ProcessesToUpdate, System};

use crate::snapshot::{DiskUsage, MetricsSnapshot, ProcessInfo};

/// Maximum entries in the ranked top-process list.
const TOP_PROCESS_COUNT: usize = 5;

/// Collects one snapshot per tick, keeping the cross-tick state needed for
/// delta computation and the throttled process refresh.
pub struct Sampler {
    sys: System,
    disks: Disks,
    networks: Networks,
    /// Cumulative (sent, received) totals at the previous tick
    last_net_totals: Option<(u64, u64)>,
    /// Ranked list reused between process-table refreshes
    cached_top_processes: Vec<ProcessInfo>,
    /// Refresh the process table every this many ticks
    process_refresh_ratio: u64,
    tick: u64,
}

impl Sampler {
    /// Create a sampler.
    ///
    /// `process_refresh_ratio` of N means the process table is re-read on
    /// the first tick and then every Nth tick; 0 is treated as 1
    /// (every tick).
    pub fn new(process_refresh_ratio: u64) -> Self {
        Self {
            sys: System::new_all(),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            last_net_totals: None,
            cached_top_processes: Vec::new(),
            process_refresh_ratio: process_refresh_ratio.max(1),
            tick: 0,
        }
    }

    /// Collect one snapshot. Reads OS state only; mutates nothing beyond
    /// the sampler's own delta bookkeeping.
    pub fn sample(&mut self) -> MetricsSnapshot {
        self.tick += 1;
        let now = Utc::now();

        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        // === CPU ===
        let cpu_count = self.sys.cpus().len().max(1);
        let cpu_percent =
            self.sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / cpu_count as f32;
        let cpu_frequency_ghz = self
            .sys
            .cpus()
            .first()
            .map(|c| c.frequency() as f64 / 1000.0)
            .unwrap_or(0.0);

        // === Memory ===
        let memory_total_bytes = self.sys.total_memory();
        let memory_used_bytes = self.sys.used_memory();
        let memory_percent =
            MetricsSnapshot::derive_memory_percent(memory_used_bytes, memory_total_bytes);

        // === Disks ===
        self.disks.refresh(true);
        let disks = self
            .disks
            .list()
            .iter()
            .filter(|d| d.total_space() > 0)
            .map(|d| DiskUsage {
                mount_path: d.mount_point().display().to_string(),
                used_bytes: d.total_space().saturating_sub(d.available_space()),
                free_bytes: d.available_space(),
            })
            .collect();

        // === Network deltas ===
        self.networks.refresh(true);
        let mut sent_total = 0u64;
        let mut recv_total = 0u64;
        for (name, data) in &self.networks {
            if name == "lo" || name == "lo0" {
                continue;
            }
            sent_total += data.total_transmitted();
            recv_total += data.total_received();
        }
        let (net_sent_delta, net_recv_delta) = match self.last_net_totals {
            Some((last_sent, last_recv)) => (
                counter_delta(last_sent, sent_total),
                counter_delta(last_recv, recv_total),
            ),
            None => (0, 0),
        };
        self.last_net_totals = Some((sent_total, recv_total));

        // === Processes (throttled) ===
        if should_refresh_processes(self.tick, self.process_refresh_ratio) {
            self.sys.refresh_processes(ProcessesToUpdate::All, true);
            let candidates = self
                .sys
                .processes()
                .iter()
                .map(|(pid, process)| ProcessInfo {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                    cpu_percent: process.cpu_usage(),
                    memory_percent: if memory_total_bytes == 0 {
                        0.0
                    } else {
                        process.memory() as f32 / memory_total_bytes as f32 * 100.0
                    },
                })
                .collect();
            self.cached_top_processes = rank_processes(candidates);
        }

        MetricsSnapshot {
            timestamp: now.timestamp(),
            datetime: now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            tick: self.tick,
            cpu_percent,
            cpu_frequency_ghz,
            memory_used_bytes,
            memory_total_bytes,
            memory_percent,
            disks,
            net_sent_delta,
            net_recv_delta,
            top_processes: self.cached_top_processes.clone(),
        }
    }
}

/// Delta between two readings of a cumulative counter.
///
/// A counter reset on the source (interface re-created, driver reload)
/// yields 0 instead of a negative or wrapped-around value.
fn counter_delta(previous: u64, current: u64) -> u64 {
    current.saturating_sub(previous)
}

/// Whether the process table should be re-read on this tick.
///
/// Deterministic: the first tick always refreshes, then every `ratio`th
/// tick does.
fn should_refresh_processes(tick: u64, ratio: u64) -> bool {
    tick == 1 || tick % ratio == 0
}

/// Rank candidates by resource score and keep the top entries.
///
/// Score is `max(cpu_percent, memory_percent)`, descending, so a pure CPU
/// hog and a pure memory hog both surface. Ties break by pid ascending for
/// reproducible output.
fn rank_processes(mut candidates: Vec<ProcessInfo>) -> Vec<ProcessInfo> {
    candidates.sort_by(|a, b| {
        resource_score(b)
            .partial_cmp(&resource_score(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.pid.cmp(&b.pid))
    });
    candidates.truncate(TOP_PROCESS_COUNT);
    candidates
}

fn resource_score(process: &ProcessInfo) -> f32 {
    process.cpu_percent.max(process.memory_percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(pid: u32, cpu: f32, mem: f32) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: format!("proc-{pid}"),
            cpu_percent: cpu,
            memory_percent: mem,
        }
    }

    #[test]
    fn ranking_uses_max_of_cpu_and_memory() {
        let ranked = rank_processes(vec![
            process(1, 10.0, 2.0),
            process(2, 1.0, 50.0),
            process(3, 30.0, 1.0),
        ]);
        let pids: Vec<u32> = ranked.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![2, 3, 1]);
    }

    #[test]
    fn ranking_breaks_ties_by_pid_ascending() {
        let ranked = rank_processes(vec![
            process(42, 20.0, 5.0),
            process(7, 20.0, 5.0),
            process(19, 20.0, 5.0),
        ]);
        let pids: Vec<u32> = ranked.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![7, 19, 42]);
    }

    #[test]
    fn ranking_caps_the_list_at_five() {
        let candidates = (1..=9).map(|pid| process(pid, pid as f32, 0.0)).collect();
        let ranked = rank_processes(candidates);
        assert_eq!(ranked.len(), 5);
        let pids: Vec<u32> = ranked.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![9, 8, 7, 6, 5]);
    }

    #[test]
    fn ranking_survives_nan_scores() {
        let ranked = rank_processes(vec![
            process(1, f32::NAN, f32::NAN),
            process(2, 10.0, 0.0),
        ]);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn counter_delta_clamps_resets_to_zero() {
        assert_eq!(counter_delta(100, 250), 150);
        assert_eq!(counter_delta(100, 100), 0);
        // Counter reset: the new total is below the old one.
        assert_eq!(counter_delta(100, 30), 0);
    }

    #[test]
    fn process_refresh_cadence_is_deterministic() {
        let refreshed: Vec<u64> = (1..=12)
            .filter(|&tick| should_refresh_processes(tick, 4))
            .collect();
        assert_eq!(refreshed, vec![1, 4, 8, 12]);

        // Ratio 1 refreshes every tick.
        assert!((1..=5).all(|tick| should_refresh_processes(tick, 1)));
    }

    #[test]
    fn first_sample_reports_zero_network_deltas() {
        // Exercised against the real OS: whatever the counters say, the
        // first snapshot must report zero because there is no previous
        // reading to diff against.
        let mut sampler = Sampler::new(4);
        let snapshot = sampler.sample();
        assert_eq!(snapshot.net_sent_delta, 0);
        assert_eq!(snapshot.net_recv_delta, 0);
        assert_eq!(snapshot.tick, 1);
        assert!(snapshot.top_processes.len() <= TOP_PROCESS_COUNT);
    }
}
