//! Snapshot data structures for vigil.
//!
//! This module defines the [`MetricsSnapshot`] struct which holds one
//! sampling pass's readings, as well as the [`SnapshotSlot`] used to share
//! the most recent snapshot between the monitor loop and the dashboard.

use std::sync::{Arc, Mutex};

/// Usage figures for a single mounted filesystem.
#[derive(Clone, Debug)]
pub struct DiskUsage {
    /// Mount point (e.g. "/" or "/home")
    pub mount_path: String,
    /// Bytes in use
    pub used_bytes: u64,
    /// Bytes still free
    pub free_bytes: u64,
}

impl DiskUsage {
    /// Used fraction of the filesystem as a percentage.
    pub fn used_percent(&self) -> f64 {
        let total = self.used_bytes + self.free_bytes;
        if total == 0 {
            0.0
        } else {
            self.used_bytes as f64 / total as f64 * 100.0
        }
    }
}

/// One entry of the ranked top-process list.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessInfo {
    /// Process identifier
    pub pid: u32,
    /// Executable name
    pub name: String,
    /// CPU usage (0-100, may exceed 100 on multi-core hosts)
    pub cpu_percent: f32,
    /// Share of total physical memory (0-100)
    pub memory_percent: f32,
}

/// Complete snapshot of host vitals at a point in time.
///
/// Immutable once constructed; the sampler that produced it hands out
/// read-only [`Arc`] copies through the [`SnapshotSlot`].
///
/// # Field Categories
///
/// - **Timestamps**: Wall clock plus the monotonic sampling tick
/// - **CPU**: Average usage across cores and current frequency
/// - **Memory**: Used/total bytes with the derived percentage
/// - **Disks**: Per-mount usage, in enumeration order
/// - **Network**: Byte deltas since the previous snapshot
/// - **Processes**: Top 5 by resource score
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    /// Unix timestamp (seconds since epoch)
    pub timestamp: i64,
    /// ISO 8601 formatted datetime string
    pub datetime: String,
    /// Monotonic sampling tick, 1 for the first sample
    pub tick: u64,

    /// Average CPU usage across all cores (0-100%)
    pub cpu_percent: f32,
    /// Current CPU frequency in GHz (0 if unavailable)
    pub cpu_frequency_ghz: f64,

    /// Physical memory in use, in bytes
    pub memory_used_bytes: u64,
    /// Total physical memory, in bytes
    pub memory_total_bytes: u64,
    /// Memory usage percentage, always derived from used/total
    pub memory_percent: f64,

    /// Per-filesystem usage; a mount whose reading failed is omitted
    pub disks: Vec<DiskUsage>,

    /// Bytes sent since the previous snapshot (0 on the first sample)
    pub net_sent_delta: u64,
    /// Bytes received since the previous snapshot (0 on the first sample)
    pub net_recv_delta: u64,

    /// Top processes by resource score, at most 5 entries
    pub top_processes: Vec<ProcessInfo>,
}

impl MetricsSnapshot {
    /// Derive the memory percentage from used/total bytes.
    ///
    /// The percentage is never read from the OS directly so it cannot
    /// drift from the byte counters it is displayed next to.
    pub fn derive_memory_percent(used_bytes: u64, total_bytes: u64) -> f64 {
        if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        }
    }

    /// Wall-clock timestamp of this snapshot as a chrono value.
    pub fn timestamp_utc(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(self.timestamp, 0).unwrap_or_else(chrono::Utc::now)
    }
}

/// Latest-value slot shared between the monitor loop and the dashboard.
///
/// Single writer (the monitor loop), any number of readers. Readers always
/// get whatever snapshot is current; there is no queue and a reader seeing
/// the same snapshot twice is expected.
#[derive(Default)]
pub struct SnapshotSlot {
    inner: Mutex<Option<Arc<MetricsSnapshot>>>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot contents with a fresh snapshot.
    ///
    /// Returns the shared handle so the publisher can keep using the
    /// snapshot it just produced without re-locking.
    pub fn publish(&self, snapshot: MetricsSnapshot) -> Arc<MetricsSnapshot> {
        let shared = Arc::new(snapshot);
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(shared.clone());
        shared
    }

    /// Current snapshot, if at least one has been published.
    pub fn latest(&self) -> Option<Arc<MetricsSnapshot>> {
        let slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        slot.clone()
    }
}
