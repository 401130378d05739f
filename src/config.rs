//! Command-line configuration for vigil.
//!
//! This module defines all CLI arguments using `clap` for parsing. The run
//! modes are thin dispatch: the default starts the monitor and dashboard,
//! `logs` follows the event log, and the generated `help` prints usage.

use clap::{Parser, Subcommand};

/// Resource guardian with automatic memory-trim mitigation.
///
/// vigil continuously samples host vitals, shows them on a live terminal
/// dashboard and watches for memory emergencies. When memory usage crosses
/// the threshold it asks the OS to release freeable memory, at most once
/// per emergency episode, and records every transition in a plain-text
/// event log.
///
/// # Examples
///
/// ```bash
/// # Start the monitor with the live dashboard (default)
/// vigil
///
/// # Follow the event log from another terminal
/// vigil logs
///
/// # Headless mode with a 5-second sampling interval
/// vigil --headless -i 5
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Watch host vitals and trim memory during emergencies")]
pub struct Config {
    #[command(subcommand)]
    pub mode: Option<Mode>,

    /// Interval in seconds between samples.
    ///
    /// Vitals are re-read this often; the process table is refreshed less
    /// frequently (see --process-refresh-ratio). Values below 1 are
    /// treated as 1.
    #[arg(short, long, default_value_t = 2)]
    pub interval: u64,

    /// Path to the event log file.
    ///
    /// Every guard transition and mitigation attempt is appended here, one
    /// line per event. `vigil logs` follows the same path.
    #[arg(short = 'l', long, default_value = "vigil.log")]
    pub log_file: String,

    /// Memory percentage that declares an emergency.
    #[arg(long, default_value_t = 90.0)]
    pub memory_threshold: f64,

    /// Memory percentage at or below which an emergency clears.
    ///
    /// Kept below the entry threshold to form a hysteresis band; a value
    /// above the entry threshold is clamped down to it.
    #[arg(long, default_value_t = 85.0)]
    pub release_threshold: f64,

    /// Refresh the process table every Nth sample.
    ///
    /// Walking every process is the most expensive sub-reading, so the
    /// ranked top-process list is only recomputed on this cadence and
    /// cached in between. 1 refreshes on every sample.
    #[arg(long, default_value_t = 4)]
    pub process_refresh_ratio: u64,

    /// Run in headless mode (no dashboard, one summary line per sample).
    ///
    /// Useful over SSH without terminal capabilities. Also forced
    /// automatically when stdout is not a TTY.
    #[arg(long)]
    pub headless: bool,
}

/// Alternative run modes.
#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Follow the event log, printing new lines until interrupted.
    Logs,
}

impl Config {
    /// Sampling interval with the minimum of one second applied.
    pub fn interval_secs(&self) -> u64 {
        self.interval.max(1)
    }
}
