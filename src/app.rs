//! Application state and the monitor loop for vigil.
//!
//! This module contains the main [`App`] struct which wires the sampler,
//! the threshold guard, the mitigation primitive and the event log
//! together, and the background thread that drives them on the sampling
//! cadence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::Config;
use crate::events::{EventLog, EventRecord, LogError, Severity};
use crate::guard::{GuardThresholds, ThresholdGuard};
use crate::mitigation::{self, Mitigation};
use crate::sampler::Sampler;
use crate::snapshot::{MetricsSnapshot, SnapshotSlot};

/// Granularity of the shutdown check while waiting out the interval.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Unrecoverable failure during startup. The only error that may
/// terminate the process.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot open event log: {0}")]
    EventLog(#[from] LogError),
    #[error("terminal setup failed: {0}")]
    Terminal(#[from] std::io::Error),
}

/// Main application state.
///
/// Owns every component of the sampling-and-mitigation loop. The latest
/// snapshot is shared with the dashboard through the [`SnapshotSlot`];
/// everything else is private to the monitor loop.
pub struct App {
    pub config: Config,
    pub slot: Arc<SnapshotSlot>,
    sampler: Sampler,
    guard: ThresholdGuard,
    mitigation: Box<dyn Mitigation + Send>,
    event_log: EventLog,
}

impl App {
    /// Create the application, opening the event log.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::EventLog`] when the log file cannot be
    /// created or opened for appending - the one condition under which
    /// vigil refuses to start.
    pub fn new(config: Config) -> Result<Self, StartupError> {
        let event_log = EventLog::create(&config.log_file)?;
        let guard = ThresholdGuard::new(GuardThresholds {
            memory_enter: config.memory_threshold,
            memory_release: config.release_threshold,
            ..GuardThresholds::default()
        });
        let sampler = Sampler::new(config.process_refresh_ratio);

        Ok(Self {
            config,
            slot: Arc::new(SnapshotSlot::new()),
            sampler,
            guard,
            mitigation: mitigation::platform_default(),
            event_log,
        })
    }

    /// Run one monitor tick: sample, drive the guard, publish, log.
    ///
    /// Returns the snapshot just published. Steady-state log failures are
    /// reported on stderr and the loop continues; nothing here terminates
    /// the process.
    pub fn tick(&mut self) -> Arc<MetricsSnapshot> {
        let snapshot = self.sampler.sample();
        let events = self.guard.observe(&snapshot, self.mitigation.as_mut());
        let shared = self.slot.publish(snapshot);
        for record in &events {
            self.append_or_complain(record);
        }
        shared
    }

    /// Append a lifecycle marker to the event log.
    pub fn log_marker(&self, message: &str) {
        self.append_or_complain(&EventRecord::new(Severity::Info, message));
    }

    fn append_or_complain(&self, record: &EventRecord) {
        if let Err(e) = self.event_log.append(record) {
            // Degraded mode: the event is still visible on stderr.
            eprintln!("vigil: {e}");
        }
    }
}

/// Spawn the monitor loop on a background thread.
///
/// The loop samples on the configured interval until `running` is cleared,
/// then appends a shutdown marker and exits. Every append is flushed
/// before the loop proceeds, so an interrupt loses nothing.
pub fn spawn_monitor_loop(mut app: App, running: Arc<AtomicBool>) -> JoinHandle<()> {
    let interval = Duration::from_secs(app.config.interval_secs());
    std::thread::spawn(move || {
        app.log_marker("monitor started");
        while running.load(Ordering::Relaxed) {
            let started = Instant::now();
            app.tick();

            // Wait out the rest of the interval in small steps so shutdown
            // stays responsive even with long intervals.
            while started.elapsed() < interval && running.load(Ordering::Relaxed) {
                std::thread::sleep(SHUTDOWN_POLL.min(interval));
            }
        }
        app.log_marker("monitor stopped");
    })
}
