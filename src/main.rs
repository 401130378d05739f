//! # vigil
//!
//! A local, always-on resource guardian.
//!
//! ## Overview
//!
//! `vigil` continuously samples host vitals and renders them as a live
//! terminal dashboard. Its real job, though, is standing guard over
//! memory: when usage crosses the emergency threshold it asks the OS to
//! release freeable memory - at most once per emergency episode - and
//! records every detection and mitigation in a durable, human-readable
//! event log that can be tailed in real time.
//!
//! ## Features
//!
//! - **Vitals sampling**: CPU, memory, disks, network throughput and a
//!   ranked top-process list, on a fixed cadence
//! - **Emergency detection**: threshold state machine with a hysteresis
//!   band so noisy readings cannot flap the state
//! - **Automatic mitigation**: platform memory-trim primitive, invoked
//!   exactly once per episode, failures logged and never fatal
//! - **Event log**: append-only plain-text log, flushed per line, safe to
//!   tail from another process
//! - **TUI Dashboard**: real-time terminal UI, plus a headless mode
//!
//! ## Usage
//!
//! ```bash
//! # Start the monitor with the live dashboard (default)
//! vigil
//!
//! # Follow the event log from another terminal
//! vigil logs
//!
//! # Headless mode with a custom threshold
//! vigil --headless --memory-threshold 80
//! ```
//!
//! ## Module Organization
//!
//! - [`config`]: CLI argument parsing and run modes
//! - [`snapshot`]: Snapshot data structures and the shared latest-value slot
//! - [`sampler`]: Periodic vitals collection
//! - [`guard`]: Emergency threshold state machine
//! - [`mitigation`]: Platform memory-trim primitives
//! - [`events`]: Event log writer and tailer
//! - [`app`]: Application state and the monitor loop
//! - [`ui`]: Terminal user interface and headless output

mod app;
mod config;
mod events;
mod guard;
mod mitigation;
mod sampler;
mod snapshot;
mod ui;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use app::{App, StartupError};
use config::{Config, Mode};
use events::LogTailer;

fn main() -> ExitCode {
    let config = Config::parse();

    let running = Arc::new(AtomicBool::new(true));
    setup_signal_handler(running.clone());

    match run(config, running) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("vigil: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Thin run-mode dispatch; the logic lives in the core modules.
fn run(config: Config, running: Arc<AtomicBool>) -> Result<(), StartupError> {
    match config.mode {
        Some(Mode::Logs) => follow_logs(&config, &running),
        None => run_monitor(config, running),
    }
}

/// `vigil logs`: follow the event log until interrupted.
fn follow_logs(config: &Config, running: &AtomicBool) -> Result<(), StartupError> {
    println!("Following {} (Ctrl+C to stop)...", config.log_file);
    let mut tailer = LogTailer::from_end(&config.log_file);
    tailer.follow(running, |line| println!("{line}"))?;
    Ok(())
}

/// Default mode: monitor loop plus dashboard (or headless summary lines).
fn run_monitor(config: Config, running: Arc<AtomicBool>) -> Result<(), StartupError> {
    let app = App::new(config.clone())?;

    // Check if stdout is a TTY - if not, force headless mode
    let use_headless = config.headless || !is_terminal();
    if !config.headless && !is_terminal() {
        eprintln!("Warning: stdout is not a TTY, running in headless mode");
    }

    if use_headless {
        ui::run_headless(app, running)?;
        return Ok(());
    }

    let slot = app.slot.clone();
    let interval = Duration::from_secs(config.interval_secs());
    // Position the tailer before the monitor starts writing so the
    // dashboard sees this session's first events.
    let tailer = LogTailer::from_end(&config.log_file);

    let monitor = app::spawn_monitor_loop(app, running.clone());
    let result = ui::run(slot, tailer, running.clone(), interval);

    // The UI has exited (quit key or signal); stop the monitor loop and
    // wait for its final flushed append before leaving.
    running.store(false, Ordering::Relaxed);
    let _ = monitor.join();

    result?;
    Ok(())
}

/// Global flag for signal handler (must be static for signal safety).
static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Set up signal handlers for graceful shutdown.
fn setup_signal_handler(running: Arc<AtomicBool>) {
    // Spawn a thread to monitor the signal flag and propagate to running
    let running_clone = running.clone();
    std::thread::spawn(move || {
        while running_clone.load(Ordering::Relaxed) {
            if SIGNAL_RECEIVED.load(Ordering::Relaxed) {
                running_clone.store(false, Ordering::Relaxed);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    });

    unsafe {
        libc::signal(
            libc::SIGINT,
            signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            signal_handler as *const () as libc::sighandler_t,
        );
    }
}

/// Signal handler that sets the signal flag (async-signal-safe).
extern "C" fn signal_handler(_: i32) {
    SIGNAL_RECEIVED.store(true, Ordering::Relaxed);
}

/// Check if stdout is connected to a terminal.
fn is_terminal() -> bool {
    unsafe { libc::isatty(libc::STDOUT_FILENO) != 0 }
}
