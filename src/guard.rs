//! Memory emergency state machine for vigil.
//!
//! The guard consumes one [`MetricsSnapshot`] per tick and decides when the
//! host has entered or left a memory emergency. Entering triggers the
//! mitigation exactly once per episode; a hysteresis band between the enter
//! and release thresholds keeps noisy readings around the threshold from
//! flapping the state.
//!
//! The guard never writes the log itself: it returns the records for the
//! transition it just made and the monitor loop appends them, keeping the
//! state machine free of I/O and directly testable.

use chrono::{DateTime, Utc};

use crate::events::{EventRecord, Severity};
use crate::mitigation::Mitigation;
use crate::snapshot::MetricsSnapshot;

/// Threshold configuration for the guard.
#[derive(Clone, Copy, Debug)]
pub struct GuardThresholds {
    /// Memory percentage above which an emergency is declared
    pub memory_enter: f64,
    /// Memory percentage at or below which an emergency is cleared
    pub memory_release: f64,
    /// CPU percentage above which a high-CPU advisory is raised
    pub cpu_enter: f32,
    /// CPU percentage at or below which the advisory is cleared
    pub cpu_release: f32,
}

impl Default for GuardThresholds {
    fn default() -> Self {
        Self {
            memory_enter: 90.0,
            memory_release: 85.0,
            cpu_enter: 85.0,
            cpu_release: 80.0,
        }
    }
}

/// The two states of the memory guard.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum GuardState {
    /// Memory usage within bounds
    #[default]
    Normal,
    /// Sustained high memory; mitigation has been attempted for this episode
    Emergency,
}

/// Two-state machine driving emergency detection and mitigation.
pub struct ThresholdGuard {
    thresholds: GuardThresholds,
    state: GuardState,
    /// When the current emergency episode began
    entered_at: Option<DateTime<Utc>>,
    /// Set when the mitigation has run for this episode, reset on release
    mitigation_fired: bool,
    /// Latch for the high-CPU advisory (no mitigation attached)
    cpu_high: bool,
}

impl ThresholdGuard {
    /// Create a guard in the `Normal` state.
    ///
    /// The release threshold is clamped to the enter threshold so an
    /// inverted pair cannot disable the hysteresis band.
    pub fn new(thresholds: GuardThresholds) -> Self {
        let thresholds = GuardThresholds {
            memory_release: thresholds.memory_release.min(thresholds.memory_enter),
            cpu_release: thresholds.cpu_release.min(thresholds.cpu_enter),
            ..thresholds
        };
        Self {
            thresholds,
            state: GuardState::Normal,
            entered_at: None,
            mitigation_fired: false,
            cpu_high: false,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Feed one snapshot through the state machine.
    ///
    /// Returns the event records describing whatever happened this tick:
    /// empty for a steady state, a Warning plus the mitigation's Action
    /// outcome on emergency entry, an Info on release. The mitigation is
    /// invoked at most once per call and at most once per episode,
    /// regardless of whether it succeeds.
    pub fn observe(
        &mut self,
        snapshot: &MetricsSnapshot,
        mitigation: &mut dyn Mitigation,
    ) -> Vec<EventRecord> {
        let mut events = Vec::new();
        let memory = snapshot.memory_percent;

        match self.state {
            GuardState::Normal if memory > self.thresholds.memory_enter => {
                self.state = GuardState::Emergency;
                self.entered_at = Some(snapshot.timestamp_utc());
                events.push(EventRecord::new(
                    Severity::Warning,
                    format!(
                        "memory usage {memory:.1}% exceeded {:.0}% threshold",
                        self.thresholds.memory_enter
                    ),
                ));

                if !self.mitigation_fired {
                    self.mitigation_fired = true;
                    let outcome = match mitigation.trigger() {
                        Ok(()) => format!("memory trim completed via {}", mitigation.describe()),
                        Err(e) => format!("memory trim failed: {e}"),
                    };
                    events.push(EventRecord::new(Severity::Action, outcome));
                }
            }
            GuardState::Emergency if memory <= self.thresholds.memory_release => {
                let episode_secs = self
                    .entered_at
                    .take()
                    .map(|since| (snapshot.timestamp_utc() - since).num_seconds().max(0))
                    .unwrap_or(0);
                self.state = GuardState::Normal;
                self.mitigation_fired = false;
                events.push(EventRecord::new(
                    Severity::Info,
                    format!(
                        "memory usage {memory:.1}% back at or under {:.0}%, \
                         emergency cleared after {episode_secs}s",
                        self.thresholds.memory_release
                    ),
                ));
            }
            // Still breaching or still recovering inside the hysteresis
            // band; the episode continues silently.
            _ => {}
        }

        let cpu = snapshot.cpu_percent;
        if !self.cpu_high && cpu > self.thresholds.cpu_enter {
            self.cpu_high = true;
            events.push(EventRecord::new(
                Severity::Warning,
                format!("high CPU usage: {cpu:.1}%"),
            ));
        } else if self.cpu_high && cpu <= self.thresholds.cpu_release {
            self.cpu_high = false;
            events.push(EventRecord::new(
                Severity::Info,
                format!("CPU usage normalized at {cpu:.1}%"),
            ));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mitigation::MitigationError;

    /// Scripted mitigation that records how often it was invoked.
    struct MockMitigation {
        calls: u32,
        results: Vec<Result<(), MitigationError>>,
    }

    impl MockMitigation {
        fn succeeding() -> Self {
            Self {
                calls: 0,
                results: Vec::new(),
            }
        }

        fn failing_once() -> Self {
            Self {
                calls: 0,
                results: vec![Err(MitigationError::Unsupported)],
            }
        }
    }

    impl Mitigation for MockMitigation {
        fn trigger(&mut self) -> Result<(), MitigationError> {
            self.calls += 1;
            if self.results.is_empty() {
                Ok(())
            } else {
                self.results.remove(0)
            }
        }

        fn describe(&self) -> &'static str {
            "mock"
        }
    }

    fn snapshot(memory_percent: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            memory_percent,
            ..Default::default()
        }
    }

    fn guard() -> ThresholdGuard {
        ThresholdGuard::new(GuardThresholds::default())
    }

    #[test]
    fn spike_scenario_fires_mitigation_exactly_once() {
        let mut guard = guard();
        let mut mitigation = MockMitigation::succeeding();

        let mut transitions = Vec::new();
        for reading in [70.0, 92.0, 95.0, 93.0, 84.0, 86.0, 70.0] {
            let events = guard.observe(&snapshot(reading), &mut mitigation);
            if !events.is_empty() {
                transitions.push((reading, guard.state()));
            }
        }

        // Emergency enters at 92, mitigation fires there and only there,
        // and the release happens at 84 (the first reading <= 85), not at
        // 86 and not at the final 70.
        assert_eq!(mitigation.calls, 1);
        assert_eq!(
            transitions,
            vec![(92.0, GuardState::Emergency), (84.0, GuardState::Normal)]
        );
    }

    #[test]
    fn mitigation_fires_iff_breach_happens_while_normal() {
        let mut guard = guard();
        let mut mitigation = MockMitigation::succeeding();

        // Repeated breaches inside one episode do not re-fire.
        for reading in [95.0, 97.0, 99.0, 91.0] {
            guard.observe(&snapshot(reading), &mut mitigation);
        }
        assert_eq!(mitigation.calls, 1);
        assert_eq!(guard.state(), GuardState::Emergency);

        // A new episode after a full release fires again.
        guard.observe(&snapshot(50.0), &mut mitigation);
        assert_eq!(guard.state(), GuardState::Normal);
        guard.observe(&snapshot(96.0), &mut mitigation);
        assert_eq!(mitigation.calls, 2);
    }

    #[test]
    fn hysteresis_band_prevents_flapping() {
        let mut guard = guard();
        let mut mitigation = MockMitigation::succeeding();

        guard.observe(&snapshot(92.0), &mut mitigation);
        assert_eq!(guard.state(), GuardState::Emergency);

        // Readings between release (85) and enter (90) keep the episode
        // open in both directions.
        for reading in [89.0, 86.0, 88.0, 91.0, 87.0] {
            let events = guard.observe(&snapshot(reading), &mut mitigation);
            assert!(events.is_empty());
            assert_eq!(guard.state(), GuardState::Emergency);
        }

        guard.observe(&snapshot(85.0), &mut mitigation);
        assert_eq!(guard.state(), GuardState::Normal);
        assert_eq!(mitigation.calls, 1);
    }

    #[test]
    fn failed_mitigation_is_logged_and_not_retried() {
        let mut guard = guard();
        let mut mitigation = MockMitigation::failing_once();

        let events = guard.observe(&snapshot(94.0), &mut mitigation);
        assert_eq!(guard.state(), GuardState::Emergency);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].severity, Severity::Warning);
        assert_eq!(events[1].severity, Severity::Action);
        assert!(events[1].message.contains("failed"));

        // Still breaching: no retry within the episode.
        let events = guard.observe(&snapshot(95.0), &mut mitigation);
        assert!(events.is_empty());
        assert_eq!(mitigation.calls, 1);
    }

    #[test]
    fn release_event_reports_episode_duration() {
        let mut guard = guard();
        let mut mitigation = MockMitigation::succeeding();

        let enter = MetricsSnapshot {
            memory_percent: 93.0,
            timestamp: 1_000,
            ..Default::default()
        };
        let release = MetricsSnapshot {
            memory_percent: 60.0,
            timestamp: 1_042,
            ..Default::default()
        };

        guard.observe(&enter, &mut mitigation);
        let events = guard.observe(&release, &mut mitigation);
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("cleared after 42s"));
    }

    #[test]
    fn inverted_release_threshold_is_clamped() {
        let mut guard = ThresholdGuard::new(GuardThresholds {
            memory_enter: 90.0,
            memory_release: 95.0,
            ..GuardThresholds::default()
        });
        let mut mitigation = MockMitigation::succeeding();

        guard.observe(&snapshot(92.0), &mut mitigation);
        assert_eq!(guard.state(), GuardState::Emergency);
        // 92 is above the configured (inverted) release of 95 clamped to 90,
        // so the episode stays open instead of clearing on the same reading.
        let events = guard.observe(&snapshot(92.0), &mut mitigation);
        assert!(events.is_empty());
        assert_eq!(guard.state(), GuardState::Emergency);
    }

    #[test]
    fn cpu_advisory_latches_without_mitigation() {
        let mut guard = guard();
        let mut mitigation = MockMitigation::succeeding();

        let events = guard.observe(
            &MetricsSnapshot {
                cpu_percent: 91.0,
                memory_percent: 40.0,
                ..Default::default()
            },
            &mut mitigation,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Warning);
        assert_eq!(mitigation.calls, 0);

        // Inside the CPU band: silent.
        let events = guard.observe(
            &MetricsSnapshot {
                cpu_percent: 83.0,
                memory_percent: 40.0,
                ..Default::default()
            },
            &mut mitigation,
        );
        assert!(events.is_empty());

        let events = guard.observe(
            &MetricsSnapshot {
                cpu_percent: 60.0,
                memory_percent: 40.0,
                ..Default::default()
            },
            &mut mitigation,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Info);
    }
}
