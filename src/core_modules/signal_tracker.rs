// THEORY:
// A `SignalTracker` turns a flickering per-cycle boolean ("did the detector see
// it this time?") into a stable alert. It is the hysteresis layer between the
// detectors and the alarm.
//
// State machine:
//
//     Idle ──seen──▶ Pending ──seen for >= persistence──▶ Active
//       ▲               │                                    │
//       └──gap > debounce┘            silent for > silence ──┘ (back to Idle)
//
// - `first_seen_at` starts the persistence window. A short gap (a single missed
//   detection) does not reset it; only a gap longer than `debounce_gap` does.
// - `last_seen_at` drives both the debounce and the silence window.
// - `active` only rises when the caller says the alarm gate is open (i.e. the
//   user's dismissal cooldown has lapsed). Timers keep running while it is closed,
//   so a signal that is still there when the cooldown ends re-triggers at once.
// - `silence = None` means the tracker never stands down on its own; it must be
//   cleared explicitly (dismiss / reset).
//
// The same machine serves the weapon signal (1 s to arm, 5 s to disarm) and the
// person signal (instant arm, manual stand-down).

use super::clock::Timestamp;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Continuous signal needed before the tracker goes active.
    pub persistence: Duration,
    /// Gaps up to this long keep the persistence window alive.
    pub debounce_gap: Duration,
    /// Silence longer than this makes an active tracker stand down.
    pub silence: Option<Duration>,
}

impl TrackerConfig {
    pub fn weapon() -> Self {
        Self {
            persistence: Duration::from_secs(1),
            debounce_gap: Duration::from_millis(500),
            silence: Some(Duration::from_secs(5)),
        }
    }

    pub fn person() -> Self {
        Self {
            persistence: Duration::ZERO,
            debounce_gap: Duration::from_millis(500),
            silence: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Pending,
    Active,
}

#[derive(Debug, Clone)]
pub struct SignalTracker {
    config: TrackerConfig,
    first_seen_at: Option<Timestamp>,
    last_seen_at: Option<Timestamp>,
    active: bool,
}

impl SignalTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            first_seen_at: None,
            last_seen_at: None,
            active: false,
        }
    }

    /// Feeds one detection cycle. Returns true when the tracker went from
    /// inactive to active on this call.
    pub fn observe(&mut self, seen: bool, now: Timestamp, gate_open: bool) -> bool {
        if seen {
            self.last_seen_at = Some(now);
            let first = *self.first_seen_at.get_or_insert(now);
            if now.saturating_sub(first) >= self.config.persistence && gate_open && !self.active {
                self.active = true;
                return true;
            }
            return false;
        }

        let gap = self.last_seen_at.map(|last| now.saturating_sub(last));
        if gap.is_none_or(|gap| gap > self.config.debounce_gap) {
            self.first_seen_at = None;
        }
        if let (Some(gap), Some(silence)) = (gap, self.config.silence) {
            if self.active && gap > silence {
                self.active = false;
            }
        }
        false
    }

    /// True when the signal has been seen recently enough to count as persisting
    /// and the persistence window is already satisfied.
    pub fn is_confirmed(&self, now: Timestamp) -> bool {
        self.first_seen_at
            .is_some_and(|first| now.saturating_sub(first) >= self.config.persistence)
    }

    /// Drops the timers but keeps the active latch.
    pub fn clear_timers(&mut self) {
        self.first_seen_at = None;
        self.last_seen_at = None;
    }

    /// Drops the active latch but keeps the timers.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Back to `Idle`: no latch, no timers.
    pub fn force_idle(&mut self) {
        self.clear_timers();
        self.deactivate();
    }

    pub fn state(&self) -> TrackerState {
        match (self.active, self.first_seen_at) {
            (true, _) => TrackerState::Active,
            (false, Some(_)) => TrackerState::Pending,
            (false, None) => TrackerState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn first_seen_at(&self) -> Option<Timestamp> {
        self.first_seen_at
    }

    pub fn last_seen_at(&self) -> Option<Timestamp> {
        self.last_seen_at
    }
}
