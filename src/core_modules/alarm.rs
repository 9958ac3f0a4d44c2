// THEORY:
// The `AlarmStateMachine` is the single place where the three alarm sources meet
// the user. It owns the person and weapon trackers, the tamper flag and the
// dismissal cooldown, and it is the only code allowed to raise or clear a flag.
//
// Hard invariant: no flag rises while `now <= dismissed_until`. Every raising path
// goes through `gate_open`.
//
// Who clears what (the asymmetry is policy, not accident):
//
//     operation          alarm   tamper   weapon   cooldown
//     dismiss()          clear   clear    clear    now + 5 s
//     reset()            clear   clear    keep     keep
//     away toggled       clear   keep     keep     keep
//     weapon toggled     keep    keep     clear    keep
//
// A weapon alert never disappears through a plain reset; it needs an explicit
// dismissal, or the weapon signal must go silent for its full stand-down window.
// Toggling away mode leaves it up as well. The earlier camera service cleared
// the weapon flag on that toggle too; here arming only owns the intruder alarm.

use super::clock::Timestamp;
use super::signal_tracker::{SignalTracker, TrackerConfig, TrackerState};
use super::tamper::TamperVerdict;
use serde::Serialize;
use std::time::Duration;

pub const WEAPON_ALERT: &str = "CRITICAL: WEAPON DETECTED";
pub const PERSON_ALERT: &str = "ALERT: PERSON CONFIRMED";
pub const NIGHT_WATCH_ALERT: &str = "NIGHT WATCH: INTRUDER";
pub const TAMPER_BANNER: &str = "CAMERA TAMPERED!";

/// Snapshot of the externally visible alarm flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlarmState {
    pub alarm_active: bool,
    pub tamper_active: bool,
    pub weapon_active: bool,
    #[serde(skip)]
    pub dismissed_until: Option<Timestamp>,
}

pub struct AlarmStateMachine {
    person: SignalTracker,
    weapon: SignalTracker,
    tamper_active: bool,
    dismissed_until: Option<Timestamp>,
    dismiss_cooldown: Duration,
}

impl AlarmStateMachine {
    pub fn new(person: TrackerConfig, weapon: TrackerConfig, dismiss_cooldown: Duration) -> Self {
        Self {
            person: SignalTracker::new(person),
            weapon: SignalTracker::new(weapon),
            tamper_active: false,
            dismissed_until: None,
            dismiss_cooldown,
        }
    }

    /// Whether a flag may rise at `now`.
    pub fn gate_open(&self, now: Timestamp) -> bool {
        self.dismissed_until.is_none_or(|until| now > until)
    }

    pub fn apply_tamper(&mut self, verdict: TamperVerdict, now: Timestamp) {
        match verdict {
            TamperVerdict::Black { persisted: true } => {
                if self.gate_open(now) && !self.tamper_active {
                    tracing::warn!("camera tamper confirmed");
                    self.tamper_active = true;
                }
            }
            TamperVerdict::Black { persisted: false } => {}
            TamperVerdict::Clear => {
                // Held while another alarm is up so the banners do not flicker.
                if !self.person.is_active() && !self.weapon.is_active() && self.gate_open(now) {
                    self.tamper_active = false;
                }
            }
        }
    }

    /// One weapon detection cycle with the feature enabled.
    pub fn observe_weapon(&mut self, seen: bool, now: Timestamp) {
        let gate_open = self.gate_open(now);
        if self.weapon.observe(seen, now, gate_open) {
            tracing::warn!("weapon alert raised");
        } else if !self.weapon.is_active() && seen {
            tracing::debug!(state = ?self.weapon.state(), "weapon signal pending");
        }
    }

    /// One person detection cycle while armed.
    pub fn observe_person(&mut self, confirmed: bool, now: Timestamp) {
        let gate_open = self.gate_open(now);
        if self.person.observe(confirmed, now, gate_open) {
            tracing::warn!("person alarm raised");
        }
    }

    /// Person tracking is disarmed: forget the timers, leave the alarm as is.
    pub fn disarm_person(&mut self) {
        self.person.clear_timers();
    }

    /// Weapon checking is off: the weapon signal goes fully idle.
    pub fn disable_weapon(&mut self) {
        self.weapon.force_idle();
    }

    pub fn dismiss(&mut self, now: Timestamp) {
        self.person.deactivate();
        self.weapon.deactivate();
        self.tamper_active = false;
        let until = now + self.dismiss_cooldown;
        self.dismissed_until = Some(self.dismissed_until.map_or(until, |old| old.max(until)));
    }

    pub fn reset(&mut self) {
        self.person.deactivate();
        self.tamper_active = false;
    }

    pub fn on_away_mode_changed(&mut self) {
        self.person.deactivate();
    }

    pub fn on_weapon_check_changed(&mut self) {
        self.weapon.force_idle();
    }

    pub fn state(&self) -> AlarmState {
        AlarmState {
            alarm_active: self.person.is_active(),
            tamper_active: self.tamper_active,
            weapon_active: self.weapon.is_active(),
            dismissed_until: self.dismissed_until,
        }
    }

    /// Whether the latest confirmed person boxes should be drawn.
    pub fn person_confirmed(&self, now: Timestamp) -> bool {
        self.person.is_active() || self.person.is_confirmed(now)
    }

    pub fn weapon_state(&self) -> TrackerState {
        self.weapon.state()
    }

    pub fn person_state(&self) -> TrackerState {
        self.person.state()
    }

    /// The headline alert, by priority: weapon, then person. Tamper has its own
    /// banner (`tamper_banner`).
    pub fn alert_text(&self, night_watch_only: bool) -> Option<&'static str> {
        if self.weapon.is_active() {
            Some(WEAPON_ALERT)
        } else if self.person.is_active() {
            Some(if night_watch_only { NIGHT_WATCH_ALERT } else { PERSON_ALERT })
        } else {
            None
        }
    }

    pub fn tamper_banner(&self) -> Option<&'static str> {
        self.tamper_active.then_some(TAMPER_BANNER)
    }
}
