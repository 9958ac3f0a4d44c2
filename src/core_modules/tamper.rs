// THEORY:
// The `TamperEstimator` answers a single question per frame: "is the lens covered?"
// It is intentionally strict. A frame only counts as black when its mean luminance
// is almost zero, so a dark room at night is not mistaken for tampering.
//
// The estimator owns only the "black since" timestamp. Whether that turns into a
// visible `tamper_active` flag depends on the dismissal cooldown and on the other
// alarm flags, which belong to the `AlarmStateMachine`; the estimator hands it a
// `TamperVerdict` and lets it apply the policy.

use super::clock::Timestamp;
use image::GrayImage;
use std::time::Duration;

/// Mean and population standard deviation of a luminance frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuminanceStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl LuminanceStats {
    pub fn of(gray: &GrayImage) -> Self {
        let raw = gray.as_raw();
        if raw.is_empty() {
            return Self { mean: 0.0, std_dev: 0.0 };
        }
        let count = raw.len() as f64;
        let mean = raw.iter().map(|&p| p as f64).sum::<f64>() / count;
        let variance = raw.iter().map(|&p| (p as f64 - mean).powi(2)).sum::<f64>() / count;
        Self { mean, std_dev: variance.sqrt() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TamperVerdict {
    /// The frame is not black. Any running persistence window was reset.
    Clear,
    /// The frame is black. `persisted` is true once black has held for longer
    /// than the persistence window.
    Black { persisted: bool },
}

pub struct TamperEstimator {
    black_threshold: f64,
    persistence: Duration,
    tamper_start: Option<Timestamp>,
}

impl TamperEstimator {
    pub fn new(black_threshold: f64, persistence: Duration) -> Self {
        Self {
            black_threshold,
            persistence,
            tamper_start: None,
        }
    }

    pub fn is_black(&self, stats: &LuminanceStats) -> bool {
        stats.mean < self.black_threshold
    }

    pub fn observe(&mut self, stats: &LuminanceStats, now: Timestamp) -> TamperVerdict {
        if !self.is_black(stats) {
            self.tamper_start = None;
            return TamperVerdict::Clear;
        }
        match self.tamper_start {
            None => {
                self.tamper_start = Some(now);
                TamperVerdict::Black { persisted: false }
            }
            Some(start) => TamperVerdict::Black {
                persisted: now.saturating_sub(start) > self.persistence,
            },
        }
    }

    pub fn tamper_start(&self) -> Option<Timestamp> {
        self.tamper_start
    }
}
