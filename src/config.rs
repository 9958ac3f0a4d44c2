//! Tunables for the alert engine.

use crate::core_modules::clock::NightWindow;
use crate::core_modules::detection::GateConfig;
use crate::core_modules::signal_tracker::TrackerConfig;
use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for the `SurveillanceEngine`.
///
/// Every field has a default, so a JSON file only needs the values it changes.
/// Durations are given in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Mean luminance below which a frame counts as a covered lens.
    pub black_threshold: f64,
    /// How long the lens must stay covered before tamper is raised.
    pub tamper_persistence_secs: f64,
    /// Weight of the newest frame in the running background average.
    pub motion_learning_rate: f32,
    /// Per-pixel difference from the background that counts as motion.
    pub motion_pixel_threshold: u8,
    /// Fraction of a box that must be moving for it to count.
    pub motion_ratio_threshold: f64,
    pub person_confidence: f32,
    pub weapon_confidence: f32,
    /// Maximum face-encoding distance for a known-occupant match.
    pub face_tolerance: f32,
    /// Run the detectors on every Nth captured frame.
    pub detection_interval: u64,
    pub weapon_persistence_secs: f64,
    pub weapon_silence_secs: f64,
    pub person_persistence_secs: f64,
    /// Gaps in a signal up to this long do not restart its persistence window.
    pub debounce_gap_secs: f64,
    pub dismiss_cooldown_secs: f64,
    pub night_window: NightWindow,
    /// Flip frames horizontally before analysis, as a mirror view.
    pub mirror: bool,
    pub jpeg_quality: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            black_threshold: 2.0,
            tamper_persistence_secs: 5.0,
            motion_learning_rate: 0.02,
            motion_pixel_threshold: 25,
            motion_ratio_threshold: 0.01,
            person_confidence: 0.75,
            weapon_confidence: 0.60,
            face_tolerance: 0.6,
            detection_interval: 3,
            weapon_persistence_secs: 1.0,
            weapon_silence_secs: 5.0,
            person_persistence_secs: 0.0,
            debounce_gap_secs: 0.5,
            dismiss_cooldown_secs: 5.0,
            night_window: NightWindow::default(),
            mirror: true,
            jpeg_quality: 80,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| EngineError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json_str(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn tamper_persistence(&self) -> Duration {
        secs(self.tamper_persistence_secs)
    }

    pub fn dismiss_cooldown(&self) -> Duration {
        secs(self.dismiss_cooldown_secs)
    }

    pub fn weapon_tracker(&self) -> TrackerConfig {
        TrackerConfig {
            persistence: secs(self.weapon_persistence_secs),
            debounce_gap: secs(self.debounce_gap_secs),
            silence: Some(secs(self.weapon_silence_secs)),
        }
    }

    pub fn person_tracker(&self) -> TrackerConfig {
        TrackerConfig {
            persistence: secs(self.person_persistence_secs),
            debounce_gap: secs(self.debounce_gap_secs),
            silence: None,
        }
    }

    pub fn gate(&self) -> GateConfig {
        GateConfig {
            person_confidence: self.person_confidence,
            motion_ratio_threshold: self.motion_ratio_threshold,
            face_tolerance: self.face_tolerance,
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
