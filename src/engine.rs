// THEORY:
// The `engine` module is the top-level API of the alert engine. It wires the
// analyzers in `core_modules` into one object, `SurveillanceEngine`, that a
// service can share between its frame loop and its request handlers.
//
// Per frame (`process_frame`):
//   Stage 1: capture, mirror, grayscale, motion mask, tamper reading.
//   Stage 2: under the shared lock, apply tamper and snapshot zones and modes.
//   Stage 3: on every Nth frame, run the detectors and the detection gate with
//            the lock released.
//   Stage 4: under the shared lock again, commit the cycle to the trackers and
//            copy out what has to be drawn.
//   Stage 5: annotate and encode with the lock released.
//
// Locking: `shared` guards everything the API can touch (zones, modes, alarm
// flags, trackers, retained detections). `frame_loop` guards what only the frame
// loop touches (camera, background model, tamper timer, frame counter) and
// serialises concurrent `process_frame` calls. Inference never runs while
// `shared` is held, so API calls never wait on a model.

use crate::config::EngineConfig;
use crate::core_modules::alarm::AlarmStateMachine;
use crate::core_modules::annotate::{Scene, annotate, encode_jpeg};
use crate::core_modules::clock::{Clock, Timestamp};
use crate::core_modules::detection::{
    DetectedBox, DetectionGate, FaceMatcher, FrameSource, GateOutcome, PersonDetector, WeaponDetector,
};
use crate::core_modules::identity::KnownIdentities;
use crate::core_modules::motion::MotionEstimator;
use crate::core_modules::region::{Rect, Region, RegionId, RegionRegistry};
use crate::core_modules::tamper::{LuminanceStats, TamperEstimator};
use crate::error::Result;
use image::{GrayImage, RgbImage, imageops};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// Re-export key data structures for the public API.
pub use crate::core_modules::alarm::AlarmState;
pub use crate::core_modules::signal_tracker::TrackerState;

/// The external collaborators the engine consumes.
pub struct Collaborators {
    pub frame_source: Box<dyn FrameSource>,
    pub person_detector: Arc<dyn PersonDetector>,
    pub weapon_detector: Arc<dyn WeaponDetector>,
    pub face_matcher: Arc<dyn FaceMatcher>,
    pub known_identities: KnownIdentities,
    pub clock: Arc<dyn Clock>,
}

/// The user-controlled arming switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Modes {
    pub away_mode: bool,
    pub night_mode_enabled: bool,
    pub weapon_check_enabled: bool,
}

impl Modes {
    /// Person tracking runs when away, or when night watch is on and it is night.
    pub fn person_armed(&self, is_night: bool) -> bool {
        self.away_mode || (self.night_mode_enabled && is_night)
    }

    /// Armed by the night window alone, which changes the alert wording.
    pub fn night_watch_only(&self, is_night: bool) -> bool {
        !self.away_mode && self.night_mode_enabled && is_night
    }
}

/// What `get_status` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub away_mode: bool,
    pub night_mode_enabled: bool,
    pub night_mode_active: bool,
    pub alarm_active: bool,
    pub tamper_active: bool,
    pub weapon_active: bool,
    pub weapon_check_enabled: bool,
    pub region_count: usize,
    pub alert_text: Option<String>,
}

/// State shared between the frame loop and the API.
struct SharedState {
    regions: RegionRegistry,
    modes: Modes,
    alarm: AlarmStateMachine,
    last_confirmed: Vec<DetectedBox>,
    last_authorized: Vec<DetectedBox>,
    last_weapons: Vec<DetectedBox>,
}

/// State only the frame loop touches.
struct FrameLoop {
    source: Box<dyn FrameSource>,
    motion: MotionEstimator,
    tamper: TamperEstimator,
    frame_index: u64,
}

/// Inputs for one detection cycle, copied out of the shared lock.
struct CycleInputs {
    weapon_check: bool,
    person_regions: Option<Vec<Region>>,
}

/// Results of one detection cycle, to be committed under the shared lock.
struct CycleResults {
    /// `None` when weapon checking was off at snapshot time.
    weapons: Option<Vec<DetectedBox>>,
    /// `None` when person tracking was disarmed at snapshot time.
    persons: Option<GateOutcome>,
}

pub struct SurveillanceEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    gate: DetectionGate,
    person_detector: Arc<dyn PersonDetector>,
    weapon_detector: Arc<dyn WeaponDetector>,
    face_matcher: Arc<dyn FaceMatcher>,
    known_identities: KnownIdentities,
    shared: Mutex<SharedState>,
    frame_loop: Mutex<FrameLoop>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SurveillanceEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let shared = SharedState {
            regions: RegionRegistry::new(),
            modes: Modes::default(),
            alarm: AlarmStateMachine::new(
                config.person_tracker(),
                config.weapon_tracker(),
                config.dismiss_cooldown(),
            ),
            last_confirmed: Vec::new(),
            last_authorized: Vec::new(),
            last_weapons: Vec::new(),
        };
        let frame_loop = FrameLoop {
            source: collaborators.frame_source,
            motion: MotionEstimator::new(config.motion_learning_rate, config.motion_pixel_threshold),
            tamper: TamperEstimator::new(config.black_threshold, config.tamper_persistence()),
            frame_index: 0,
        };
        Self {
            gate: DetectionGate::new(config.gate()),
            config,
            clock: collaborators.clock,
            person_detector: collaborators.person_detector,
            weapon_detector: collaborators.weapon_detector,
            face_matcher: collaborators.face_matcher,
            known_identities: collaborators.known_identities,
            shared: Mutex::new(shared),
            frame_loop: Mutex::new(frame_loop),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Zones ---

    pub fn add_region(&self, rect: Rect, name: impl Into<String>) -> RegionId {
        let name = name.into();
        let id = lock(&self.shared).regions.add(rect, name.clone());
        tracing::info!(region = %id, %name, ?rect, "region added");
        id
    }

    pub fn delete_region(&self, id: &RegionId) {
        if lock(&self.shared).regions.delete(id) {
            tracing::info!(region = %id, "region deleted");
        } else {
            tracing::debug!(region = %id, "delete of unknown region ignored");
        }
    }

    pub fn list_regions(&self) -> Vec<Region> {
        lock(&self.shared).regions.list()
    }

    // --- Modes ---

    pub fn set_away_mode(&self, enabled: bool) {
        let mut shared = lock(&self.shared);
        shared.modes.away_mode = enabled;
        shared.alarm.on_away_mode_changed();
        tracing::info!(enabled, "away mode");
    }

    pub fn set_night_mode(&self, enabled: bool) {
        lock(&self.shared).modes.night_mode_enabled = enabled;
        tracing::info!(enabled, "night mode");
    }

    pub fn set_weapon_check(&self, enabled: bool) {
        let mut shared = lock(&self.shared);
        shared.modes.weapon_check_enabled = enabled;
        shared.alarm.on_weapon_check_changed();
        shared.last_weapons.clear();
        tracing::info!(enabled, "weapon detection");
    }

    // --- Alarm control ---

    pub fn dismiss(&self) {
        let now = self.clock.now();
        lock(&self.shared).alarm.dismiss(now);
        tracing::info!(cooldown_secs = self.config.dismiss_cooldown_secs, "alerts dismissed");
    }

    pub fn reset(&self) {
        lock(&self.shared).alarm.reset();
        tracing::info!("alarm reset");
    }

    pub fn alarm_state(&self) -> AlarmState {
        lock(&self.shared).alarm.state()
    }

    pub fn get_status(&self) -> EngineStatus {
        let is_night = self.is_night();
        let shared = lock(&self.shared);
        let alarm = shared.alarm.state();
        EngineStatus {
            away_mode: shared.modes.away_mode,
            night_mode_enabled: shared.modes.night_mode_enabled,
            night_mode_active: shared.modes.night_mode_enabled && is_night,
            alarm_active: alarm.alarm_active,
            tamper_active: alarm.tamper_active,
            weapon_active: alarm.weapon_active,
            weapon_check_enabled: shared.modes.weapon_check_enabled,
            region_count: shared.regions.len(),
            alert_text: shared
                .alarm
                .alert_text(shared.modes.night_watch_only(is_night))
                .or(shared.alarm.tamper_banner())
                .map(str::to_owned),
        }
    }

    fn is_night(&self) -> bool {
        self.config.night_window.contains(self.clock.local_hour())
    }

    // --- Frame loop ---

    /// Captures and analyses one frame and returns it annotated as JPEG.
    /// Returns `Ok(None)` when the camera produced no frame; nothing is mutated then.
    pub fn process_frame(&self) -> Result<Option<Vec<u8>>> {
        let mut frame_loop = lock(&self.frame_loop);

        // Stage 1: capture and per-pixel analysis.
        let Some(mut frame) = frame_loop.source.capture() else {
            tracing::debug!("frame capture failed");
            return Ok(None);
        };
        if self.config.mirror {
            imageops::flip_horizontal_in_place(&mut frame);
        }
        let gray = imageops::grayscale(&frame);
        let motion_mask = frame_loop.motion.update(&gray);
        let now = self.clock.now();
        let luminance = LuminanceStats::of(&gray);
        let tamper = frame_loop.tamper.observe(&luminance, now);

        let interval = self.config.detection_interval.max(1);
        let detection_frame = frame_loop.frame_index % interval == 0;
        frame_loop.frame_index += 1;

        // Stage 2: tamper and snapshot.
        let is_night = self.is_night();
        let inputs = {
            let mut shared = lock(&self.shared);
            shared.alarm.apply_tamper(tamper, now);
            detection_frame.then(|| CycleInputs {
                weapon_check: shared.modes.weapon_check_enabled,
                person_regions: shared
                    .modes
                    .person_armed(is_night)
                    .then(|| shared.regions.list()),
            })
        };

        // Stage 3: inference, lock released.
        let results = inputs.map(|inputs| self.run_detectors(&frame, &motion_mask, inputs));

        // Stage 4: commit.
        let scene = {
            let mut shared = lock(&self.shared);
            if let Some(results) = results {
                Self::commit(&mut shared, results, now, is_night);
            }
            Self::scene(&shared, now, is_night)
        };

        tracing::debug!(
            frame = frame_loop.frame_index,
            mean = luminance.mean,
            std_dev = luminance.std_dev,
            detection_frame,
            "frame processed"
        );
        drop(frame_loop);

        // Stage 5: draw and encode.
        annotate(&mut frame, &scene);
        Ok(Some(encode_jpeg(&frame, self.config.jpeg_quality)?))
    }

    fn run_detectors(&self, frame: &RgbImage, motion_mask: &GrayImage, inputs: CycleInputs) -> CycleResults {
        let weapons = inputs.weapon_check.then(|| {
            let min_confidence = self.config.weapon_confidence;
            match self.weapon_detector.detect(frame, min_confidence) {
                Ok(boxes) => boxes
                    .into_iter()
                    .filter(|b| b.confidence >= min_confidence)
                    .collect(),
                Err(e) => {
                    tracing::warn!("weapon detection error: {e}");
                    Vec::new()
                }
            }
        });

        let persons = inputs.person_regions.map(|regions| {
            self.gate.evaluate(
                frame,
                motion_mask,
                &regions,
                self.person_detector.as_ref(),
                self.face_matcher.as_ref(),
                &self.known_identities,
            )
        });

        CycleResults { weapons, persons }
    }

    fn commit(shared: &mut SharedState, results: CycleResults, now: Timestamp, is_night: bool) {
        // Modes may have changed while the detectors ran; current modes win.
        match (shared.modes.weapon_check_enabled, results.weapons) {
            (true, Some(weapons)) => {
                shared.alarm.observe_weapon(!weapons.is_empty(), now);
                shared.last_weapons = weapons;
            }
            (true, None) => {}
            (false, _) => {
                shared.alarm.disable_weapon();
                shared.last_weapons.clear();
            }
        }

        shared.last_confirmed.clear();
        shared.last_authorized.clear();
        match (shared.modes.person_armed(is_night), results.persons) {
            (true, Some(outcome)) => {
                shared.alarm.observe_person(!outcome.confirmed.is_empty(), now);
                shared.last_confirmed = outcome.confirmed;
                shared.last_authorized = outcome.authorized;
            }
            (true, None) => {}
            (false, _) => shared.alarm.disarm_person(),
        }
    }

    fn scene(shared: &SharedState, now: Timestamp, is_night: bool) -> Scene {
        let alarm = shared.alarm.state();
        Scene {
            regions: shared.regions.list(),
            confirmed: if shared.alarm.person_confirmed(now) {
                shared.last_confirmed.clone()
            } else {
                Vec::new()
            },
            authorized: shared.last_authorized.clone(),
            weapons: if alarm.weapon_active {
                shared.last_weapons.clone()
            } else {
                Vec::new()
            },
            alert: shared.alarm.alert_text(shared.modes.night_watch_only(is_night)),
            tamper: alarm.tamper_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_arming_rules() {
        let away = Modes {
            away_mode: true,
            ..Modes::default()
        };
        let night = Modes {
            night_mode_enabled: true,
            ..Modes::default()
        };
        assert!(away.person_armed(false));
        assert!(!away.night_watch_only(true));
        assert!(night.person_armed(true));
        assert!(!night.person_armed(false));
        assert!(night.night_watch_only(true));
        assert!(!Modes::default().person_armed(true));
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SurveillanceEngine>();
    }
}
