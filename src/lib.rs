// THEORY:
// This file is the main entry point for the `waldo_sentinel` library crate.
// It exports the `SurveillanceEngine` and its associated data structures
// (`EngineConfig`, `EngineStatus`, the collaborator traits) as the interface a
// surrounding service builds on. The analyzers in `core_modules` are public so
// that they can be tested and reused on their own, but a service only needs the
// engine: it feeds frames in through `process_frame` and drives zones, modes and
// alarms through the engine's methods.

pub mod config;
pub mod core_modules;
pub mod engine;
pub mod error;

pub use config::EngineConfig;
pub use core_modules::clock::{Clock, ManualClock, NightWindow, SystemClock, Timestamp};
pub use core_modules::detection::{
    DetectedBox, DetectionSource, FaceMatcher, FrameSource, PersonDetector, WeaponDetector,
};
pub use core_modules::identity::{FaceEncoding, KnownIdentities};
pub use core_modules::region::{Rect, Region, RegionId};
pub use engine::{AlarmState, Collaborators, EngineStatus, Modes, SurveillanceEngine};
pub use error::{EngineError, Result};
