// THEORY:
// Every hysteresis window in the engine (tamper persistence, weapon arming,
// silence, dismissal cooldown) is a comparison between two timestamps. Instead
// of sampling the wall clock ad hoc inside each analyzer, all of them read time
// from a single injectable `Clock`. In production that is `SystemClock`; in tests
// it is `ManualClock`, which lets a test jump 4.9 or 5.1 seconds forward without
// sleeping.
//
// The clock also answers "what hour is it locally?", because the night-watch
// window is defined on the local wall clock, not on elapsed time.

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A point in time, measured from the clock's origin.
pub type Timestamp = Duration;

pub trait Clock: Send + Sync {
    /// Monotonic time since the clock's origin.
    fn now(&self) -> Timestamp;
    /// The current local hour, 0..=23.
    fn local_hour(&self) -> u32;
}

/// Monotonic time from `Instant`, local hour from `chrono::Local`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        self.origin.elapsed()
    }

    fn local_hour(&self) -> u32 {
        chrono::Local::now().hour()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(Timestamp, u32)>,
}

impl ManualClock {
    pub fn new(hour: u32) -> Self {
        Self {
            state: Mutex::new((Duration::ZERO, hour % 24)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.0 += by;
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }

    pub fn set_hour(&self, hour: u32) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.1 = hour % 24;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn local_hour(&self) -> u32 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).1
    }
}

/// A half-open range of local hours `[start_hour, end_hour)` during which night
/// watch arms person detection. Windows that cross midnight (e.g. 22..6) wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl NightWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl Default for NightWindow {
    fn default() -> Self {
        Self { start_hour: 0, end_hour: 5 }
    }
}
