pub mod alarm;
pub mod annotate;
pub mod clock;
pub mod detection;
pub mod identity;
pub mod motion;
pub mod region;
pub mod signal_tracker;
pub mod tamper;
