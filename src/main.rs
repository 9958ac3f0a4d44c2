// This binary is a runnable example of the `waldo_sentinel` engine.
//
// It drives the frame loop against a synthetic test-pattern camera and detector
// stand-ins that never fire, so motion, tamper and the alarm plumbing can be
// watched in the logs without any model runtime installed. A real deployment
// supplies its own `FrameSource`, detectors and face matcher through
// `Collaborators` and serves the broadcast frames over its own transport.

use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use waldo_sentinel::{
    Collaborators, DetectedBox, EngineConfig, FaceEncoding, FaceMatcher, FrameSource, KnownIdentities,
    PersonDetector, Rect, SurveillanceEngine, SystemClock, WeaponDetector,
};

const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 240;
const DEFAULT_FPS: u64 = 15;
const MAX_FPS: u64 = 1000;
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A camera that renders a bright square sweeping across a grey background and
/// goes fully black for a stretch every few hundred frames.
struct TestPatternCamera {
    tick: u64,
}

impl FrameSource for TestPatternCamera {
    fn capture(&mut self) -> Option<RgbImage> {
        self.tick += 1;
        let phase = self.tick % 400;
        if phase >= 300 {
            return Some(RgbImage::new(FRAME_WIDTH, FRAME_HEIGHT));
        }
        let mut frame = RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([96, 96, 96]));
        let x0 = (self.tick * 4 % (FRAME_WIDTH as u64 - 40)) as u32;
        for y in 100..140 {
            for x in x0..x0 + 40 {
                frame.put_pixel(x, y, Rgb([240, 240, 240]));
            }
        }
        Some(frame)
    }
}

struct NoPersons;

impl PersonDetector for NoPersons {
    fn detect(&self, _crop: &RgbImage, _min_confidence: f32) -> anyhow::Result<Vec<DetectedBox>> {
        Ok(Vec::new())
    }
}

struct NoWeapons;

impl WeaponDetector for NoWeapons {
    fn detect(&self, _frame: &RgbImage, _min_confidence: f32) -> anyhow::Result<Vec<DetectedBox>> {
        Ok(Vec::new())
    }
}

struct NoFaces;

impl FaceMatcher for NoFaces {
    fn locate_and_encode(&self, _crop: &RgbImage) -> anyhow::Result<Vec<FaceEncoding>> {
        Ok(Vec::new())
    }
}

/// Tick period for the requested frame rate. Unset, unparsable or out-of-range
/// values fall back to 15 fps; the rate is capped so the period never hits zero.
fn frame_period(fps: Option<&str>) -> Duration {
    let fps = fps
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|fps| (1..=MAX_FPS).contains(fps))
        .unwrap_or(DEFAULT_FPS);
    Duration::from_millis(1000 / fps)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("SENTINEL_CONFIG") {
        Ok(path) if !path.is_empty() => EngineConfig::from_json_file(&path)?,
        _ => EngineConfig::default(),
    };
    let frame_period = frame_period(std::env::var("SENTINEL_FPS").ok().as_deref());
    let faces_dir = std::env::var("SENTINEL_FACES").unwrap_or_else(|_| "face_dataset".to_string());

    let face_matcher: Arc<dyn FaceMatcher> = Arc::new(NoFaces);
    let known_identities = KnownIdentities::load_dir(&faces_dir, face_matcher.as_ref())?;

    let engine = Arc::new(SurveillanceEngine::new(
        config,
        Collaborators {
            frame_source: Box::new(TestPatternCamera { tick: 0 }),
            person_detector: Arc::new(NoPersons),
            weapon_detector: Arc::new(NoWeapons),
            face_matcher,
            known_identities,
            clock: Arc::new(SystemClock::new()),
        },
    ));
    engine.add_region(Rect::new(40, 60, 200, 140), "Hallway");
    engine.set_away_mode(true);

    // Encoded frames for whatever transport sits on top.
    let (frames_tx, _) = broadcast::channel::<Arc<[u8]>>(2);

    let status_engine = engine.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            let status = status_engine.get_status();
            tracing::info!(
                alarm = status.alarm_active,
                tamper = status.tamper_active,
                weapon = status.weapon_active,
                regions = status.region_count,
                alert = status.alert_text.as_deref().unwrap_or("-"),
                "status"
            );
        }
    });

    let mut ticker = tokio::time::interval(frame_period);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            _ = ticker.tick() => {
                let frame_engine = engine.clone();
                match tokio::task::spawn_blocking(move || frame_engine.process_frame()).await? {
                    Ok(Some(jpeg)) => {
                        let _ = frames_tx.send(Arc::from(jpeg));
                    }
                    Ok(None) => tokio::time::sleep(CAPTURE_RETRY_DELAY).await,
                    Err(e) => tracing::warn!("frame error: {e}"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_period_never_zero() {
        assert_eq!(frame_period(Some("1000")), Duration::from_millis(1));
        assert_eq!(frame_period(Some("5000")), Duration::from_millis(66));
        assert_eq!(frame_period(Some("0")), Duration::from_millis(66));
        assert_eq!(frame_period(Some("fast")), Duration::from_millis(66));
        assert_eq!(frame_period(None), Duration::from_millis(66));
        assert_eq!(frame_period(Some("25")), Duration::from_millis(40));
    }
}
