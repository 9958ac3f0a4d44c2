// THEORY:
// The `detection` module is where raw detector output becomes evidence. A person
// detector on its own is noisy: it fires on posters, on coats over chairs, and on
// the people who live in the house. The `DetectionGate` stacks two cheap filters
// on top of it, in order:
//
// 1.  **Motion**: a box is only considered if enough pixels inside it are moving
//     according to the `MotionEstimator`'s mask. Static false positives die here.
// 2.  **Identity**: surviving boxes are cropped and handed to the face matcher. If
//     any face inside matches a known occupant, the box is *authorized*: it is
//     drawn differently and never reaches the alarm.
//
// What remains is a set of *confirmed* unauthorized persons for this cycle.
//
// The module also defines the contracts of the external collaborators (camera,
// detectors, face matcher). The engine never loads or runs models itself; it only
// consumes these traits. Collaborator failures are returned as `anyhow::Error`
// and, here, degrade to "nothing seen" for the affected zone or box.

use super::identity::{FaceEncoding, KnownIdentities};
use super::motion::region_has_motion;
use super::region::{Rect, Region};
use image::{GrayImage, RgbImage, imageops};
use serde::{Deserialize, Serialize};

/// Which detector produced a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionSource {
    Person,
    Weapon,
}

/// A detector box in `(x1, y1)-(x2, y2)` corner form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub confidence: f32,
    pub source: DetectionSource,
    /// Only meaningful for person boxes: a known face was found inside.
    pub authorized: bool,
}

impl DetectedBox {
    pub fn person(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            source: DetectionSource::Person,
            authorized: false,
        }
    }

    pub fn weapon(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Self {
        Self {
            source: DetectionSource::Weapon,
            ..Self::person(x1, y1, x2, y2, confidence)
        }
    }

    /// Shifts a crop-relative box into absolute frame coordinates.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
            ..self
        }
    }

    pub fn corners(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x1, self.y1, self.x2 - self.x1, self.y2 - self.y1)
    }
}

// --- Collaborator contracts ---

/// The camera. `None` means a transient capture failure.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Option<RgbImage>;
}

/// Person-class object detector. Boxes are relative to `crop`.
pub trait PersonDetector: Send + Sync {
    fn detect(&self, crop: &RgbImage, min_confidence: f32) -> anyhow::Result<Vec<DetectedBox>>;
}

/// Weapon detector run on the full frame. Boxes are absolute.
pub trait WeaponDetector: Send + Sync {
    fn detect(&self, frame: &RgbImage, min_confidence: f32) -> anyhow::Result<Vec<DetectedBox>>;
}

pub trait FaceMatcher: Send + Sync {
    /// Finds every face in `crop` and returns one encoding per face.
    fn locate_and_encode(&self, crop: &RgbImage) -> anyhow::Result<Vec<FaceEncoding>>;

    /// Whether `encoding` belongs to anyone in `known`.
    fn matches(&self, encoding: &FaceEncoding, known: &KnownIdentities, tolerance: f32) -> bool {
        known.iter().any(|face| face.encoding.distance(encoding) <= tolerance)
    }
}

// --- Gate ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateConfig {
    pub person_confidence: f32,
    pub motion_ratio_threshold: f64,
    pub face_tolerance: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            person_confidence: 0.75,
            motion_ratio_threshold: 0.01,
            face_tolerance: 0.6,
        }
    }
}

/// The result of gating one detection cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateOutcome {
    /// Moving persons without a known face. These feed the person tracker.
    pub confirmed: Vec<DetectedBox>,
    /// Moving persons with a known face. Rendered only.
    pub authorized: Vec<DetectedBox>,
}

pub struct DetectionGate {
    config: GateConfig,
}

impl DetectionGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Runs the person detector over every region of `frame` and sorts the
    /// moving hits into confirmed and authorized boxes.
    pub fn evaluate(
        &self,
        frame: &RgbImage,
        motion_mask: &GrayImage,
        regions: &[Region],
        detector: &dyn PersonDetector,
        matcher: &dyn FaceMatcher,
        known: &KnownIdentities,
    ) -> GateOutcome {
        let mut outcome = GateOutcome::default();
        let (width, height) = frame.dimensions();

        for region in regions {
            let Some(zone) = region.rect.clamp_to(width, height) else {
                continue;
            };
            let crop = imageops::crop_imm(frame, zone.x, zone.y, zone.width, zone.height).to_image();
            let boxes = match detector.detect(&crop, self.config.person_confidence) {
                Ok(boxes) => boxes,
                Err(e) => {
                    tracing::warn!(region = %region.name, "person detection error: {e}");
                    continue;
                }
            };

            for raw in boxes {
                if raw.source != DetectionSource::Person || raw.confidence < self.config.person_confidence {
                    continue;
                }
                let candidate = raw.offset(zone.x as i32, zone.y as i32);
                if !region_has_motion(candidate.corners(), motion_mask, self.config.motion_ratio_threshold) {
                    tracing::debug!(region = %region.name, ?candidate, "static person box discarded");
                    continue;
                }

                if self.is_known_face(frame, &candidate, matcher, known) {
                    tracing::info!(region = %region.name, "authorized person detected, alert suppressed");
                    outcome.authorized.push(DetectedBox {
                        authorized: true,
                        ..candidate
                    });
                } else {
                    outcome.confirmed.push(candidate);
                }
            }
        }

        outcome
    }

    fn is_known_face(
        &self,
        frame: &RgbImage,
        candidate: &DetectedBox,
        matcher: &dyn FaceMatcher,
        known: &KnownIdentities,
    ) -> bool {
        let Some(area) = candidate.to_rect().clamp_to(frame.width(), frame.height()) else {
            return false;
        };
        let crop = imageops::crop_imm(frame, area.x, area.y, area.width, area.height).to_image();
        match matcher.locate_and_encode(&crop) {
            Ok(encodings) => encodings
                .iter()
                .any(|encoding| matcher.matches(encoding, known, self.config.face_tolerance)),
            Err(e) => {
                tracing::warn!("face matching error: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::region::RegionId;
    use image::{Luma, Rgb};

    struct FixedPersons(Vec<DetectedBox>);

    impl PersonDetector for FixedPersons {
        fn detect(&self, _crop: &RgbImage, min_confidence: f32) -> anyhow::Result<Vec<DetectedBox>> {
            Ok(self.0.iter().copied().filter(|b| b.confidence >= min_confidence).collect())
        }
    }

    struct BrokenDetector;

    impl PersonDetector for BrokenDetector {
        fn detect(&self, _crop: &RgbImage, _min_confidence: f32) -> anyhow::Result<Vec<DetectedBox>> {
            anyhow::bail!("inference runtime unavailable")
        }
    }

    struct FixedFaces(Vec<FaceEncoding>);

    impl FaceMatcher for FixedFaces {
        fn locate_and_encode(&self, _crop: &RgbImage) -> anyhow::Result<Vec<FaceEncoding>> {
            Ok(self.0.clone())
        }
    }

    fn door() -> Vec<Region> {
        vec![Region {
            id: RegionId::from("door"),
            name: "Door".to_string(),
            rect: Rect::new(10, 10, 100, 100),
        }]
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(160, 120, Rgb([90, 90, 90]))
    }

    fn full_motion() -> GrayImage {
        GrayImage::from_pixel(160, 120, Luma([255]))
    }

    #[test]
    fn test_boxes_are_mapped_to_frame_coordinates() {
        let gate = DetectionGate::new(GateConfig::default());
        let detector = FixedPersons(vec![DetectedBox::person(20, 20, 60, 90, 0.9)]);
        let outcome = gate.evaluate(
            &frame(),
            &full_motion(),
            &door(),
            &detector,
            &FixedFaces(Vec::new()),
            &KnownIdentities::new(),
        );
        assert_eq!(outcome.confirmed.len(), 1);
        assert_eq!(outcome.confirmed[0].corners(), [30, 30, 70, 100]);
        assert!(outcome.authorized.is_empty());
    }

    #[test]
    fn test_static_box_is_never_confirmed() {
        let gate = DetectionGate::new(GateConfig::default());
        let detector = FixedPersons(vec![DetectedBox::person(20, 20, 60, 90, 0.99)]);
        let outcome = gate.evaluate(
            &frame(),
            &GrayImage::new(160, 120),
            &door(),
            &detector,
            &FixedFaces(Vec::new()),
            &KnownIdentities::new(),
        );
        assert!(outcome.confirmed.is_empty());
        assert!(outcome.authorized.is_empty());
    }

    #[test]
    fn test_low_confidence_is_dropped() {
        let gate = DetectionGate::new(GateConfig::default());
        let detector = FixedPersons(vec![DetectedBox::person(20, 20, 60, 90, 0.5)]);
        let outcome = gate.evaluate(
            &frame(),
            &full_motion(),
            &door(),
            &detector,
            &FixedFaces(Vec::new()),
            &KnownIdentities::new(),
        );
        assert!(outcome.confirmed.is_empty());
    }

    #[test]
    fn test_known_face_is_authorized() {
        let gate = DetectionGate::new(GateConfig::default());
        let detector = FixedPersons(vec![DetectedBox::person(20, 20, 60, 90, 0.9)]);
        let known = KnownIdentities::new().with("owner", FaceEncoding(vec![0.0, 0.0]));
        let matcher = FixedFaces(vec![FaceEncoding(vec![0.3, 0.4])]);

        let outcome = gate.evaluate(&frame(), &full_motion(), &door(), &detector, &matcher, &known);
        assert!(outcome.confirmed.is_empty());
        assert_eq!(outcome.authorized.len(), 1);
        assert!(outcome.authorized[0].authorized);
    }

    #[test]
    fn test_stranger_face_is_confirmed() {
        let gate = DetectionGate::new(GateConfig::default());
        let detector = FixedPersons(vec![DetectedBox::person(20, 20, 60, 90, 0.9)]);
        let known = KnownIdentities::new().with("owner", FaceEncoding(vec![0.0, 0.0]));
        let matcher = FixedFaces(vec![FaceEncoding(vec![3.0, 4.0])]);

        let outcome = gate.evaluate(&frame(), &full_motion(), &door(), &detector, &matcher, &known);
        assert_eq!(outcome.confirmed.len(), 1);
        assert!(outcome.authorized.is_empty());
    }

    #[test]
    fn test_detector_failure_means_no_detections() {
        let gate = DetectionGate::new(GateConfig::default());
        let outcome = gate.evaluate(
            &frame(),
            &full_motion(),
            &door(),
            &BrokenDetector,
            &FixedFaces(Vec::new()),
            &KnownIdentities::new(),
        );
        assert_eq!(outcome, GateOutcome::default());
    }

    #[test]
    fn test_offscreen_region_is_skipped() {
        let gate = DetectionGate::new(GateConfig::default());
        let detector = FixedPersons(vec![DetectedBox::person(0, 0, 10, 10, 0.9)]);
        let regions = vec![Region {
            id: RegionId::from("gone"),
            name: "Gone".to_string(),
            rect: Rect::new(500, 500, 50, 50),
        }];
        let outcome = gate.evaluate(
            &frame(),
            &full_motion(),
            &regions,
            &detector,
            &FixedFaces(Vec::new()),
            &KnownIdentities::new(),
        );
        assert!(outcome.confirmed.is_empty());
    }
}
