// THEORY:
// The `MotionEstimator` keeps a slow, exponentially weighted picture of what the
// scene "normally" looks like and flags every pixel that currently differs from
// it. The detection gate uses that mask to throw away detector boxes on things
// that never move: posters, coats on a chair, a pillow shaped like a head.
//
// Key principles:
// 1.  **Slow background**: the learning rate is small (0.02), so a person who
//     pauses for a few seconds stays in the foreground instead of melting into the
//     background after a handful of frames.
// 2.  **Private model**: the floating-point background is owned here and never
//     exposed. Other components only see the binary mask.
// 3.  **Cold start**: the first frame seeds the background and yields an empty
//     mask, so nothing is "moving" until there is something to compare against.

use image::{GrayImage, Luma};

pub struct MotionEstimator {
    learning_rate: f32,
    pixel_threshold: u8,
    background: Option<Background>,
}

struct Background {
    width: u32,
    height: u32,
    average: Vec<f32>,
}

impl MotionEstimator {
    pub fn new(learning_rate: f32, pixel_threshold: u8) -> Self {
        Self {
            learning_rate,
            pixel_threshold,
            background: None,
        }
    }

    /// Folds `gray` into the background and returns the motion mask
    /// (255 where the pixel moved, 0 elsewhere).
    pub fn update(&mut self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        let background = match &mut self.background {
            Some(bg) if bg.width == width && bg.height == height => bg,
            slot => {
                // Seed on the first frame, and again whenever the resolution changes.
                *slot = Some(Background {
                    width,
                    height,
                    average: gray.as_raw().iter().map(|&p| p as f32).collect(),
                });
                return GrayImage::new(width, height);
            }
        };

        let alpha = self.learning_rate;
        let threshold = self.pixel_threshold;
        let mut mask = GrayImage::new(width, height);
        for ((avg, &pixel), out) in background
            .average
            .iter_mut()
            .zip(gray.as_raw().iter())
            .zip(mask.iter_mut())
        {
            *avg = (1.0 - alpha) * *avg + alpha * pixel as f32;
            let reference = avg.round().clamp(0.0, 255.0) as u8;
            if pixel.abs_diff(reference) > threshold {
                *out = 255;
            }
        }
        mask
    }

    pub fn is_seeded(&self) -> bool {
        self.background.is_some()
    }
}

/// True when more than `ratio_threshold` of the pixels inside the box
/// `(x1, y1)-(x2, y2)` are set in `mask`. The box is clamped to the mask first;
/// a box that ends up empty reports no motion.
pub fn region_has_motion(corners: [i32; 4], mask: &GrayImage, ratio_threshold: f64) -> bool {
    let [x1, y1, x2, y2] = corners;
    let (w, h) = (mask.width() as i64, mask.height() as i64);
    let x1 = (x1 as i64).max(0);
    let y1 = (y1 as i64).max(0);
    let x2 = (x2 as i64).min(w);
    let y2 = (y2 as i64).min(h);
    if x2 <= x1 || y2 <= y1 {
        return false;
    }

    let mut moving = 0u64;
    for y in y1..y2 {
        for x in x1..x2 {
            let Luma([value]) = *mask.get_pixel(x as u32, y as u32);
            if value != 0 {
                moving += 1;
            }
        }
    }
    let total = ((x2 - x1) * (y2 - y1)) as f64;
    moving as f64 / total > ratio_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: u8) -> GrayImage {
        GrayImage::from_pixel(40, 30, Luma([value]))
    }

    fn with_block(base: u8, block: u8, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        let mut image = flat(base);
        for y in y0..y1 {
            for x in x0..x1 {
                image.put_pixel(x, y, Luma([block]));
            }
        }
        image
    }

    #[test]
    fn test_first_frame_has_no_motion() {
        let mut estimator = MotionEstimator::new(0.02, 25);
        let mask = estimator.update(&with_block(100, 250, 0, 0, 10, 10));
        assert!(estimator.is_seeded());
        assert!(mask.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_moving_block_shows_in_mask() {
        let mut estimator = MotionEstimator::new(0.02, 25);
        estimator.update(&flat(100));
        let mask = estimator.update(&with_block(100, 250, 5, 5, 15, 15));

        assert_eq!(mask.get_pixel(10, 10)[0], 255);
        assert_eq!(mask.get_pixel(30, 20)[0], 0);
        assert!(region_has_motion([5, 5, 15, 15], &mask, 0.01));
        assert!(!region_has_motion([20, 15, 40, 30], &mask, 0.01));
    }

    #[test]
    fn test_slow_background_keeps_lingering_object() {
        let mut estimator = MotionEstimator::new(0.02, 25);
        estimator.update(&flat(100));
        let lingering = with_block(100, 250, 5, 5, 15, 15);
        let mut mask = GrayImage::new(40, 30);
        for _ in 0..20 {
            mask = estimator.update(&lingering);
        }
        assert!(region_has_motion([5, 5, 15, 15], &mask, 0.01));
    }

    #[test]
    fn test_box_outside_mask_reports_nothing() {
        let mask = GrayImage::from_pixel(40, 30, Luma([255]));
        assert!(!region_has_motion([50, 50, 80, 80], &mask, 0.01));
        assert!(!region_has_motion([10, 10, 10, 20], &mask, 0.01));
        assert!(region_has_motion([-10, -10, 5, 5], &mask, 0.01));
    }

    #[test]
    fn test_ratio_threshold_is_exclusive() {
        // 1 moving pixel out of 100 is exactly 1%, not more.
        let mut mask = GrayImage::new(10, 10);
        mask.put_pixel(0, 0, Luma([255]));
        assert!(!region_has_motion([0, 0, 10, 10], &mask, 0.01));
        mask.put_pixel(1, 0, Luma([255]));
        assert!(region_has_motion([0, 0, 10, 10], &mask, 0.01));
    }

    #[test]
    fn test_resolution_change_reseeds() {
        let mut estimator = MotionEstimator::new(0.02, 25);
        estimator.update(&flat(100));
        let mask = estimator.update(&GrayImage::from_pixel(20, 10, Luma([255])));
        assert_eq!(mask.dimensions(), (20, 10));
        assert!(mask.iter().all(|&p| p == 0));
    }
}
