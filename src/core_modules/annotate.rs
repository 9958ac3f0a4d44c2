//! Frame annotation: overlays zones, detections and alert banners, then encodes
//! the result as JPEG for the video feed.

use super::detection::DetectedBox;
use super::region::{Rect, Region};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};

const ZONE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const ALERT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const AUTHORIZED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const BANNER_HEIGHT: u32 = 40;

/// Everything the annotator needs from one `process_frame` call, copied out of
/// the engine lock.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub regions: Vec<Region>,
    /// Empty unless the person signal is confirmed.
    pub confirmed: Vec<DetectedBox>,
    pub authorized: Vec<DetectedBox>,
    /// Empty unless the weapon alert is up.
    pub weapons: Vec<DetectedBox>,
    pub alert: Option<&'static str>,
    pub tamper: bool,
}

pub fn annotate(frame: &mut RgbImage, scene: &Scene) {
    for region in &scene.regions {
        outline(frame, region.rect, ZONE_COLOR);
    }
    for person in &scene.confirmed {
        outline(frame, person.to_rect(), ALERT_COLOR);
    }
    for person in &scene.authorized {
        outline(frame, person.to_rect(), AUTHORIZED_COLOR);
    }
    for weapon in &scene.weapons {
        outline(frame, weapon.to_rect(), ALERT_COLOR);
    }
    if scene.alert.is_some() {
        banner(frame, 0);
    }
    if scene.tamper {
        banner(frame, frame.height() / 2);
    }
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    frame.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))?;
    Ok(bytes)
}

fn outline(frame: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    let Some(area) = rect.clamp_to(frame.width(), frame.height()) else {
        return;
    };
    for inset in 0..BOX_THICKNESS as u32 {
        if area.width <= 2 * inset || area.height <= 2 * inset {
            break;
        }
        let ring = imageproc::rect::Rect::at((area.x + inset) as i32, (area.y + inset) as i32)
            .of_size(area.width - 2 * inset, area.height - 2 * inset);
        draw_hollow_rect_mut(frame, ring, color);
    }
}

fn banner(frame: &mut RgbImage, top: u32) {
    let Some(area) = Rect::new(0, top as i32, frame.width() as i32, BANNER_HEIGHT as i32)
        .clamp_to(frame.width(), frame.height())
    else {
        return;
    };
    let strip = imageproc::rect::Rect::at(area.x as i32, area.y as i32).of_size(area.width, area.height);
    draw_filled_rect_mut(frame, strip, ALERT_COLOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::region::RegionId;

    fn gray_frame() -> RgbImage {
        RgbImage::from_pixel(160, 120, Rgb([90, 90, 90]))
    }

    #[test]
    fn test_zone_outline_is_drawn() {
        let mut frame = gray_frame();
        let scene = Scene {
            regions: vec![Region {
                id: RegionId::from("door"),
                name: "Door".to_string(),
                rect: Rect::new(10, 10, 100, 100),
            }],
            ..Scene::default()
        };
        annotate(&mut frame, &scene);
        assert_eq!(*frame.get_pixel(10, 10), ZONE_COLOR);
        assert_eq!(*frame.get_pixel(11, 50), ZONE_COLOR);
        assert_eq!(*frame.get_pixel(50, 50), Rgb([90, 90, 90]));
    }

    #[test]
    fn test_authorized_and_confirmed_colors() {
        let mut frame = gray_frame();
        let scene = Scene {
            confirmed: vec![DetectedBox::person(20, 20, 40, 40, 0.9)],
            authorized: vec![DetectedBox::person(60, 60, 80, 80, 0.9)],
            ..Scene::default()
        };
        annotate(&mut frame, &scene);
        assert_eq!(*frame.get_pixel(20, 30), ALERT_COLOR);
        assert_eq!(*frame.get_pixel(60, 70), AUTHORIZED_COLOR);
    }

    #[test]
    fn test_banners() {
        let mut frame = gray_frame();
        annotate(
            &mut frame,
            &Scene {
                alert: Some("ALERT"),
                tamper: true,
                ..Scene::default()
            },
        );
        assert_eq!(*frame.get_pixel(80, 5), ALERT_COLOR);
        assert_eq!(*frame.get_pixel(80, 70), ALERT_COLOR);
        assert_eq!(*frame.get_pixel(80, 50), Rgb([90, 90, 90]));
    }

    #[test]
    fn test_jpeg_encoding() {
        let bytes = encode_jpeg(&gray_frame(), 80).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (160, 120));
    }
}
