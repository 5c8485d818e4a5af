// THEORY:
// Thresholds are tuned by pointing a camera at real flames and at the usual
// look-alikes, then checking which pixels one candidate range keeps. The
// probe applies exactly the cleanup the detector applies, so the pixel counts
// it reports match what the segmenter would see.

use crate::config::HsvRange;
use crate::core_modules::color_segmenter::clean_mask;
use crate::core_modules::hsv::{Hsv, HsvFrame, Mask, mask_area};
use image::RgbImage;

/// Result of probing one frame.
#[derive(Debug, Clone)]
pub struct CalibrationReading {
    pub mask: Mask,
    pub pixels: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProbe {
    pub range: HsvRange,
    pub morphology_radius: u8,
}

impl Default for CalibrationProbe {
    /// Broad red-orange starting point.
    fn default() -> Self {
        Self {
            range: HsvRange::new([0, 100, 100], [25, 255, 255]),
            morphology_radius: 2,
        }
    }
}

impl CalibrationProbe {
    pub fn new(range: HsvRange) -> Self {
        Self {
            range,
            ..Self::default()
        }
    }

    pub fn probe(&self, frame: &RgbImage) -> CalibrationReading {
        let hsv = HsvFrame::from_rgb(frame);
        let mask = clean_mask(&hsv.in_ranges(&[self.range]), self.morphology_radius);
        let pixels = mask_area(&mask);
        CalibrationReading { mask, pixels }
    }
}

/// Engine HSV value of one pixel, `None` outside the frame.
pub fn hsv_at(frame: &RgbImage, x: u32, y: u32) -> Option<Hsv> {
    frame
        .get_pixel_checked(x, y)
        .map(|p| Hsv::from_rgb(p[0], p[1], p[2]))
}

/// Named reference bands for checking that a camera sees warm colours correctly.
pub fn reference_bands() -> [(&'static str, HsvRange); 3] {
    [
        ("red", HsvRange::new([0, 100, 100], [30, 255, 255])),
        ("orange", HsvRange::new([10, 100, 100], [25, 255, 255])),
        ("yellow", HsvRange::new([20, 100, 100], [35, 255, 255])),
    ]
}
