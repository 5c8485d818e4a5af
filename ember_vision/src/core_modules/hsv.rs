// THEORY:
// The `hsv` module is the bottom of the engine. Every other stage consumes what
// it produces: an 8-bit hue/saturation/value view of a frame, a single-channel
// luma view for motion, and binary masks built by thresholding the HSV view.
//
// Key architectural principles:
// 1.  **8-bit engine scale**: hue is stored in half-degrees (0..=179) so that a
//     full HSV triple fits in three bytes and every threshold in the
//     configuration can be written as a plain byte triple. Saturation is
//     `255 * chroma / max` and value is `max(R, G, B)`.
// 2.  **Single-pixel scope**: conversion never reads neighbours. Anything that
//     needs neighbourhoods (morphology, contours, flow) lives in higher modules.
// 3.  **Masks are images**: a `Mask` is a `GrayImage` holding only 0 or 255, so
//     the `imageproc` morphology and contour routines apply to it directly.

use crate::config::HsvRange;
use image::{GrayImage, Luma, RgbImage};

pub type Hue = u8;
pub type Saturation = u8;
pub type Value = u8;

/// A binary image: 255 where a pixel belongs to the set, 0 elsewhere.
pub type Mask = GrayImage;

pub const MASK_ON: u8 = 255;
pub const MASK_OFF: u8 = 0;

/// One pixel in the engine's hue/saturation/value space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hsv {
    /// Hue in half-degrees (0..=179). Pure red sits at both ends of the scale.
    pub hue: Hue,
    /// Colourfulness relative to brightness (0..=255).
    pub saturation: Saturation,
    /// Brightness, the largest of the three channels (0..=255).
    pub value: Value,
}

impl Hsv {
    pub fn new(hue: Hue, saturation: Saturation, value: Value) -> Self {
        Self {
            hue,
            saturation,
            value,
        }
    }

    pub fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        let maximum_channel = red.max(green.max(blue));
        let minimum_channel = red.min(green.min(blue));
        let chroma = (maximum_channel - minimum_channel) as f32;

        if maximum_channel == 0 {
            return Self::default();
        }

        let saturation = (255.0 * chroma / maximum_channel as f32).round() as u8;
        if chroma <= f32::EPSILON {
            return Self::new(0, 0, maximum_channel);
        }

        let (r, g, b) = (red as f32, green as f32, blue as f32);
        let inverse_chroma = 1.0 / chroma;
        let (base_difference, sector_offset) = if maximum_channel == red {
            (g - b, 0.0)
        } else if maximum_channel == green {
            (b - r, 2.0)
        } else {
            (r - g, 4.0)
        };

        let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
        if hue_degrees < 0.0 {
            hue_degrees += 360.0;
        }

        let half_degrees = (hue_degrees / 2.0).round() as u16;
        Self::new((half_degrees % 180) as u8, saturation, maximum_channel)
    }

    /// Hue converted back to degrees, for logs and reports.
    pub fn hue_degrees(&self) -> f32 {
        self.hue as f32 * 2.0
    }
}

/// A frame converted pixel-by-pixel into `Hsv`.
#[derive(Debug, Clone)]
pub struct HsvFrame {
    width: u32,
    height: u32,
    pixels: Vec<Hsv>,
}

impl HsvFrame {
    pub fn from_rgb(frame: &RgbImage) -> Self {
        let pixels = frame
            .pixels()
            .map(|p| Hsv::from_rgb(p[0], p[1], p[2]))
            .collect();
        Self {
            width: frame.width(),
            height: frame.height(),
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Hsv> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    /// Marks every pixel falling inside at least one of `ranges`.
    pub fn in_ranges(&self, ranges: &[HsvRange]) -> Mask {
        let mut mask = GrayImage::new(self.width, self.height);
        for (out, hsv) in mask.pixels_mut().zip(&self.pixels) {
            if ranges.iter().any(|range| range.contains(*hsv)) {
                *out = Luma([MASK_ON]);
            }
        }
        mask
    }
}

/// Single-channel luma view of a colour frame, the input to optical flow.
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

/// Number of set pixels in a mask.
pub fn mask_area(mask: &Mask) -> usize {
    mask.as_raw().iter().filter(|&&v| v != MASK_OFF).count()
}

/// Clears every pixel of `mask` that is set in `remove` (mask AND NOT remove).
pub fn subtract_mask(mask: &mut Mask, remove: &Mask) {
    for (kept, removed) in mask.pixels_mut().zip(remove.pixels()) {
        if removed[0] != MASK_OFF {
            *kept = Luma([MASK_OFF]);
        }
    }
}

/// Sets every pixel of `mask` that is set in `other` (mask OR other).
pub fn union_mask(mask: &mut Mask, other: &Mask) {
    for (kept, added) in mask.pixels_mut().zip(other.pixels()) {
        if added[0] != MASK_OFF {
            *kept = Luma([MASK_ON]);
        }
    }
}
