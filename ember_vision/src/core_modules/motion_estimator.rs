// THEORY:
// Motion is measured only where the colour stage found candidates. A flame's
// interior churns; a red object sitting still does not. The ratio reported is
// the share of masked pixels whose flow magnitude exceeds the speed threshold.
//
// Flow is only computed inside the bounding box of the mask, widened by the
// reach of the coarsest pyramid window and clamped to the frame. Pixels
// outside it never contribute to the ratio.
//
// The estimator owns no state. The retained previous grayscale frame lives in
// the caller's `DetectorState` and is handed in by reference, so whoever owns
// the state is its only writer.

use crate::config::MotionConfig;
use crate::core_modules::hsv::{MASK_OFF, Mask};
use crate::core_modules::optical_flow::{FlowField, PyramidalFlow};
use crate::error::{EmberError, Result};
use image::GrayImage;
use image::imageops;

/// Crop rectangle `(x, y, width, height)` in frame coordinates.
type Region = (u32, u32, u32, u32);

#[derive(Debug, Clone)]
pub struct MotionEstimator {
    flow: PyramidalFlow,
    speed_threshold: f32,
    margin: u32,
}

impl MotionEstimator {
    pub fn new(config: &MotionConfig) -> Self {
        let coarsest_scale = 1u32 << config.flow.pyramid_levels.saturating_sub(1).min(16);
        Self {
            flow: PyramidalFlow::new(&config.flow),
            speed_threshold: config.speed_threshold,
            margin: config.flow.window_radius.saturating_mul(coarsest_scale),
        }
    }

    /// Motion ratio of `current` against the retained frame, in `[0, 1]`.
    ///
    /// The first call (nothing retained) yields 0 without computing flow. On
    /// success `current` always becomes the retained frame; on error the
    /// retained frame is left as it was.
    pub fn measure(
        &self,
        previous: &mut Option<GrayImage>,
        current: GrayImage,
        mask: &Mask,
    ) -> Result<f64> {
        let ratio = match previous.as_ref() {
            None => 0.0,
            Some(retained) if retained.dimensions() != current.dimensions() => {
                return Err(EmberError::DimensionMismatch {
                    expected: retained.dimensions(),
                    actual: current.dimensions(),
                });
            }
            Some(retained) => match flow_region(mask, self.margin) {
                None => 0.0,
                Some((x, y, width, height)) => {
                    let before = imageops::crop_imm(retained, x, y, width, height).to_image();
                    let after = imageops::crop_imm(&current, x, y, width, height).to_image();
                    let window = imageops::crop_imm(mask, x, y, width, height).to_image();
                    let field = self.flow.compute(&before, &after)?;
                    motion_ratio(&field, &window, self.speed_threshold)
                }
            },
        };
        *previous = Some(current);
        Ok(ratio)
    }
}

/// Bounding box of the set pixels of `mask`, grown by `margin` on every side
/// and clamped to the mask. `None` for an empty mask.
fn flow_region(mask: &Mask, margin: u32) -> Option<Region> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] == MASK_OFF {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let (x0, y0, x1, y1) = bounds?;
    let (width, height) = mask.dimensions();
    let (left, top) = (x0.saturating_sub(margin), y0.saturating_sub(margin));
    let right = x1.saturating_add(margin).min(width - 1);
    let bottom = y1.saturating_add(margin).min(height - 1);
    Some((left, top, right - left + 1, bottom - top + 1))
}

/// Fraction of set mask pixels moving faster than `speed_threshold`. Zero for
/// an empty mask.
pub fn motion_ratio(field: &FlowField, mask: &Mask, speed_threshold: f32) -> f64 {
    let (mut masked, mut moving) = (0usize, 0usize);
    for (magnitude, value) in field.magnitudes().zip(mask.as_raw()) {
        if *value == MASK_OFF {
            continue;
        }
        masked += 1;
        if magnitude > speed_threshold {
            moving += 1;
        }
    }
    if masked == 0 {
        0.0
    } else {
        moving as f64 / masked as f64
    }
}
