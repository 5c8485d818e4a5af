// THEORY:
// The `ColorSegmenter` turns a frame into the fire-candidate mask. Colour is the
// weakest of the four signals, so this stage keeps every vividly coloured,
// bright pixel in the fire hue bands and leaves look-alike removal to the
// `ExclusionFilter` and the geometric gates downstream.
//
// The cleanup passes are refinements, not semantics. An opening removes speckle,
// a closing fills pinholes inside a blob, always in that order. Both use the
// L1 ball of the configured radius, which for radius 2 is the 13-pixel disk.

use crate::config::{ColorConfig, HsvRange};
use crate::core_modules::hsv::{HsvFrame, Mask};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};

/// Thresholds a frame into the raw and cleaned fire-candidate masks.
#[derive(Debug, Clone)]
pub struct ColorSegmenter {
    fire: Vec<HsvRange>,
    morphology_radius: u8,
}

impl ColorSegmenter {
    pub fn new(config: &ColorConfig) -> Self {
        Self {
            fire: config.fire.clone(),
            morphology_radius: config.morphology_radius,
        }
    }

    /// Pixels inside any fire band. No cleanup applied.
    pub fn threshold(&self, frame: &HsvFrame) -> Mask {
        frame.in_ranges(&self.fire)
    }

    /// Open-then-close with the configured disk.
    pub fn clean(&self, mask: &Mask) -> Mask {
        clean_mask(mask, self.morphology_radius)
    }

    /// `threshold` followed by `clean`.
    pub fn segment(&self, frame: &HsvFrame) -> Mask {
        self.clean(&self.threshold(frame))
    }
}

/// Shared by the segmenter and the calibration probe.
pub(crate) fn clean_mask(mask: &Mask, radius: u8) -> Mask {
    if radius == 0 {
        return mask.clone();
    }
    let opened = open(mask, Norm::L1, radius);
    close(&opened, Norm::L1, radius)
}
