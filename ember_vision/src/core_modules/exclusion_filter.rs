// THEORY:
// Skin, ripe produce and red cloth all share the fire hue range. What separates
// them from a flame is brightness and saturation: a flame is self-luminous and
// highly saturated, the look-alikes sit in lower sub-bands. Each class is a
// union of hue bands (wrap-around), the classes are OR'd together and the
// result is removed from the candidate mask. Set difference against one mask
// does not depend on the order in which the classes are applied.

use crate::config::{ColorConfig, ExclusionClass, LookAlike};
use crate::core_modules::hsv::{HsvFrame, Mask, mask_area, subtract_mask, union_mask};
use image::GrayImage;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    classes: Vec<ExclusionClass>,
}

impl ExclusionFilter {
    pub fn new(config: &ColorConfig) -> Self {
        Self {
            classes: config.exclusions.clone(),
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = LookAlike> + '_ {
        self.classes.iter().map(|class| class.kind)
    }

    /// Mask of one look-alike class, or `None` if this filter does not carry it.
    pub fn class_mask(&self, frame: &HsvFrame, kind: LookAlike) -> Option<Mask> {
        self.classes
            .iter()
            .find(|class| class.kind == kind)
            .map(|class| frame.in_ranges(&class.ranges))
    }

    /// Union of every configured look-alike class.
    pub fn look_alike_mask(&self, frame: &HsvFrame) -> Mask {
        let mut combined = GrayImage::new(frame.width(), frame.height());
        for class in &self.classes {
            let class_mask = frame.in_ranges(&class.ranges);
            trace!(class = %class.kind, pixels = mask_area(&class_mask), "look-alike band");
            union_mask(&mut combined, &class_mask);
        }
        combined
    }

    /// Removes look-alike pixels from `candidate`. Returns how many were removed.
    pub fn apply(&self, candidate: &mut Mask, frame: &HsvFrame) -> usize {
        if self.classes.is_empty() {
            return 0;
        }
        let before = mask_area(candidate);
        subtract_mask(candidate, &self.look_alike_mask(frame));
        before - mask_area(candidate)
    }
}
