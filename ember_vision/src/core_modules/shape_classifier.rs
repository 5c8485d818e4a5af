// THEORY:
// The `ShapeClassifier` is the geometric filter between the colour mask and the
// temporal signals. A contour must pass four independent gates to count as
// fire-like: area, circularity, aspect ratio and solidity. The middle-band
// gates are what separate flames from look-alikes: a hand or a ball is smooth
// and nearly convex, a flame outline is ragged but still compact.
//
// Degenerate geometry is never an error. Zero perimeter, a zero-sided bounding
// rectangle or an empty hull simply fail their gate.

use crate::config::{Bounds, ShapeConfig};
use crate::core_modules::contour::{BoundingBox, ContourGeometry, outer_contours};
use crate::core_modules::hsv::Mask;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use tracing::trace;

/// An accepted contour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub area: f64,
    pub circularity: f64,
    pub aspect_ratio: f64,
    pub solidity: f64,
}

/// The first gate a contour failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    Area(f64),
    ZeroPerimeter,
    Circularity(f64),
    DegenerateRectangle,
    AspectRatio(f64),
    ZeroHullArea,
    Solidity(f64),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Area(v) => write!(f, "area {v:.1} out of bounds"),
            Rejection::ZeroPerimeter => f.write_str("zero perimeter"),
            Rejection::Circularity(v) => write!(f, "circularity {v:.3} out of bounds"),
            Rejection::DegenerateRectangle => f.write_str("degenerate bounding rectangle"),
            Rejection::AspectRatio(v) => write!(f, "aspect ratio {v:.3} out of bounds"),
            Rejection::ZeroHullArea => f.write_str("zero convex hull area"),
            Rejection::Solidity(v) => write!(f, "solidity {v:.3} out of bounds"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Accepted(Detection),
    Rejected(Rejection),
}

#[derive(Debug, Clone)]
pub struct ShapeClassifier {
    config: ShapeConfig,
}

impl ShapeClassifier {
    pub fn new(config: &ShapeConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn classify(&self, contour: &[Point<i32>]) -> Classification {
        let Some(geometry) = ContourGeometry::measure(contour) else {
            return Classification::Rejected(Rejection::Area(0.0));
        };
        match self.gate(&geometry) {
            Ok(detection) => Classification::Accepted(detection),
            Err(rejection) => Classification::Rejected(rejection),
        }
    }

    /// Accepted detections among the outer contours of `mask`, in trace order.
    pub fn detect(&self, mask: &Mask) -> Vec<Detection> {
        outer_contours(mask)
            .iter()
            .filter_map(|contour| match self.classify(contour) {
                Classification::Accepted(detection) => Some(detection),
                Classification::Rejected(reason) => {
                    trace!(points = contour.len(), %reason, "contour rejected");
                    None
                }
            })
            .collect()
    }

    fn gate(&self, geometry: &ContourGeometry) -> Result<Detection, Rejection> {
        let area = geometry.area;
        check(&self.config.area, area, Rejection::Area)?;

        if geometry.perimeter <= f64::EPSILON {
            return Err(Rejection::ZeroPerimeter);
        }
        let circularity = 4.0 * PI * area / geometry.perimeter.powi(2);
        check(&self.config.circularity, circularity, Rejection::Circularity)?;

        let rect = geometry
            .min_rect
            .filter(|r| r.width > f64::EPSILON && r.height > f64::EPSILON)
            .ok_or(Rejection::DegenerateRectangle)?;
        let aspect_ratio = rect.width / rect.height;
        check(&self.config.aspect_ratio, aspect_ratio, Rejection::AspectRatio)?;

        if geometry.hull_area <= f64::EPSILON {
            return Err(Rejection::ZeroHullArea);
        }
        let solidity = area / geometry.hull_area;
        check(&self.config.solidity, solidity, Rejection::Solidity)?;

        Ok(Detection {
            bounding_box: geometry.bounding_box,
            area,
            circularity,
            aspect_ratio,
            solidity,
        })
    }
}

fn check(bounds: &Bounds, value: f64, reject: fn(f64) -> Rejection) -> Result<(), Rejection> {
    if bounds.contains(value) {
        Ok(())
    } else {
        Err(reject(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use image::{GrayImage, Luma};

    fn fill(mask: &mut GrayImage, inside: impl Fn(f64, f64) -> bool) {
        for y in 0..mask.height() {
            for x in 0..mask.width() {
                if inside(x as f64, y as f64) {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
    }

    /// Six-lobed star around (100, 100).
    fn star_mask(radius: f64, amplitude: f64) -> GrayImage {
        let mut mask = GrayImage::new(200, 200);
        fill(&mut mask, |x, y| {
            let (dx, dy) = (x - 100.0, y - 100.0);
            let r = dx.hypot(dy);
            let theta = dy.atan2(dx);
            r <= radius * (1.0 + amplitude * (6.0 * theta).sin())
        });
        mask
    }

    fn disk_mask(radius: f64) -> GrayImage {
        let mut mask = GrayImage::new(200, 200);
        fill(&mut mask, |x, y| (x - 100.0).hypot(y - 100.0) <= radius);
        mask
    }

    #[test]
    fn jagged_star_passes_the_strict_gates() {
        let classifier = ShapeClassifier::new(&DetectorConfig::strict().shape);
        let detections = classifier.detect(&star_mask(40.0, 0.3));
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert!(d.circularity > 0.25 && d.circularity < 0.7, "{d:?}");
        assert!(d.solidity > 0.4 && d.solidity < 0.85, "{d:?}");
        assert!(d.aspect_ratio > 0.6 && d.aspect_ratio < 1.8, "{d:?}");
    }

    #[test]
    fn smooth_disk_is_rejected_by_strict_but_kept_by_permissive() {
        let mask = disk_mask(35.0);
        let contours = outer_contours(&mask);
        let strict = ShapeClassifier::new(&DetectorConfig::strict().shape);
        assert!(matches!(
            strict.classify(&contours[0]),
            Classification::Rejected(Rejection::Circularity(_))
        ));
        // A traced disk scores about 0.9 circularity, above the permissive 0.8 bound too.
        let permissive = ShapeClassifier::new(&DetectorConfig::permissive().shape);
        assert!(matches!(
            permissive.classify(&contours[0]),
            Classification::Rejected(Rejection::Circularity(_))
        ));
    }

    #[test]
    fn small_blob_fails_the_area_gate() {
        let classifier = ShapeClassifier::new(&DetectorConfig::strict().shape);
        let contours = outer_contours(&star_mask(10.0, 0.3));
        assert!(matches!(
            classifier.classify(&contours[0]),
            Classification::Rejected(Rejection::Area(_))
        ));
    }

    #[test]
    fn elongated_region_fails_the_aspect_gate() {
        let mut config = DetectorConfig::strict().shape;
        config.circularity = Bounds::new(0.0, 1.0);
        config.solidity = Bounds::new(0.0, 1.0);
        let classifier = ShapeClassifier::new(&config);

        let mut mask = GrayImage::new(200, 200);
        fill(&mut mask, |x, y| (20.0..=180.0).contains(&x) && (90.0..=110.0).contains(&y));
        let contours = outer_contours(&mask);
        match classifier.classify(&contours[0]) {
            Classification::Rejected(Rejection::AspectRatio(ratio)) => assert!(ratio > 7.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn degenerate_contours_are_rejected_not_faulted() {
        let mut config = DetectorConfig::permissive().shape;
        config.area = Bounds::new(0.0, 1e9);
        let classifier = ShapeClassifier::new(&config);

        assert_eq!(
            classifier.classify(&[Point::new(3, 3)]),
            Classification::Rejected(Rejection::ZeroPerimeter)
        );
        // A horizontal line: zero-height rectangle.
        let line = [Point::new(0, 0), Point::new(5, 0), Point::new(10, 0)];
        assert_eq!(
            classifier.classify(&line),
            Classification::Rejected(Rejection::DegenerateRectangle)
        );
        assert_eq!(
            classifier.classify(&[]),
            Classification::Rejected(Rejection::Area(0.0))
        );
    }
}
