// THEORY:
// Contours are the bridge between the pixel masks and the geometric gates.
// Only outer borders of top-level regions are kept: a hole inside a flame, or
// a region nested inside such a hole, never becomes a contour of its own.
// The mask is traced inside a one-pixel empty frame, otherwise a region
// touching the left edge is reported as a hole and lost.
//
// All measurements are taken on the traced boundary polygon (pixel centres),
// not on pixel counts, so area and perimeter stay consistent with each other.

use image::GrayImage;
use image::imageops;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::{arc_length, convex_hull};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

use crate::core_modules::hsv::Mask;

/// Ordered boundary points of one connected region.
pub type Contour = Vec<Point<i32>>;

/// Axis-aligned box in pixel coordinates, inclusive of its edge pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn of_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points.iter().skip(1) {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + (self.width as f64 - 1.0) / 2.0,
            self.y as f64 + (self.height as f64 - 1.0) / 2.0,
        )
    }
}

/// The minimal-area rectangle enclosing a contour, in any orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: (f64, f64),
    /// Side whose direction lies within 45° of the x axis.
    pub width: f64,
    /// The other side.
    pub height: f64,
    /// Direction of the `width` side, in degrees, within `[-45, 45]`.
    pub angle_degrees: f64,
}

impl RotatedRect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Every measurement the shape gates consume.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourGeometry {
    pub area: f64,
    pub perimeter: f64,
    pub hull_area: f64,
    pub min_rect: Option<RotatedRect>,
    pub bounding_box: BoundingBox,
}

impl ContourGeometry {
    /// `None` only for an empty contour.
    pub fn measure(contour: &[Point<i32>]) -> Option<Self> {
        let bounding_box = BoundingBox::of_points(contour)?;
        let hull = if contour.len() >= 3 {
            convex_hull(contour)
        } else {
            contour.to_vec()
        };
        Some(Self {
            area: polygon_area(contour),
            perimeter: if contour.len() > 1 {
                arc_length(contour, true)
            } else {
                0.0
            },
            hull_area: polygon_area(&hull),
            min_rect: min_area_rect(&hull),
            bounding_box,
        })
    }
}

/// Outer contours of the top-level regions of `mask`.
pub fn outer_contours(mask: &Mask) -> Vec<Contour> {
    let (width, height) = mask.dimensions();
    let mut framed = GrayImage::new(width + 2, height + 2);
    imageops::replace(&mut framed, mask, 1, 1);

    find_contours::<i32>(&framed)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points.into_iter().map(|p| Point::new(p.x - 1, p.y - 1)).collect())
        .collect()
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice_area.abs() as f64 / 2.0
}

/// Rotating-edge search over a convex hull: the optimal rectangle has one side
/// collinear with a hull edge.
pub fn min_area_rect(hull: &[Point<i32>]) -> Option<RotatedRect> {
    if hull.len() < 2 {
        return None;
    }
    let points: Vec<(f64, f64)> = hull.iter().map(|p| (p.x as f64, p.y as f64)).collect();

    let mut best: Option<(f64, RotatedRect)> = None;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let length = dx.hypot(dy);
        if length <= f64::EPSILON {
            continue;
        }
        let (ux, uy) = (dx / length, dy / length);

        let (mut min_u, mut max_u, mut min_v, mut max_v) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for (px, py) in &points {
            let along = px * ux + py * uy;
            let across = -px * uy + py * ux;
            min_u = min_u.min(along);
            max_u = max_u.max(along);
            min_v = min_v.min(across);
            max_v = max_v.max(across);
        }

        let (extent_u, extent_v) = (max_u - min_u, max_v - min_v);
        let area = extent_u * extent_v;
        if best.as_ref().is_some_and(|(best_area, _)| *best_area <= area) {
            continue;
        }

        let mid_u = (min_u + max_u) / 2.0;
        let mid_v = (min_v + max_v) / 2.0;
        let center = (mid_u * ux - mid_v * uy, mid_u * uy + mid_v * ux);

        // Name the sides by which one runs closer to horizontal.
        let rect = if ux.abs() >= uy.abs() {
            let angle = (uy / ux).atan().to_degrees();
            RotatedRect {
                center,
                width: extent_u,
                height: extent_v,
                angle_degrees: angle,
            }
        } else {
            let angle = -(ux / uy).atan().to_degrees();
            RotatedRect {
                center,
                width: extent_v,
                height: extent_u,
                angle_degrees: angle,
            }
        };
        best = Some((area, rect));
    }
    best.map(|(_, rect)| rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn filled_rect(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn rectangle_geometry() {
        let mut mask = GrayImage::new(40, 40);
        filled_rect(&mut mask, 5, 10, 21, 11);
        let contours = outer_contours(&mask);
        assert_eq!(contours.len(), 1);

        let geometry = ContourGeometry::measure(&contours[0]).unwrap();
        // Boundary through pixel centres: 20 x 10.
        assert!((geometry.area - 200.0).abs() < 1e-9);
        assert!((geometry.perimeter - 60.0).abs() < 1e-9);
        assert!((geometry.hull_area - 200.0).abs() < 1e-9);
        assert_eq!(
            geometry.bounding_box,
            BoundingBox { x: 5, y: 10, width: 21, height: 11 }
        );

        let rect = geometry.min_rect.unwrap();
        assert!((rect.width - 20.0).abs() < 1e-9);
        assert!((rect.height - 10.0).abs() < 1e-9);
        assert!((rect.center.0 - 15.0).abs() < 1e-9);
        assert!((rect.center.1 - 15.0).abs() < 1e-9);
    }

    #[test]
    fn tall_rectangle_reports_height_as_the_long_side() {
        let mut mask = GrayImage::new(40, 40);
        filled_rect(&mut mask, 5, 5, 6, 26);
        let contours = outer_contours(&mask);
        let rect = ContourGeometry::measure(&contours[0]).unwrap().min_rect.unwrap();
        assert!((rect.width - 5.0).abs() < 1e-9);
        assert!((rect.height - 25.0).abs() < 1e-9);
    }

    #[test]
    fn holes_and_nested_regions_are_not_separate_contours() {
        let mut mask = GrayImage::new(50, 50);
        filled_rect(&mut mask, 5, 5, 40, 40);
        for y in 15..35 {
            for x in 15..35 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        filled_rect(&mut mask, 22, 22, 6, 6);
        assert_eq!(outer_contours(&mask).len(), 1);
    }

    #[test]
    fn separate_regions_give_separate_contours() {
        let mut mask = GrayImage::new(60, 30);
        filled_rect(&mut mask, 2, 2, 10, 10);
        filled_rect(&mut mask, 30, 5, 10, 10);
        assert_eq!(outer_contours(&mask).len(), 2);
    }

    #[test]
    fn single_pixel_is_degenerate() {
        let mut mask = GrayImage::new(10, 10);
        mask.put_pixel(4, 4, Luma([255]));
        let contours = outer_contours(&mask);
        let geometry = ContourGeometry::measure(&contours[0]).unwrap();
        assert_eq!(geometry.area, 0.0);
        assert_eq!(geometry.perimeter, 0.0);
        assert!(geometry.min_rect.is_none());
    }

    fn filled_disk(mask: &mut GrayImage, cx: i32, cy: i32, radius: i32) {
        for (x, y, pixel) in mask.enumerate_pixels_mut() {
            let (dx, dy) = (x as i32 - cx, y as i32 - cy);
            if dx * dx + dy * dy <= radius * radius {
                *pixel = Luma([255]);
            }
        }
    }

    #[test]
    fn region_on_the_left_edge_is_traced() {
        let mut mask = GrayImage::new(100, 100);
        filled_disk(&mut mask, 0, 45, 30);
        let contours = outer_contours(&mask);
        assert_eq!(contours.len(), 1);
        let geometry = ContourGeometry::measure(&contours[0]).unwrap();
        assert_eq!(
            geometry.bounding_box,
            BoundingBox { x: 0, y: 15, width: 31, height: 61 }
        );
        assert!(geometry.area > 1000.0, "area {}", geometry.area);
    }

    #[test]
    fn region_in_a_corner_is_traced() {
        let mut mask = GrayImage::new(60, 60);
        filled_disk(&mut mask, 0, 0, 20);
        let contours = outer_contours(&mask);
        assert_eq!(contours.len(), 1);
        let bbox = BoundingBox::of_points(&contours[0]).unwrap();
        assert_eq!(bbox, BoundingBox { x: 0, y: 0, width: 21, height: 21 });
    }

    #[test]
    fn mirrored_edge_regions_measure_the_same() {
        let mut left = GrayImage::new(100, 100);
        filled_disk(&mut left, 0, 45, 30);
        filled_rect(&mut left, 0, 80, 12, 15);
        let right = imageops::flip_horizontal(&left);

        let measure = |mask: &GrayImage| {
            let mut all: Vec<ContourGeometry> = outer_contours(mask)
                .iter()
                .filter_map(|c| ContourGeometry::measure(c))
                .collect();
            all.sort_by_key(|g| g.bounding_box.y);
            all
        };
        let (left, right) = (measure(&left), measure(&right));
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 2);
        for (l, r) in left.iter().zip(&right) {
            let mirrored_x = 100 - (l.bounding_box.x + l.bounding_box.width as i32);
            assert_eq!(r.bounding_box.x, mirrored_x);
            assert_eq!(r.bounding_box.y, l.bounding_box.y);
            assert_eq!(r.bounding_box.width, l.bounding_box.width);
            assert!((l.area - r.area).abs() <= 0.01 * l.area);
            assert!((l.hull_area - r.hull_area).abs() <= 0.01 * l.hull_area);
        }
    }

    #[test]
    fn rotated_square_fits_a_tight_rectangle() {
        let diamond = vec![
            Point::new(10, 0),
            Point::new(20, 10),
            Point::new(10, 20),
            Point::new(0, 10),
        ];
        let rect = min_area_rect(&diamond).unwrap();
        assert!((rect.area() - 200.0).abs() < 1e-6);
        assert!((rect.width - rect.height).abs() < 1e-6);
        assert!(rect.angle_degrees.abs() <= 45.0 + 1e-9);
    }
}
