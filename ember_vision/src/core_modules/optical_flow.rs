// THEORY:
// Dense pyramidal Lucas-Kanade flow. Every pixel gets its own motion vector,
// solved from the structure tensor of the previous frame over a Gaussian
// window around it. A coarse-to-fine pyramid lets the solver follow displacements
// larger than the window: the flow found at one level, doubled, seeds the next
// finer level, which only has to resolve the residual.
//
// Pixels whose window has no usable texture (smallest eigenvalue of the
// structure tensor below the configured floor) keep whatever flow the coarser
// level handed down. On a flat background that is zero.
//
// Gradients are Scharr responses, the window weighting is a Gaussian blur of
// the per-pixel products and each pyramid level is a triangle-filtered resize.

use crate::config::FlowConfig;
use crate::error::{EmberError, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_scharr, vertical_scharr};

/// Per-pixel motion between two frames, in pixels per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    width: u32,
    height: u32,
    dx: Vec<f32>,
    dy: Vec<f32>,
}

impl FlowField {
    pub fn zero(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            dx: vec![0.0; len],
            dy: vec![0.0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn vector(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) as usize;
        Some((self.dx[i], self.dy[i]))
    }

    pub fn magnitude(&self, x: u32, y: u32) -> Option<f32> {
        self.vector(x, y).map(|(dx, dy)| dx.hypot(dy))
    }

    /// Magnitudes in row-major order.
    pub fn magnitudes(&self) -> impl Iterator<Item = f32> + '_ {
        self.dx.iter().zip(&self.dy).map(|(dx, dy)| dx.hypot(*dy))
    }

    /// Nearest-neighbour upscale to the next finer pyramid level.
    fn upscaled(&self, width: u32, height: u32) -> Self {
        let mut out = Self::zero(width, height);
        for y in 0..height {
            let sy = (y / 2).min(self.height.saturating_sub(1));
            for x in 0..width {
                let sx = (x / 2).min(self.width.saturating_sub(1));
                let src = (sy * self.width + sx) as usize;
                let dst = (y * width + x) as usize;
                out.dx[dst] = 2.0 * self.dx[src];
                out.dy[dst] = 2.0 * self.dy[src];
            }
        }
        out
    }
}

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// The Scharr kernel weighs a one-pixel step 32 times.
const SCHARR_SCALE: f32 = 32.0;

/// Intensity gradients of one pyramid level, in grey levels per pixel.
fn gradients(image: &GrayImage) -> (Vec<f32>, Vec<f32>) {
    let scaled = |g: &i16| *g as f32 / SCHARR_SCALE;
    let gx = horizontal_scharr(image).as_raw().iter().map(scaled).collect();
    let gy = vertical_scharr(image).as_raw().iter().map(scaled).collect();
    (gx, gy)
}

/// Gaussian-weighted local mean of `value(i)` around every pixel `i`.
fn window_means(width: u32, height: u32, sigma: f32, value: impl Fn(usize) -> f32) -> Vec<f32> {
    let plane = FloatImage::from_fn(width, height, |x, y| Luma([value((y * width + x) as usize)]));
    gaussian_blur_f32(&plane, sigma).into_raw()
}

/// Bilinear sample, clamped to the image edge.
fn sample(image: &GrayImage, x: f32, y: f32) -> f32 {
    let (width, height) = image.dimensions();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);
    let at = |x, y| image.get_pixel(x, y)[0] as f32;
    let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
    let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Half-resolution copy for the next pyramid level.
fn downsampled(image: &GrayImage) -> GrayImage {
    imageops::resize(image, image.width() / 2, image.height() / 2, FilterType::Triangle)
}

/// Dense coarse-to-fine Lucas-Kanade solver.
#[derive(Debug, Clone)]
pub struct PyramidalFlow {
    config: FlowConfig,
}

impl PyramidalFlow {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Flow that carries `previous` onto `next`.
    pub fn compute(&self, previous: &GrayImage, next: &GrayImage) -> Result<FlowField> {
        if previous.dimensions() != next.dimensions() {
            return Err(EmberError::DimensionMismatch {
                expected: previous.dimensions(),
                actual: next.dimensions(),
            });
        }
        let (width, height) = previous.dimensions();
        if width == 0 || height == 0 {
            return Err(EmberError::EmptyFrame { width, height });
        }

        let mut previous_levels = vec![previous.clone()];
        let mut next_levels = vec![next.clone()];
        while previous_levels.len() < self.config.pyramid_levels as usize {
            let (Some(p), Some(n)) = (previous_levels.last(), next_levels.last()) else {
                break;
            };
            if p.width() < 2 || p.height() < 2 {
                break;
            }
            let (p, n) = (downsampled(p), downsampled(n));
            previous_levels.push(p);
            next_levels.push(n);
        }

        let coarsest = previous_levels.len() - 1;
        let (top_width, top_height) = previous_levels[coarsest].dimensions();
        let mut field = FlowField::zero(top_width, top_height);
        for level in (0..=coarsest).rev() {
            let (p, n) = (&previous_levels[level], &next_levels[level]);
            if level != coarsest {
                field = field.upscaled(p.width(), p.height());
            }
            self.refine(p, n, &mut field);
        }
        Ok(field)
    }

    fn refine(&self, previous: &GrayImage, next: &GrayImage, field: &mut FlowField) {
        let (w, h) = previous.dimensions();
        let sigma = (self.config.window_radius as f32 / 2.0).max(0.5);
        let min_eigenvalue = self.config.min_eigenvalue;

        let (gx, gy) = gradients(previous);
        let sxx = window_means(w, h, sigma, |i| gx[i] * gx[i]);
        let sxy = window_means(w, h, sigma, |i| gx[i] * gy[i]);
        let syy = window_means(w, h, sigma, |i| gy[i] * gy[i]);

        let trackable: Vec<Option<(f32, f32, f32, f32)>> = (0..sxx.len())
            .map(|i| {
                let (a, b, c) = (sxx[i], sxy[i], syy[i]);
                let det = a * c - b * b;
                let trace = a + c;
                let smallest = (trace - (trace * trace - 4.0 * det).max(0.0).sqrt()) / 2.0;
                (smallest >= min_eigenvalue && det.abs() > f32::EPSILON).then_some((a, b, c, det))
            })
            .collect();
        let before: Vec<f32> = previous.as_raw().iter().map(|&v| v as f32).collect();

        for _ in 0..self.config.iterations {
            let temporal: Vec<f32> = before
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    let (x, y) = ((i as u32 % w) as f32, (i as u32 / w) as f32);
                    sample(next, x + field.dx[i], y + field.dy[i]) - value
                })
                .collect();
            let bx = window_means(w, h, sigma, |i| gx[i] * temporal[i]);
            let by = window_means(w, h, sigma, |i| gy[i] * temporal[i]);

            for (i, tensor) in trackable.iter().enumerate() {
                let Some((a, b, c, det)) = tensor else {
                    continue;
                };
                field.dx[i] -= (c * bx[i] - b * by[i]) / det;
                field.dy[i] -= (a * by[i] - b * bx[i]) / det;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn textured(width: u32, height: u32, shift_x: f32, shift_y: f32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let (fx, fy) = (x as f32 - shift_x, y as f32 - shift_y);
            let v = 128.0 + 50.0 * (fx / 4.0).sin() * (fy / 5.0).cos() + 30.0 * ((fx + fy) / 7.0).sin();
            Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }

    fn interior_mean(field: &FlowField, margin: u32) -> (f32, f32) {
        let (mut sx, mut sy, mut n) = (0.0, 0.0, 0.0);
        for y in margin..field.height() - margin {
            for x in margin..field.width() - margin {
                let (dx, dy) = field.vector(x, y).unwrap();
                sx += dx;
                sy += dy;
                n += 1.0;
            }
        }
        (sx / n, sy / n)
    }

    #[test]
    fn identical_frames_have_no_flow() {
        let frame = textured(64, 48, 0.0, 0.0);
        let field = PyramidalFlow::new(&FlowConfig::default())
            .compute(&frame, &frame)
            .unwrap();
        assert!(field.magnitudes().all(|m| m < 1e-3));
    }

    #[test]
    fn recovers_a_horizontal_shift() {
        let previous = textured(96, 96, 0.0, 0.0);
        let next = textured(96, 96, 4.0, 0.0);
        let field = PyramidalFlow::new(&FlowConfig::default())
            .compute(&previous, &next)
            .unwrap();
        let (dx, dy) = interior_mean(&field, 20);
        assert!((dx - 4.0).abs() < 0.75, "dx {dx}");
        assert!(dy.abs() < 0.75, "dy {dy}");
    }

    #[test]
    fn flat_frames_stay_at_zero() {
        let previous = GrayImage::from_pixel(32, 32, Luma([40]));
        let next = GrayImage::from_pixel(32, 32, Luma([90]));
        let field = PyramidalFlow::new(&FlowConfig::default())
            .compute(&previous, &next)
            .unwrap();
        assert!(field.magnitudes().all(|m| m == 0.0));
    }

    #[test]
    fn mismatched_inputs_are_a_fault() {
        let flow = PyramidalFlow::new(&FlowConfig::default());
        let err = flow
            .compute(&GrayImage::new(10, 10), &GrayImage::new(12, 10))
            .unwrap_err();
        assert_eq!(
            err,
            EmberError::DimensionMismatch {
                expected: (10, 10),
                actual: (12, 10)
            }
        );
    }

    #[test]
    fn tiny_frames_do_not_panic() {
        let flow = PyramidalFlow::new(&FlowConfig::default());
        let field = flow
            .compute(&GrayImage::new(1, 1), &GrayImage::new(1, 1))
            .unwrap();
        assert_eq!(field.magnitude(0, 0), Some(0.0));
        assert_eq!(field.magnitude(1, 0), None);
    }
}
