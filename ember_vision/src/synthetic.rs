// THEORY:
// Deterministic synthetic scenes. A flame is drawn as a six-lobed star in a
// bright, saturated orange-red with a brightness ripple that travels with it.
// `FlickeringFlame` scripts a short loop of frames in which the star jumps
// several pixels, swells and shrinks by about 15 % and rotates its lobes,
// which is enough to exercise every signal the detector fuses. Look-alikes
// are flat disks in the colour of the class they imitate.

use crate::config::LookAlike;
use image::{Rgb, RgbImage};
use std::f64::consts::TAU;

pub const BACKGROUND: Rgb<u8> = Rgb([18, 22, 30]);

/// Hue 5, saturation 100, value 120: inside the permissive fire band and the
/// permissive cloth band at the same time.
pub const BORDERLINE_RED: Rgb<u8> = Rgb([120, 81, 73]);

const DEFAULT_WIDTH: u32 = 256;
const DEFAULT_HEIGHT: u32 = 192;
const FLAME_RADIUS: f64 = 40.0;
const LOBES: f64 = 6.0;
const LOBE_AMPLITUDE: f64 = 0.3;
const PHASE_STEP: f64 = 0.3;

/// Per-frame displacement of the flame centre, looped.
const OFFSETS: [(f64, f64); 12] = [
    (0.0, 0.0),
    (7.0, 5.0),
    (1.0, -2.0),
    (8.0, 3.0),
    (0.0, -3.0),
    (7.0, 4.0),
    (-1.0, -2.0),
    (6.0, 5.0),
    (0.0, -1.0),
    (7.0, 3.0),
    (-1.0, -3.0),
    (6.0, 4.0),
];

/// Per-frame area scale of the flame, looped. Stays within ±15 %.
const SCALES: [f64; 12] = [1.0, 0.88, 1.12, 0.9, 1.1, 0.86, 1.14, 0.92, 1.08, 0.87, 1.13, 0.95];

/// Converts hue (degrees), saturation and value (0..=255) to RGB.
pub fn hsv_to_rgb(hue_degrees: f64, saturation: u8, value: u8) -> Rgb<u8> {
    let v = value as f64;
    let chroma = v * saturation as f64 / 255.0;
    let h = hue_degrees.rem_euclid(360.0) / 60.0;
    let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = v - chroma;
    let channel = |c: f64| (c + m).round().clamp(0.0, 255.0) as u8;
    Rgb([channel(r), channel(g), channel(b)])
}

/// Flame colour at offset `(dx, dy)` from the flame centre.
pub fn flame_color(dx: f64, dy: f64) -> Rgb<u8> {
    let value = 220.0 + 25.0 * (dx / 3.0).sin() * (dy / 4.0).cos();
    hsv_to_rgb(5.0, 200, value.round() as u8)
}

/// Representative colour of a look-alike class.
pub fn look_alike_color(kind: LookAlike) -> Rgb<u8> {
    match kind {
        LookAlike::Skin => hsv_to_rgb(20.0, 70, 170),
        LookAlike::Produce => hsv_to_rgb(6.0, 120, 130),
        LookAlike::Cloth => hsv_to_rgb(4.0, 80, 120),
    }
}

/// One star-shaped flame silhouette.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlameBlob {
    pub center: (f64, f64),
    /// Area scale; the radius grows with its square root.
    pub scale: f64,
    /// Rotation of the lobes, in radians.
    pub phase: f64,
}

impl FlameBlob {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (dx, dy) = (x - self.center.0, y - self.center.1);
        let theta = dy.atan2(dx);
        let reach = FLAME_RADIUS * self.scale.sqrt() * (1.0 + LOBE_AMPLITUDE * (LOBES * theta + self.phase).sin());
        dx.hypot(dy) <= reach
    }

    pub fn draw(&self, frame: &mut RgbImage) {
        let reach = FLAME_RADIUS * self.scale.sqrt() * (1.0 + LOBE_AMPLITUDE);
        let (x0, x1) = span(self.center.0, reach, frame.width());
        let (y0, y1) = span(self.center.1, reach, frame.height());
        for y in y0..y1 {
            for x in x0..x1 {
                let (fx, fy) = (x as f64, y as f64);
                if self.contains(fx, fy) {
                    frame.put_pixel(x, y, flame_color(fx - self.center.0, fy - self.center.1));
                }
            }
        }
    }
}

fn span(center: f64, reach: f64, limit: u32) -> (u32, u32) {
    let low = (center - reach).floor().max(0.0) as u32;
    let high = ((center + reach).ceil() + 1.0).clamp(0.0, limit as f64) as u32;
    (low.min(limit), high)
}

/// Fills a disk of `color` centred on `center`.
pub fn draw_disk(frame: &mut RgbImage, center: (f64, f64), radius: f64, color: Rgb<u8>) {
    let (x0, x1) = span(center.0, radius, frame.width());
    let (y0, y1) = span(center.1, radius, frame.height());
    for y in y0..y1 {
        for x in x0..x1 {
            if (x as f64 - center.0).hypot(y as f64 - center.1) <= radius {
                frame.put_pixel(x, y, color);
            }
        }
    }
}

/// Scripted flame that jitters in position and area every frame.
#[derive(Debug, Clone)]
pub struct FlickeringFlame {
    width: u32,
    height: u32,
    origin: (f64, f64),
    next_index: usize,
}

impl Default for FlickeringFlame {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl FlickeringFlame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            origin: (width as f64 / 2.0 - 4.0, height as f64 / 2.0 - 2.0),
            next_index: 0,
        }
    }

    pub fn blob(&self, index: usize) -> FlameBlob {
        let (dx, dy) = OFFSETS[index % OFFSETS.len()];
        FlameBlob {
            center: (self.origin.0 + dx, self.origin.1 + dy),
            scale: SCALES[index % SCALES.len()],
            phase: (index as f64 * PHASE_STEP) % TAU,
        }
    }

    /// The frame at `index`; the same index always renders the same image.
    pub fn frame(&self, index: usize) -> RgbImage {
        let mut frame = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        self.blob(index).draw(&mut frame);
        frame
    }
}

impl Iterator for FlickeringFlame {
    type Item = RgbImage;

    fn next(&mut self) -> Option<RgbImage> {
        let frame = self.frame(self.next_index);
        self.next_index += 1;
        Some(frame)
    }
}

/// A frame holding the first flame of the script, for static sequences.
pub fn static_flame(width: u32, height: u32) -> RgbImage {
    FlickeringFlame::new(width, height).frame(0)
}

/// A frame holding one solid look-alike disk in the middle.
pub fn look_alike_disk(width: u32, height: u32, kind: LookAlike, radius: f64) -> RgbImage {
    let mut frame = RgbImage::from_pixel(width, height, BACKGROUND);
    let center = (width as f64 / 2.0, height as f64 / 2.0);
    draw_disk(&mut frame, center, radius, look_alike_color(kind));
    frame
}

/// Frame `index` of a flat disk that follows the flame script's jumps and
/// swells. Its area scale is applied to `radius` like the flame's.
pub fn jittering_disk(width: u32, height: u32, color: Rgb<u8>, radius: f64, index: usize) -> RgbImage {
    let blob = FlickeringFlame::new(width, height).blob(index);
    let mut frame = RgbImage::from_pixel(width, height, BACKGROUND);
    draw_disk(&mut frame, blob.center, radius * blob.scale.sqrt(), color);
    frame
}
