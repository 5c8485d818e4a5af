use ember_vision::FrameReport;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const DETECTION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const ALERT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const WARMING_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
const ALERT_BORDER: u32 = 6;
const BAR_HEIGHT: u32 = 4;

/// Copy of `frame` with detection boxes, a confidence bar and, while
/// alerting, a red border.
pub fn annotate(frame: &RgbImage, report: &FrameReport) -> RgbImage {
    let mut canvas = frame.clone();

    for bbox in report.bounding_boxes() {
        for inset in 0..2 {
            let (w, h) = (bbox.width.saturating_sub(2 * inset), bbox.height.saturating_sub(2 * inset));
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at(bbox.x + inset as i32, bbox.y + inset as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, rect, DETECTION_COLOR);
        }
    }

    let (width, height) = canvas.dimensions();
    let bar = (width as f64 * report.confidence / 100.0).round() as u32;
    if bar > 0 && height >= BAR_HEIGHT {
        let color = if report.alert_active { ALERT_COLOR } else { WARMING_COLOR };
        draw_filled_rect_mut(&mut canvas, Rect::at(0, 0).of_size(bar.min(width), BAR_HEIGHT), color);
    }

    if report.alert_active {
        for inset in 0..ALERT_BORDER {
            let (w, h) = (width.saturating_sub(2 * inset), height.saturating_sub(2 * inset));
            if w == 0 || h == 0 {
                break;
            }
            draw_hollow_rect_mut(&mut canvas, Rect::at(inset as i32, inset as i32).of_size(w, h), ALERT_COLOR);
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_vision::AlertState;
    use ember_vision::pipeline::{BoundingBox, Detection};

    fn report(alert_active: bool, confidence: f64) -> FrameReport {
        FrameReport {
            frame_index: 0,
            alert_active,
            confidence,
            motion_ratio: 0.0,
            flicker_detected: false,
            flicker_variance: None,
            detections: vec![Detection {
                bounding_box: BoundingBox {
                    x: 20,
                    y: 20,
                    width: 10,
                    height: 10,
                },
                area: 80.0,
                circularity: 0.4,
                aspect_ratio: 1.0,
                solidity: 0.7,
            }],
            state: if alert_active {
                AlertState::Alerting
            } else {
                AlertState::Quiescent
            },
            consecutive_votes: 0,
            candidate_area: 100,
            voted: false,
        }
    }

    #[test]
    fn boxes_are_drawn_on_a_copy() {
        let frame = RgbImage::new(64, 64);
        let canvas = annotate(&frame, &report(false, 0.0));
        assert_eq!(canvas.get_pixel(20, 25), &DETECTION_COLOR);
        assert_eq!(canvas.get_pixel(25, 25), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(0, 40), &Rgb([0, 0, 0]));
        assert_eq!(frame.get_pixel(20, 25), &Rgb([0, 0, 0]));
    }

    #[test]
    fn alert_adds_a_border_and_a_full_bar() {
        let canvas = annotate(&RgbImage::new(64, 64), &report(true, 100.0));
        assert_eq!(canvas.get_pixel(0, 40), &ALERT_COLOR);
        assert_eq!(canvas.get_pixel(63, 2), &ALERT_COLOR);
        assert_eq!(canvas.get_pixel(32, 32), &Rgb([0, 0, 0]));
    }

    #[test]
    fn partial_confidence_draws_a_partial_bar() {
        let canvas = annotate(&RgbImage::new(100, 50), &report(false, 40.0));
        assert_eq!(canvas.get_pixel(10, 1), &WARMING_COLOR);
        assert_eq!(canvas.get_pixel(60, 1), &Rgb([0, 0, 0]));
    }
}
