// THEORY:
// The `pipeline` module is the top-level API of the engine. `FrameProcessor`
// wires the stages together for one video stream and is the only component a
// capture loop or renderer talks to.
//
// Per frame, data flows strictly downstream:
//   frame -> HSV -> fire mask -> minus look-alikes -> open/close
//         -> (shapes, motion, flicker measured against the cleaned mask)
//         -> vote -> counter -> report
//
// All cross-frame memory is gathered in one owned `DetectorState` and lent to
// the stages that need it for the duration of a call. The stages themselves are
// immutable views of the configuration. A frame that violates the caller
// contract (empty, or a different size than the stream started with) is
// rejected before any stage runs, so a faulted call changes nothing.

use crate::config::{DetectorConfig, Profile};
use crate::core_modules::color_segmenter::ColorSegmenter;
use crate::core_modules::decision_engine::{DecisionEngine, Signals};
use crate::core_modules::exclusion_filter::ExclusionFilter;
use crate::core_modules::flicker_tracker::FlickerTracker;
use crate::core_modules::hsv::{HsvFrame, mask_area, to_gray};
use crate::core_modules::motion_estimator::MotionEstimator;
use crate::core_modules::shape_classifier::ShapeClassifier;
use crate::error::{EmberError, Result};
use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, debug_span, info, warn};

// Re-export the data structures that appear in the public API.
pub use crate::core_modules::contour::BoundingBox;
pub use crate::core_modules::decision_engine::AlertState;
pub use crate::core_modules::shape_classifier::Detection;

/// The only memory a detector carries from one frame to the next.
#[derive(Debug, Clone, Default)]
pub struct DetectorState {
    previous_gray: Option<GrayImage>,
    flicker_history: VecDeque<usize>,
    consecutive_votes: u32,
    frame_dimensions: Option<(u32, u32)>,
    frames_processed: u64,
}

impl DetectorState {
    fn new(flicker_window: usize) -> Self {
        Self {
            flicker_history: VecDeque::with_capacity(flicker_window),
            ..Self::default()
        }
    }

    pub fn previous_gray(&self) -> Option<&GrayImage> {
        self.previous_gray.as_ref()
    }

    pub fn flicker_history(&self) -> &VecDeque<usize> {
        &self.flicker_history
    }

    pub fn consecutive_votes(&self) -> u32 {
        self.consecutive_votes
    }

    /// Size locked in by the first frame of the stream.
    pub fn frame_dimensions(&self) -> Option<(u32, u32)> {
        self.frame_dimensions
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}

/// Result record for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    /// Zero-based position of the frame in the stream.
    pub frame_index: u64,
    pub alert_active: bool,
    /// Percentage in `[0, 100]`.
    pub confidence: f64,
    pub motion_ratio: f64,
    pub flicker_detected: bool,
    /// `None` while the flicker window is warming up.
    pub flicker_variance: Option<f64>,
    /// Accepted regions, for overlay drawing.
    pub detections: Vec<Detection>,
    pub state: AlertState,
    pub consecutive_votes: u32,
    /// Pixels in the cleaned candidate mask.
    pub candidate_area: usize,
    /// Whether this frame voted for fire.
    pub voted: bool,
}

impl FrameReport {
    pub fn bounding_boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.detections.iter().map(|d| &d.bounding_box)
    }
}

/// Flame detector for a single video stream.
pub struct FrameProcessor {
    config: DetectorConfig,
    segmenter: ColorSegmenter,
    exclusion: ExclusionFilter,
    classifier: ShapeClassifier,
    motion: MotionEstimator,
    flicker: FlickerTracker,
    decision: DecisionEngine,
    state: DetectorState,
}

impl FrameProcessor {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            segmenter: ColorSegmenter::new(&config.color),
            exclusion: ExclusionFilter::new(&config.color),
            classifier: ShapeClassifier::new(&config.shape),
            motion: MotionEstimator::new(&config.motion),
            flicker: FlickerTracker::new(&config.flicker),
            decision: DecisionEngine::new(&config.decision, config.motion.min_motion_ratio),
            state: DetectorState::new(config.flicker.window),
            config,
        })
    }

    pub fn from_profile(profile: Profile) -> Result<Self> {
        Self::new(DetectorConfig::from_profile(profile))
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Forgets the stream: same as a fresh detector with the same configuration.
    pub fn reset(&mut self) {
        self.state = DetectorState::new(self.config.flicker.window);
    }

    /// Shorthand for `process_frame(..)?.alert_active`.
    pub fn fire_detected(&mut self, frame: &RgbImage) -> Result<bool> {
        Ok(self.process_frame(frame)?.alert_active)
    }

    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<FrameReport> {
        let frame_index = self.state.frames_processed;
        let span = debug_span!("process_frame", frame = frame_index);
        let _enter = span.enter();

        let dimensions = self.check_frame(frame)?;

        // Stage 1: colour candidates, look-alikes removed, then cleaned.
        let hsv = HsvFrame::from_rgb(frame);
        let mut candidate = self.segmenter.threshold(&hsv);
        let excluded = self.exclusion.apply(&mut candidate, &hsv);
        let candidate = self.segmenter.clean(&candidate);
        let candidate_area = mask_area(&candidate);

        // Stage 2: geometric gates.
        let detections = self.classifier.detect(&candidate);

        // Stage 3: temporal signals against the same mask.
        let motion_ratio = self
            .motion
            .measure(&mut self.state.previous_gray, to_gray(frame), &candidate)?;
        self.state.frame_dimensions = Some(dimensions);
        let flicker = self
            .flicker
            .observe(&mut self.state.flicker_history, candidate_area);

        // Stage 4: fusion.
        let signals = Signals {
            detections: detections.len(),
            motion_ratio,
            flicker_detected: flicker.detected,
        };
        let decision = self
            .decision
            .decide(&mut self.state.consecutive_votes, &signals);
        self.state.frames_processed += 1;

        debug!(
            candidate_area,
            excluded,
            detections = detections.len(),
            motion_ratio,
            flicker = flicker.detected,
            flicker_variance = flicker.normalized_variance,
            voted = decision.voted,
            votes = decision.consecutive_votes,
            "frame processed"
        );
        if let Some(state) = decision.transition {
            info!(%state, confidence = decision.confidence, "fire alert state changed");
        }

        Ok(FrameReport {
            frame_index,
            alert_active: decision.alert_active(),
            confidence: decision.confidence,
            motion_ratio,
            flicker_detected: flicker.detected,
            flicker_variance: flicker.normalized_variance,
            detections,
            state: decision.state,
            consecutive_votes: decision.consecutive_votes,
            candidate_area,
            voted: decision.voted,
        })
    }

    fn check_frame(&self, frame: &RgbImage) -> Result<(u32, u32)> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            warn!(width, height, "rejecting empty frame");
            return Err(EmberError::EmptyFrame { width, height });
        }
        if let Some(expected) = self.state.frame_dimensions {
            if expected != (width, height) {
                warn!(?expected, actual = ?(width, height), "rejecting resized frame");
                return Err(EmberError::DimensionMismatch {
                    expected,
                    actual: (width, height),
                });
            }
        }
        Ok((width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bounds;
    use image::Rgb;

    fn plain(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([18, 22, 30]))
    }

    #[test]
    fn invalid_configuration_is_refused_at_construction() {
        let mut config = DetectorConfig::strict();
        config.shape.area = Bounds::new(10.0, 1.0);
        assert!(matches!(
            FrameProcessor::new(config),
            Err(EmberError::InvalidConfig(_))
        ));
    }

    #[test]
    fn first_frame_never_moves_or_alerts() {
        let mut processor = FrameProcessor::from_profile(Profile::Strict).unwrap();
        let report = processor.process_frame(&plain(64, 48)).unwrap();
        assert_eq!(report.frame_index, 0);
        assert_eq!(report.motion_ratio, 0.0);
        assert!(!report.alert_active);
        assert_eq!(report.state, AlertState::Quiescent);
        assert_eq!(report.flicker_variance, None);
        assert!(processor.state().previous_gray().is_some());
    }

    #[test]
    fn empty_frame_is_a_fault_that_changes_nothing() {
        let mut processor = FrameProcessor::from_profile(Profile::Permissive).unwrap();
        let err = processor.process_frame(&RgbImage::new(0, 10)).unwrap_err();
        assert_eq!(err, EmberError::EmptyFrame { width: 0, height: 10 });
        assert_eq!(processor.state().frames_processed(), 0);
        assert!(processor.state().previous_gray().is_none());
    }

    #[test]
    fn resized_frame_is_a_fault_that_changes_nothing() {
        let mut processor = FrameProcessor::from_profile(Profile::Strict).unwrap();
        processor.process_frame(&plain(64, 48)).unwrap();
        let err = processor.process_frame(&plain(32, 24)).unwrap_err();
        assert_eq!(
            err,
            EmberError::DimensionMismatch {
                expected: (64, 48),
                actual: (32, 24)
            }
        );
        assert_eq!(processor.state().frames_processed(), 1);
        assert_eq!(processor.state().flicker_history().len(), 1);
        assert_eq!(
            processor.state().previous_gray().map(|g| g.dimensions()),
            Some((64, 48))
        );
        assert!(processor.process_frame(&plain(64, 48)).is_ok());
    }

    #[test]
    fn reset_forgets_the_stream() {
        let mut processor = FrameProcessor::from_profile(Profile::Strict).unwrap();
        processor.process_frame(&plain(64, 48)).unwrap();
        processor.process_frame(&plain(64, 48)).unwrap();
        processor.reset();
        let state = processor.state();
        assert_eq!(state.frames_processed(), 0);
        assert!(state.previous_gray().is_none());
        assert!(state.flicker_history().is_empty());
        assert_eq!(state.frame_dimensions(), None);
        // A different size is fine after a reset.
        let report = processor.process_frame(&plain(32, 24)).unwrap();
        assert_eq!(report.frame_index, 0);
    }

    #[test]
    fn background_only_frames_never_vote() {
        let mut processor = FrameProcessor::from_profile(Profile::Permissive).unwrap();
        for _ in 0..8 {
            let report = processor.process_frame(&plain(64, 48)).unwrap();
            assert_eq!(report.candidate_area, 0);
            assert!(report.detections.is_empty());
            assert!(!report.voted);
            assert_eq!(report.consecutive_votes, 0);
        }
        assert!(!processor.fire_detected(&plain(64, 48)).unwrap());
    }
}
