// THEORY:
// Alerting is a side effect layered on top of detection, not a variant of it.
// `Alerter` owns a `FrameProcessor` and an `AlertSink`, watches `alert_active`
// frame by frame and talks to the sink with its own cooldown clock. It never
// feeds anything back into the detector.
//
// Time is passed in by the caller, which keeps the alerter deterministic under
// test and lets a capture loop use frame timestamps instead of the wall clock.

use crate::error::Result;
use crate::pipeline::{FrameProcessor, FrameReport};
use image::RgbImage;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What a sink is told when an alert fires.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub frame_index: u64,
    pub confidence: f64,
    pub detections: usize,
    pub at: Instant,
}

/// Receiver of alerts: a siren, a notifier, a log.
pub trait AlertSink {
    fn raise(&mut self, event: &AlertEvent);

    /// The alert condition is over.
    fn clear(&mut self) {}
}

/// What the alerter did for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Idle,
    Raised,
    /// Active, but the last raise is still within the cooldown.
    Suppressed,
    Cleared,
}

pub struct Alerter<S: AlertSink> {
    processor: FrameProcessor,
    sink: S,
    cooldown: Duration,
    last_raised: Option<Instant>,
    was_active: bool,
}

impl<S: AlertSink> Alerter<S> {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);

    pub fn new(processor: FrameProcessor, sink: S) -> Self {
        Self {
            processor,
            sink,
            cooldown: Self::DEFAULT_COOLDOWN,
            last_raised: None,
            was_active: false,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_parts(self) -> (FrameProcessor, S) {
        (self.processor, self.sink)
    }

    /// Runs the detector on `frame` and reacts to its alert state at time `now`.
    pub fn process_frame(&mut self, frame: &RgbImage, now: Instant) -> Result<(FrameReport, AlertOutcome)> {
        let report = self.processor.process_frame(frame)?;
        let outcome = self.react(&report, now);
        Ok((report, outcome))
    }

    fn react(&mut self, report: &FrameReport, now: Instant) -> AlertOutcome {
        let was_active = std::mem::replace(&mut self.was_active, report.alert_active);

        if !report.alert_active {
            if was_active {
                self.sink.clear();
                return AlertOutcome::Cleared;
            }
            return AlertOutcome::Idle;
        }

        let cooled_down = self
            .last_raised
            .is_none_or(|last| now.saturating_duration_since(last) > self.cooldown);
        if !cooled_down {
            return AlertOutcome::Suppressed;
        }

        self.last_raised = Some(now);
        self.sink.raise(&AlertEvent {
            frame_index: report.frame_index,
            confidence: report.confidence,
            detections: report.detections.len(),
            at: now,
        });
        AlertOutcome::Raised
    }
}

/// Logs alerts through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn raise(&mut self, event: &AlertEvent) {
        warn!(
            frame = event.frame_index,
            confidence = event.confidence,
            detections = event.detections,
            "FIRE DETECTED"
        );
    }

    fn clear(&mut self) {
        info!("fire alert cleared");
    }
}
