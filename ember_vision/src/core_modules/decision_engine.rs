// THEORY:
// The `DecisionEngine` fuses the four signals. Colour alone is the weakest of
// them, so a frame only votes when shape, motion and flicker all corroborate
// it. Votes feed a saturating counter: a vote climbs by one up to the required
// count, a miss decays by one down to zero. The alert state is nothing more
// than "counter at the required count", so entering and leaving `Alerting`
// happen at the same bound.
//
// The counter lives in `DetectorState`; the engine only reads configuration.

use crate::config::DecisionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    #[default]
    Quiescent,
    Alerting,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertState::Quiescent => f.write_str("quiescent"),
            AlertState::Alerting => f.write_str("alerting"),
        }
    }
}

/// Everything the vote depends on for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    pub detections: usize,
    pub motion_ratio: f64,
    pub flicker_detected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub voted: bool,
    pub consecutive_votes: u32,
    pub state: AlertState,
    /// Percentage in `[0, 100]`.
    pub confidence: f64,
    /// Set when this frame moved the state across the bound.
    pub transition: Option<AlertState>,
}

impl Decision {
    pub fn alert_active(&self) -> bool {
        self.state == AlertState::Alerting
    }
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    required_detections: u32,
    min_motion_ratio: f64,
}

impl DecisionEngine {
    pub fn new(config: &DecisionConfig, min_motion_ratio: f64) -> Self {
        Self {
            required_detections: config.required_detections.max(1),
            min_motion_ratio,
        }
    }

    pub fn required_detections(&self) -> u32 {
        self.required_detections
    }

    pub fn vote(&self, signals: &Signals) -> bool {
        signals.detections >= 1 && signals.motion_ratio > self.min_motion_ratio && signals.flicker_detected
    }

    pub fn state_for(&self, votes: u32) -> AlertState {
        if votes >= self.required_detections {
            AlertState::Alerting
        } else {
            AlertState::Quiescent
        }
    }

    pub fn confidence(&self, votes: u32) -> f64 {
        (100.0 * votes as f64 / self.required_detections as f64).min(100.0)
    }

    /// Applies one frame's signals to the vote counter.
    pub fn decide(&self, votes: &mut u32, signals: &Signals) -> Decision {
        let before = self.state_for(*votes);
        let voted = self.vote(signals);
        *votes = if voted {
            votes.saturating_add(1).min(self.required_detections)
        } else {
            votes.saturating_sub(1)
        };

        let state = self.state_for(*votes);
        Decision {
            voted,
            consecutive_votes: *votes,
            state,
            confidence: self.confidence(*votes),
            transition: (state != before).then_some(state),
        }
    }
}
