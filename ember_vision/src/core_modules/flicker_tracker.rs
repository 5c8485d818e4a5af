// THEORY:
// A flame's silhouette never holds still: its candidate area jumps around from
// frame to frame, while a red object keeps the same area. The tracker keeps a
// short sliding window of candidate areas and reports flicker once the window
// is warm and its normalized variance, `variance / (mean + 1)`, clears the
// threshold. The `+ 1` keeps the ratio finite when the mask is empty.
//
// Like the motion estimator, the window itself belongs to `DetectorState`.

use crate::config::FlickerConfig;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlickerReading {
    pub detected: bool,
    /// `None` while the window is still warming up.
    pub normalized_variance: Option<f64>,
    pub samples: usize,
}

#[derive(Debug, Clone)]
pub struct FlickerTracker {
    window: usize,
    min_samples: usize,
    threshold: f64,
}

impl FlickerTracker {
    pub fn new(config: &FlickerConfig) -> Self {
        Self {
            window: config.window,
            min_samples: config.min_samples,
            threshold: config.min_normalized_variance,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Pushes this frame's candidate area and evaluates the window.
    pub fn observe(&self, history: &mut VecDeque<usize>, area: usize) -> FlickerReading {
        history.push_back(area);
        while history.len() > self.window {
            history.pop_front();
        }

        let samples = history.len();
        if samples < self.min_samples {
            return FlickerReading {
                detected: false,
                normalized_variance: None,
                samples,
            };
        }

        let score = normalized_variance(history);
        FlickerReading {
            detected: score > self.threshold,
            normalized_variance: Some(score),
            samples,
        }
    }
}

/// Population variance over `mean + 1`.
pub fn normalized_variance(history: &VecDeque<usize>) -> f64 {
    let count = history.len() as f64;
    if count < 1.0 {
        return 0.0;
    }
    let mean = history.iter().map(|&a| a as f64).sum::<f64>() / count;
    let variance = history.iter().map(|&a| (a as f64 - mean).powi(2)).sum::<f64>() / count;
    variance / (mean + 1.0)
}
