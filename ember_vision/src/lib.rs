// THEORY:
// This file is the entry point of the `ember_vision` library crate, a
// deterministic, rule-based flame detector for live video.
//
// The engine fuses four individually weak signals (colour, shape, motion and
// temporal flicker) into one vote per frame and smooths those votes with a
// saturating counter before it will raise an alert. Red cloth, skin and ripe
// produce share the flame's hue, so colour alone never triggers anything.
//
// `pipeline::FrameProcessor` is the public face of the engine: one instance per
// video stream, one call per frame. `alerter` layers cooldown-limited alerts on
// top of it, `parallel_pipeline` runs many streams at once, and the stages
// themselves live in `core_modules`.

pub mod alerter;
pub mod calibration;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod synthetic;

pub use config::{DetectorConfig, Profile};
pub use error::{EmberError, Result};
pub use pipeline::{AlertState, FrameProcessor, FrameReport};
