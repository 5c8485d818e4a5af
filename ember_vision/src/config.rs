// THEORY:
// One immutable configuration drives every stage of the engine. The two detector
// profiles observed in the field (a strict one and a permissive one) are not
// separate code paths: they are two values of `DetectorConfig`, selected through
// `Profile`. Every threshold the engine compares against lives here and nowhere
// else.
//
// Hue thresholds use the engine's 8-bit scale (degrees / 2). Fire hue wraps
// around 0°, so the fire band and each look-alike class are lists of ranges that
// get unioned.

use crate::core_modules::hsv::Hsv;
use crate::error::{EmberError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive box in HSV space. Channels are `[hue, saturation, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        let channels = [hsv.hue, hsv.saturation, hsv.value];
        channels
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(c, (lo, hi))| lo <= c && c <= hi)
    }

    fn validate(&self, what: &str) -> Result<()> {
        for (channel, (lo, hi)) in ["hue", "saturation", "value"]
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
        {
            if lo > hi {
                return Err(EmberError::invalid_config(format!(
                    "{what}: {channel} lower bound {lo} exceeds upper bound {hi}"
                )));
            }
        }
        Ok(())
    }
}

/// Parses `h0,s0,v0,h1,s1,v1`.
impl std::str::FromStr for HsvRange {
    type Err = EmberError;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| EmberError::invalid_config(format!("hsv range `{s}`: {err}")))?;
        let [h0, s0, v0, h1, s1, v1] = values[..] else {
            return Err(EmberError::invalid_config(format!(
                "hsv range `{s}` needs six comma-separated values"
            )));
        };
        let range = HsvRange::new([h0, s0, v0], [h1, s1, v1]);
        range.validate("hsv range")?;
        Ok(range)
    }
}

/// Closed interval `[min, max]` used by every scalar gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    fn validate(&self, what: &str) -> Result<()> {
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(EmberError::invalid_config(format!(
                "{what}: bounds [{}, {}] are empty",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Colour classes that share the fire hue range but are not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookAlike {
    /// Skin tones: narrow hue band, low saturation, mid brightness.
    Skin,
    /// Dull, darker reds of ripe produce such as tomatoes.
    Produce,
    /// Red fabric: lowest saturation, broad brightness range.
    Cloth,
}

impl fmt::Display for LookAlike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LookAlike::Skin => "skin",
            LookAlike::Produce => "produce",
            LookAlike::Cloth => "cloth",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionClass {
    pub kind: LookAlike,
    pub ranges: Vec<HsvRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorConfig {
    /// Fire-candidate bands, unioned.
    pub fire: Vec<HsvRange>,
    /// Look-alike classes subtracted from the candidate mask.
    pub exclusions: Vec<ExclusionClass>,
    /// Radius of the disk used for the open/close cleanup passes.
    pub morphology_radius: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeConfig {
    /// Interior area of a contour, in pixels.
    pub area: Bounds,
    /// `4π·area / perimeter²`.
    pub circularity: Bounds,
    /// Width over height of the minimal rotated bounding rectangle.
    pub aspect_ratio: Bounds,
    /// `area / convex hull area`.
    pub solidity: Bounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Number of pyramid levels, including the full-resolution one.
    pub pyramid_levels: u8,
    /// Integration window radius; the Gaussian weighting uses sigma = radius / 2.
    pub window_radius: u32,
    /// Refinement iterations per pyramid level.
    pub iterations: u32,
    /// Smallest structure-tensor eigenvalue (window-averaged) that still
    /// counts as trackable texture.
    pub min_eigenvalue: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            pyramid_levels: 3,
            window_radius: 7,
            iterations: 4,
            min_eigenvalue: 1e-2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    pub flow: FlowConfig,
    /// Flow magnitude, in pixels per frame, above which a pixel counts as moving.
    pub speed_threshold: f32,
    /// Fraction of masked pixels that must be moving for the motion signal to vote.
    pub min_motion_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlickerConfig {
    /// Capacity of the area history.
    pub window: usize,
    /// Samples required before flicker can be reported.
    pub min_samples: usize,
    /// `variance / (mean + 1)` must exceed this to report flicker.
    pub min_normalized_variance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Votes needed before the alert is raised.
    pub required_detections: u32,
}

/// Named presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Tight colour bands, jaggedness gate, five consecutive votes.
    Strict,
    /// Wider bands, looser geometry, three consecutive votes.
    Permissive,
}

impl std::str::FromStr for Profile {
    type Err = EmberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Profile::Strict),
            "permissive" => Ok(Profile::Permissive),
            other => Err(EmberError::invalid_config(format!("unknown profile `{other}`"))),
        }
    }
}

/// Every threshold the detector uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub color: ColorConfig,
    pub shape: ShapeConfig,
    pub motion: MotionConfig,
    pub flicker: FlickerConfig,
    pub decision: DecisionConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::strict()
    }
}

impl DetectorConfig {
    pub fn from_profile(profile: Profile) -> Self {
        match profile {
            Profile::Strict => Self::strict(),
            Profile::Permissive => Self::permissive(),
        }
    }

    /// Bright, highly saturated orange-red only; skin, produce and cloth removed.
    pub fn strict() -> Self {
        Self {
            color: ColorConfig {
                fire: vec![
                    HsvRange::new([0, 140, 150], [15, 255, 255]),
                    HsvRange::new([175, 140, 150], [180, 255, 255]),
                ],
                exclusions: vec![
                    ExclusionClass {
                        kind: LookAlike::Skin,
                        ranges: vec![HsvRange::new([0, 10, 60], [25, 110, 200])],
                    },
                    ExclusionClass {
                        kind: LookAlike::Produce,
                        ranges: vec![
                            HsvRange::new([0, 60, 80], [25, 140, 150]),
                            HsvRange::new([170, 60, 80], [180, 140, 150]),
                        ],
                    },
                    ExclusionClass {
                        kind: LookAlike::Cloth,
                        ranges: vec![
                            HsvRange::new([0, 50, 50], [25, 110, 180]),
                            HsvRange::new([170, 50, 50], [180, 110, 180]),
                        ],
                    },
                ],
                morphology_radius: 2,
            },
            shape: ShapeConfig {
                area: Bounds::new(800.0, 80_000.0),
                circularity: Bounds::new(0.25, 0.7),
                aspect_ratio: Bounds::new(0.6, 1.8),
                solidity: Bounds::new(0.4, 0.85),
            },
            motion: MotionConfig {
                flow: FlowConfig::default(),
                speed_threshold: 2.0,
                min_motion_ratio: 0.45,
            },
            flicker: FlickerConfig {
                window: 10,
                min_samples: 5,
                min_normalized_variance: 0.08,
            },
            decision: DecisionConfig {
                required_detections: 5,
            },
        }
    }

    /// Wider red-orange bands, cloth removed, geometry gates relaxed.
    pub fn permissive() -> Self {
        Self {
            color: ColorConfig {
                fire: vec![
                    HsvRange::new([0, 100, 100], [25, 255, 255]),
                    HsvRange::new([170, 100, 100], [180, 255, 255]),
                ],
                exclusions: vec![ExclusionClass {
                    kind: LookAlike::Cloth,
                    ranges: vec![
                        HsvRange::new([0, 50, 50], [25, 100, 150]),
                        HsvRange::new([170, 50, 50], [180, 100, 150]),
                    ],
                }],
                morphology_radius: 2,
            },
            shape: ShapeConfig {
                area: Bounds::new(500.0, 100_000.0),
                circularity: Bounds::new(0.0, 0.8),
                aspect_ratio: Bounds::new(0.3, 3.0),
                solidity: Bounds::new(0.0, 1.0),
            },
            motion: MotionConfig {
                flow: FlowConfig::default(),
                speed_threshold: 2.0,
                min_motion_ratio: 0.15,
            },
            flicker: FlickerConfig {
                window: 10,
                min_samples: 5,
                min_normalized_variance: 0.02,
            },
            decision: DecisionConfig {
                required_detections: 3,
            },
        }
    }

    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.color.fire.is_empty() {
            return Err(EmberError::invalid_config("at least one fire band is required"));
        }
        for range in &self.color.fire {
            range.validate("fire band")?;
        }
        for class in &self.color.exclusions {
            for range in &class.ranges {
                range.validate(&format!("{} exclusion", class.kind))?;
            }
        }

        self.shape.area.validate("shape.area")?;
        self.shape.circularity.validate("shape.circularity")?;
        self.shape.aspect_ratio.validate("shape.aspect_ratio")?;
        self.shape.solidity.validate("shape.solidity")?;

        let flow = &self.motion.flow;
        if flow.pyramid_levels == 0 || flow.window_radius == 0 || flow.iterations == 0 {
            return Err(EmberError::invalid_config(
                "flow needs at least one pyramid level, a non-zero window and one iteration",
            ));
        }
        if !(flow.min_eigenvalue >= 0.0) {
            return Err(EmberError::invalid_config("flow.min_eigenvalue must be non-negative"));
        }
        if !(self.motion.speed_threshold >= 0.0) || !(self.motion.min_motion_ratio >= 0.0) {
            return Err(EmberError::invalid_config("motion thresholds must be non-negative"));
        }

        if self.flicker.min_samples == 0 {
            return Err(EmberError::invalid_config("flicker.min_samples must be at least 1"));
        }
        if self.flicker.window < self.flicker.min_samples {
            return Err(EmberError::invalid_config(format!(
                "flicker.window ({}) is smaller than flicker.min_samples ({})",
                self.flicker.window, self.flicker.min_samples
            )));
        }
        if !(self.flicker.min_normalized_variance >= 0.0) {
            return Err(EmberError::invalid_config(
                "flicker.min_normalized_variance must be non-negative",
            ));
        }

        if self.decision.required_detections == 0 {
            return Err(EmberError::invalid_config(
                "decision.required_detections must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_presets_are_valid() {
        DetectorConfig::strict().validate().unwrap();
        DetectorConfig::permissive().validate().unwrap();
        assert_eq!(DetectorConfig::default(), DetectorConfig::strict());
    }

    #[test]
    fn presets_differ_where_the_profiles_differ() {
        let strict = DetectorConfig::strict();
        let permissive = DetectorConfig::permissive();
        assert_eq!(strict.decision.required_detections, 5);
        assert_eq!(permissive.decision.required_detections, 3);
        assert!(permissive.motion.min_motion_ratio < strict.motion.min_motion_ratio);
        assert_eq!(strict.color.exclusions.len(), 3);
        assert_eq!(permissive.color.exclusions[0].kind, LookAlike::Cloth);
    }

    #[test]
    fn profile_parses_case_insensitively() {
        assert_eq!("Strict".parse::<Profile>().unwrap(), Profile::Strict);
        assert_eq!("permissive".parse::<Profile>().unwrap(), Profile::Permissive);
        assert!("lenient".parse::<Profile>().is_err());
    }

    #[test]
    fn hsv_range_is_inclusive_on_every_channel() {
        let range = HsvRange::new([0, 140, 150], [15, 255, 255]);
        assert!(range.contains(Hsv::new(0, 140, 150)));
        assert!(range.contains(Hsv::new(15, 255, 255)));
        assert!(!range.contains(Hsv::new(16, 200, 200)));
        assert!(!range.contains(Hsv::new(5, 139, 200)));
        assert!(!range.contains(Hsv::new(5, 200, 149)));
    }

    #[test]
    fn hsv_range_parses_from_six_values() {
        let range: HsvRange = "0, 100, 100, 25, 255, 255".parse().unwrap();
        assert_eq!(range, HsvRange::new([0, 100, 100], [25, 255, 255]));
        assert!("0,100,100,25,255".parse::<HsvRange>().is_err());
        assert!("0,100,100,25,255,300".parse::<HsvRange>().is_err());
        assert!("30,0,0,10,255,255".parse::<HsvRange>().is_err());
    }

    #[test]
    fn validation_rejects_broken_invariants() {
        let mut config = DetectorConfig::strict();
        config.decision.required_detections = 0;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::strict();
        config.flicker.window = 3;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::strict();
        config.shape.solidity = Bounds::new(0.9, 0.4);
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::strict();
        config.color.fire.clear();
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::permissive();
        config.color.exclusions[0].ranges[0] = HsvRange::new([30, 0, 0], [10, 255, 255]);
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::strict();
        config.motion.flow.pyramid_levels = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_survives_json() {
        let config = DetectorConfig::permissive();
        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("\"cloth\""));
        let back: DetectorConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
