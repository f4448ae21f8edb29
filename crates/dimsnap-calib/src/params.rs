use serde::{Deserialize, Serialize};

/// How to pick the reference when the detector reports several.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Exactly one reference detection is required; more is an error.
    #[default]
    Unique,
    /// The reference with the highest quality wins; ties keep detection order.
    HighestQuality,
}

/// Rule selecting the primary target among measured objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSelection {
    /// First candidate in detection order.
    #[default]
    First,
    /// Largest physical area.
    LargestArea,
    /// Highest detector quality.
    HighestQuality,
}

/// Calibration settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    pub reference_policy: ReferencePolicy,
    /// Relative aspect-ratio error above which the reference is considered
    /// skewed and its confidence discounted.
    pub aspect_tolerance: f64,
    /// Confidence is multiplied by `max(0, 1 - aspect_discount * error)`
    /// once the tolerance is exceeded.
    pub aspect_discount: f64,
    /// Accept a reference photographed rotated by 90 degrees when swapping
    /// its nominal width and height fits the box better.
    pub allow_rotated_reference: bool,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            reference_policy: ReferencePolicy::Unique,
            aspect_tolerance: 0.15,
            aspect_discount: 2.0,
            allow_rotated_reference: false,
        }
    }
}
