use dimsnap_core::{AnnotatedImageRef, Unit};
use serde::{Deserialize, Serialize};

use crate::measure::{serialize_round2, MeasuredObject};

/// How the detections behind a result were produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// A real detector back end located the objects.
    #[default]
    Detector,
    /// The detector was unavailable; detections were synthesised and the
    /// numbers are not a measurement of the photo.
    Fallback,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::Detector => "detector",
            ProcessingMode::Fallback => "fallback",
        }
    }
}

/// Physical size of the primary target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetDimensions {
    #[serde(serialize_with = "serialize_round2")]
    pub width: f64,
    #[serde(serialize_with = "serialize_round2")]
    pub height: f64,
    pub unit: Unit,
}

/// Scale information reported alongside a result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationInfo {
    pub pixels_per_unit_x: f64,
    pub pixels_per_unit_y: f64,
    pub ref_width_px: f64,
    pub ref_height_px: f64,
    pub unit: Unit,
}

/// Externally visible outcome of one measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementResult {
    pub target_dimensions: TargetDimensions,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub annotated_image_ref: AnnotatedImageRef,
    pub all_objects: Vec<MeasuredObject>,
    pub calibration_info: CalibrationInfo,
    pub processing_mode: ProcessingMode,
    pub primary_object_id: u32,
}

impl MeasurementResult {
    /// The measured object reported as `target_dimensions`.
    pub fn primary(&self) -> Option<&MeasuredObject> {
        self.all_objects
            .iter()
            .find(|o| o.object_id == self.primary_object_id)
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        self.processing_mode == ProcessingMode::Fallback
    }
}
