//! Reference selection and pixels-per-unit calibration.

use dimsnap_core::{BoundingBox, Detection, ReferenceSpec, Unit};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::CalibrationError;
use crate::params::{CalibrationParams, ReferencePolicy};

/// Scale derived from the reference object for one request.
///
/// Both axis scales are kept: a perspective-skewed reference photographs with
/// a slightly different aspect ratio than its nominal one, and consumers may
/// weight the axes differently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub pixels_per_unit_x: f64,
    pub pixels_per_unit_y: f64,
    pub unit: Unit,
    /// In `[0, 1]`.
    pub calibration_confidence: f64,
    /// Reference box the scale was derived from.
    pub reference_box: BoundingBox,
    /// `|measured aspect - nominal aspect| / nominal aspect`.
    pub relative_aspect_error: f64,
    /// Whether the nominal width/height were swapped to fit the box.
    pub rotated: bool,
}

impl CalibrationResult {
    /// Isotropic scale (mean of the two axes).
    #[inline]
    pub fn mean_pixels_per_unit(&self) -> f64 {
        0.5 * (self.pixels_per_unit_x + self.pixels_per_unit_y)
    }
}

/// Pick the reference detection according to `policy`.
///
/// Zero references is always an error; several are an error under
/// [`ReferencePolicy::Unique`]. Multiple references are never averaged.
pub fn select_reference(
    detections: &[Detection],
    policy: ReferencePolicy,
) -> Result<&Detection, CalibrationError> {
    let mut references = detections.iter().filter(|d| d.is_reference());
    let first = references
        .next()
        .ok_or(CalibrationError::NoReferenceDetected)?;

    match policy {
        ReferencePolicy::Unique => {
            let extra = references.count();
            if extra > 0 {
                return Err(CalibrationError::AmbiguousReference { count: extra + 1 });
            }
            Ok(first)
        }
        ReferencePolicy::HighestQuality => Ok(references.fold(first, |best, d| {
            if d.quality_score > best.quality_score {
                d
            } else {
                best
            }
        })),
    }
}

fn relative_aspect_error(measured: f64, nominal: f64) -> f64 {
    (measured - nominal).abs() / nominal
}

/// Derive per-axis pixels-per-unit scales from one reference detection.
///
/// The detection's role is not checked; use [`select_reference`] or
/// [`calibrate_detections`] to pick it from a detector's output.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "debug",
        skip(reference, reference_detection, params),
        fields(reference = %reference.id)
    )
)]
pub fn calibrate(
    reference: &ReferenceSpec,
    reference_detection: &Detection,
    params: &CalibrationParams,
) -> Result<CalibrationResult, CalibrationError> {
    let (pw, ph) = (reference.physical_width, reference.physical_height);
    if !(pw.is_finite() && ph.is_finite()) || pw <= 0.0 || ph <= 0.0 {
        return Err(CalibrationError::InvalidReferenceSize {
            width: pw,
            height: ph,
        });
    }
    let b = reference_detection.bbox;
    let bbox = BoundingBox::new(b.x, b.y, b.width, b.height)?;
    let quality = reference_detection.quality_score;
    if !(0.0..=1.0).contains(&quality) {
        return Err(dimsnap_core::DetectionError::InvalidQuality(quality).into());
    }

    let measured_aspect = bbox.aspect_ratio();
    let mut physical = Vector2::new(pw, ph);
    let mut aspect_error = relative_aspect_error(measured_aspect, pw / ph);
    let mut rotated = false;
    if params.allow_rotated_reference {
        let swapped_error = relative_aspect_error(measured_aspect, ph / pw);
        if swapped_error < aspect_error {
            physical = Vector2::new(ph, pw);
            aspect_error = swapped_error;
            rotated = true;
        }
    }

    let scale = bbox.size().component_div(&physical);

    let mut confidence = quality;
    if aspect_error > params.aspect_tolerance {
        confidence *= (1.0 - params.aspect_discount * aspect_error).max(0.0);
        log::debug!(
            "reference '{}' aspect error {:.3} exceeds {:.3}; confidence {:.3} -> {:.3}",
            reference.id,
            aspect_error,
            params.aspect_tolerance,
            quality,
            confidence
        );
    }

    Ok(CalibrationResult {
        pixels_per_unit_x: scale.x,
        pixels_per_unit_y: scale.y,
        unit: reference.unit,
        calibration_confidence: confidence.clamp(0.0, 1.0),
        reference_box: bbox,
        relative_aspect_error: aspect_error,
        rotated,
    })
}

/// Select the reference among `detections` and calibrate against it.
pub fn calibrate_detections(
    reference: &ReferenceSpec,
    detections: &[Detection],
    params: &CalibrationParams,
) -> Result<CalibrationResult, CalibrationError> {
    let reference_detection = select_reference(detections, params.reference_policy)?;
    let calibration = calibrate(reference, reference_detection, params)?;
    log::info!(
        "calibrated on '{}': {:.3} x {:.3} px/{} (confidence {:.3})",
        reference.id,
        calibration.pixels_per_unit_x,
        calibration.pixels_per_unit_y,
        calibration.unit,
        calibration.calibration_confidence
    );
    Ok(calibration)
}
