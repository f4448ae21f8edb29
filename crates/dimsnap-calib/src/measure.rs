//! Candidate boxes to physical sizes.

use dimsnap_core::{BoundingBox, Detection};
use serde::{Deserialize, Serialize, Serializer};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::calibrate::CalibrationResult;
use crate::error::MeasurementError;

/// Round to two decimals for presentation.
#[inline]
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub(crate) fn serialize_round2<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round2(*v))
}

/// Physical size of one candidate.
///
/// Fields hold full precision; physical values serialise rounded to two
/// decimals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasuredObject {
    /// 1-based, in detection order.
    pub object_id: u32,
    #[serde(serialize_with = "serialize_round2")]
    pub width_physical: f64,
    #[serde(serialize_with = "serialize_round2")]
    pub height_physical: f64,
    pub width_px: f64,
    pub height_px: f64,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub quality_score: f64,
}

impl MeasuredObject {
    #[inline]
    pub fn area_physical(&self) -> f64 {
        self.width_physical * self.height_physical
    }
}

/// Candidate-role detections, in detection order.
pub fn candidate_detections(detections: &[Detection]) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| !d.is_reference())
        .copied()
        .collect()
}

/// Apply the calibration to every candidate box.
///
/// Reference-role detections are skipped, so the full detector output can be
/// passed. Each remaining candidate gets `object_id = index + 1`; width uses
/// the x scale and height the y scale.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(calibration, candidates), fields(candidates = candidates.len()))
)]
pub fn measure(
    calibration: &CalibrationResult,
    candidates: &[Detection],
) -> Result<Vec<MeasuredObject>, MeasurementError> {
    let (sx, sy) = (calibration.pixels_per_unit_x, calibration.pixels_per_unit_y);
    if !(sx.is_finite() && sy.is_finite()) || sx <= 0.0 || sy <= 0.0 {
        return Err(MeasurementError::InvalidScale { x: sx, y: sy });
    }
    let measured = candidates
        .iter()
        .filter(|d| !d.is_reference())
        .zip(1u32..)
        .map(|(det, object_id)| MeasuredObject {
            object_id,
            width_physical: det.bbox.width / sx,
            height_physical: det.bbox.height / sy,
            width_px: det.bbox.width,
            height_px: det.bbox.height,
            bbox: det.bbox,
            quality_score: det.quality_score,
        })
        .collect::<Vec<_>>();
    if measured.is_empty() {
        return Err(MeasurementError::NoCandidatesDetected);
    }

    for m in &measured {
        log::debug!(
            "object {}: {:.2} x {:.2} {} ({} x {} px)",
            m.object_id,
            m.width_physical,
            m.height_physical,
            calibration.unit,
            m.width_px,
            m.height_px
        );
    }
    Ok(measured)
}
