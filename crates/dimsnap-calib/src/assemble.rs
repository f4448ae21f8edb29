//! Packaging calibration and measurements into a [`MeasurementResult`].

use dimsnap_core::AnnotatedImageRef;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::calibrate::CalibrationResult;
use crate::error::AssembleError;
use crate::measure::MeasuredObject;
use crate::params::TargetSelection;
use crate::result::{CalibrationInfo, MeasurementResult, ProcessingMode, TargetDimensions};

/// Assembly settings that are fixed per service rather than per call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssembleOptions {
    pub selection: TargetSelection,
    pub processing_mode: ProcessingMode,
}

fn first_max_by(
    measured: &[MeasuredObject],
    key: impl Fn(&MeasuredObject) -> f64,
) -> Option<&MeasuredObject> {
    let mut best: Option<&MeasuredObject> = None;
    for m in measured {
        // strict: ties keep the earlier object
        if best.map_or(true, |b| key(m) > key(b)) {
            best = Some(m);
        }
    }
    best
}

fn select_primary(
    measured: &[MeasuredObject],
    selection: TargetSelection,
) -> Option<&MeasuredObject> {
    match selection {
        TargetSelection::First => measured.iter().min_by_key(|m| m.object_id),
        TargetSelection::LargestArea => first_max_by(measured, MeasuredObject::area_physical),
        TargetSelection::HighestQuality => first_max_by(measured, |m| m.quality_score),
    }
}

/// Build the external result.
///
/// The confidence is `confidence_override` when given, otherwise the product
/// of the calibration confidence and the primary candidate's detection
/// quality. The function is pure: identical inputs give identical results.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(objects = measured.len()))
)]
pub fn assemble(
    calibration: &CalibrationResult,
    measured: &[MeasuredObject],
    confidence_override: Option<f64>,
    annotated_image_ref: AnnotatedImageRef,
    options: &AssembleOptions,
) -> Result<MeasurementResult, AssembleError> {
    if let Some(c) = confidence_override {
        if !(0.0..=1.0).contains(&c) {
            return Err(AssembleError::InvalidConfidence(c));
        }
    }
    let primary =
        select_primary(measured, options.selection).ok_or(AssembleError::NoMeasuredObjects)?;

    let confidence = confidence_override
        .unwrap_or(calibration.calibration_confidence * primary.quality_score)
        .clamp(0.0, 1.0);

    Ok(MeasurementResult {
        target_dimensions: TargetDimensions {
            width: primary.width_physical,
            height: primary.height_physical,
            unit: calibration.unit,
        },
        confidence,
        annotated_image_ref,
        all_objects: measured.to_vec(),
        calibration_info: CalibrationInfo {
            pixels_per_unit_x: calibration.pixels_per_unit_x,
            pixels_per_unit_y: calibration.pixels_per_unit_y,
            ref_width_px: calibration.reference_box.width,
            ref_height_px: calibration.reference_box.height,
            unit: calibration.unit,
        },
        processing_mode: options.processing_mode,
        primary_object_id: primary.object_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimsnap_core::{BoundingBox, Unit};

    fn calibration() -> CalibrationResult {
        CalibrationResult {
            pixels_per_unit_x: 10.0,
            pixels_per_unit_y: 10.0,
            unit: Unit::Cm,
            calibration_confidence: 0.8,
            reference_box: BoundingBox::new(0.0, 0.0, 85.6, 53.98).expect("box"),
            relative_aspect_error: 0.0,
            rotated: false,
        }
    }

    fn obj(id: u32, w: f64, h: f64, q: f64) -> MeasuredObject {
        MeasuredObject {
            object_id: id,
            width_physical: w / 10.0,
            height_physical: h / 10.0,
            width_px: w,
            height_px: h,
            bbox: BoundingBox::new(0.0, 0.0, w, h).expect("box"),
            quality_score: q,
        }
    }

    fn objects() -> Vec<MeasuredObject> {
        vec![obj(1, 50.0, 50.0, 0.6), obj(2, 200.0, 100.0, 0.5), obj(3, 60.0, 60.0, 0.9)]
    }

    fn uri() -> AnnotatedImageRef {
        AnnotatedImageRef::new("data:image/jpeg;base64,AA==")
    }

    #[test]
    fn first_selection_and_product_confidence() {
        let res = assemble(&calibration(), &objects(), None, uri(), &AssembleOptions::default())
            .expect("assemble");
        assert_eq!(res.primary_object_id, 1);
        assert_eq!(res.target_dimensions.width, 5.0);
        assert!((res.confidence - 0.48).abs() < 1e-12);
        assert_eq!(res.all_objects.len(), 3);
        assert_eq!(res.calibration_info.ref_width_px, 85.6);
        assert_eq!(res.processing_mode, ProcessingMode::Detector);
    }

    #[test]
    fn alternative_selection_rules() {
        let largest = AssembleOptions {
            selection: TargetSelection::LargestArea,
            ..AssembleOptions::default()
        };
        let res = assemble(&calibration(), &objects(), None, uri(), &largest).expect("assemble");
        assert_eq!(res.primary_object_id, 2);

        let quality = AssembleOptions {
            selection: TargetSelection::HighestQuality,
            ..AssembleOptions::default()
        };
        let res = assemble(&calibration(), &objects(), None, uri(), &quality).expect("assemble");
        assert_eq!(res.primary_object_id, 3);
        assert_eq!(res.primary().map(|o| o.width_px), Some(60.0));
    }

    #[test]
    fn override_is_validated_and_used() {
        let opts = AssembleOptions::default();
        let res = assemble(&calibration(), &objects(), Some(0.3), uri(), &opts).expect("assemble");
        assert_eq!(res.confidence, 0.3);
        assert_eq!(
            assemble(&calibration(), &objects(), Some(1.5), uri(), &opts),
            Err(AssembleError::InvalidConfidence(1.5))
        );
    }

    #[test]
    fn empty_measurements_fail() {
        assert_eq!(
            assemble(&calibration(), &[], None, uri(), &AssembleOptions::default()),
            Err(AssembleError::NoMeasuredObjects)
        );
    }

    #[test]
    fn assembling_twice_is_byte_identical() {
        let opts = AssembleOptions {
            selection: TargetSelection::LargestArea,
            processing_mode: ProcessingMode::Fallback,
        };
        let a = assemble(&calibration(), &objects(), None, uri(), &opts).expect("a");
        let b = assemble(&calibration(), &objects(), None, uri(), &opts).expect("b");
        assert_eq!(
            serde_json::to_vec(&a).expect("json"),
            serde_json::to_vec(&b).expect("json")
        );
        let json = serde_json::to_value(&a).expect("json");
        assert_eq!(json["processingMode"], "fallback");
        assert!(json["targetDimensions"]["unit"] == "cm");
    }
}
