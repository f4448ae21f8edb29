use std::time::{SystemTime, UNIX_EPOCH};

use dimsnap_calib::{MeasurementResult, ProcessingMode};
use dimsnap_core::{AnnotatedImageRef, BoundingBox, Unit};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::UserId;

/// Request facts stored next to the result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordMetadata {
    pub reference_object: String,
    pub custom_width: Option<f64>,
    pub custom_height: Option<f64>,
    pub processing_time_ms: u64,
}

/// One measured object of a stored measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasuredObjectRecord {
    pub object_id: u32,
    /// `Object <id>`.
    pub object_name: String,
    pub width: f64,
    pub height: f64,
    pub width_px: f64,
    pub height_px: f64,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// One stored measurement with its objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub reference_object: String,
    pub custom_width: Option<f64>,
    pub custom_height: Option<f64>,
    pub target_width: f64,
    pub target_height: f64,
    pub unit: Unit,
    pub confidence: f64,
    pub processing_time_ms: u64,
    pub annotated_image_ref: AnnotatedImageRef,
    pub processing_mode: ProcessingMode,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    #[serde(default)]
    pub objects: Vec<MeasuredObjectRecord>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

impl MeasurementRecord {
    /// New record with a fresh id, stamped with the current time.
    pub fn from_result(user: UserId, result: &MeasurementResult, meta: RecordMetadata) -> Self {
        let objects = result
            .all_objects
            .iter()
            .map(|o| MeasuredObjectRecord {
                object_id: o.object_id,
                object_name: format!("Object {}", o.object_id),
                width: o.width_physical,
                height: o.height_physical,
                width_px: o.width_px,
                height_px: o.height_px,
                bbox: o.bbox,
            })
            .collect();
        Self {
            id: Uuid::new_v4(),
            user_id: user,
            reference_object: meta.reference_object,
            custom_width: meta.custom_width,
            custom_height: meta.custom_height,
            target_width: result.target_dimensions.width,
            target_height: result.target_dimensions.height,
            unit: result.target_dimensions.unit,
            confidence: result.confidence,
            processing_time_ms: meta.processing_time_ms,
            annotated_image_ref: result.annotated_image_ref.clone(),
            processing_mode: result.processing_mode,
            created_at_ms: now_ms(),
            objects,
        }
    }

    pub fn with_created_at(mut self, created_at_ms: u64) -> Self {
        self.created_at_ms = created_at_ms;
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dimsnap_calib::{
        assemble, calibrate_detections, candidate_detections, measure, AssembleOptions,
        CalibrationParams,
    };
    use dimsnap_core::{Detection, ReferenceCatalog};

    pub(crate) fn sample_result() -> MeasurementResult {
        let spec = ReferenceCatalog::builtin()
            .lookup("credit-card", None)
            .expect("card");
        let detections = vec![
            Detection::reference(BoundingBox::new(0.0, 0.0, 85.6, 53.98).expect("box"), 1.0),
            Detection::candidate(BoundingBox::new(100.0, 0.0, 50.0, 20.0).expect("box"), 0.9),
            Detection::candidate(BoundingBox::new(200.0, 0.0, 30.0, 30.0).expect("box"), 0.8),
        ];
        let cal = calibrate_detections(&spec, &detections, &CalibrationParams::default())
            .expect("calibrate");
        let measured = measure(&cal, &candidate_detections(&detections)).expect("measure");
        assemble(
            &cal,
            &measured,
            None,
            AnnotatedImageRef::new("data:image/jpeg;base64,AA=="),
            &AssembleOptions::default(),
        )
        .expect("assemble")
    }

    pub(crate) fn sample_record(user: &str, created_at_ms: u64) -> MeasurementRecord {
        MeasurementRecord::from_result(
            UserId::new(user).expect("user"),
            &sample_result(),
            RecordMetadata {
                reference_object: "credit-card".into(),
                processing_time_ms: 42,
                ..RecordMetadata::default()
            },
        )
        .with_created_at(created_at_ms)
    }

    #[test]
    fn record_mirrors_the_result() {
        let rec = sample_record("alice", 1);
        assert_eq!(rec.objects.len(), 2);
        assert_eq!(rec.objects[1].object_name, "Object 2");
        assert!((rec.target_width - 5.0).abs() < 1e-9);
        assert!((rec.target_height - 2.0).abs() < 1e-9);
        assert_eq!(rec.unit, Unit::Cm);
        assert_eq!(rec.processing_mode, ProcessingMode::Detector);
        assert_eq!(rec.processing_time_ms, 42);
    }

    #[test]
    fn ids_are_unique_and_time_is_set() {
        let user = UserId::new("alice").expect("user");
        let a = MeasurementRecord::from_result(user.clone(), &sample_result(), RecordMetadata::default());
        let b = MeasurementRecord::from_result(user, &sample_result(), RecordMetadata::default());
        assert_ne!(a.id, b.id);
        assert!(a.created_at_ms > 0);
    }
}
