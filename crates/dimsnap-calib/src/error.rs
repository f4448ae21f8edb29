use dimsnap_core::DetectionError;

/// Errors returned while deriving the pixel scale.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("reference object not detected")]
    NoReferenceDetected,
    #[error("ambiguous reference: {count} reference detections")]
    AmbiguousReference { count: usize },
    #[error("reference size must be finite and > 0 (width={width}, height={height})")]
    InvalidReferenceSize { width: f64, height: f64 },
    #[error("invalid reference detection: {0}")]
    InvalidReferenceDetection(#[from] DetectionError),
}

/// Errors returned while converting candidate boxes.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("no candidate objects detected")]
    NoCandidatesDetected,
    #[error("calibration scale must be finite and > 0 (x={x}, y={y})")]
    InvalidScale { x: f64, y: f64 },
}

/// Errors returned while packaging the result.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AssembleError {
    #[error("no measured objects to report")]
    NoMeasuredObjects,
    #[error("confidence override {0} is outside [0, 1]")]
    InvalidConfidence(f64),
}
