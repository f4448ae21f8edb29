use std::fmt;

use dimsnap_calib::{AssembleError, CalibrationError, MeasurementError};
use dimsnap_core::{ImageError, ReferenceError};
use dimsnap_detect::DetectError;
use serde::{Deserialize, Serialize};

/// Caller-facing error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputValidation,
    DetectionUnavailable,
    NoReferenceDetected,
    AmbiguousReference,
    NoCandidatesDetected,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InputValidation => "input_validation",
            ErrorKind::DetectionUnavailable => "detection_unavailable",
            ErrorKind::NoReferenceDetected => "no_reference_detected",
            ErrorKind::AmbiguousReference => "ambiguous_reference",
            ErrorKind::NoCandidatesDetected => "no_candidates_detected",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }

    /// What the user can do about it.
    pub fn hint(self) -> &'static str {
        match self {
            ErrorKind::InputValidation => {
                "Check that the image is a JPEG/PNG under the size limit and that a valid reference object (or a positive custom size) is selected."
            }
            ErrorKind::DetectionUnavailable => {
                "The object detector is currently unavailable. Please try again later."
            }
            ErrorKind::NoReferenceDetected => {
                "Reference object not found. Retake the photo with the reference object fully visible and flat."
            }
            ErrorKind::AmbiguousReference => {
                "More than one possible reference object was found. Retake the photo with a single reference object."
            }
            ErrorKind::NoCandidatesDetected => {
                "No object to measure was found. Retake the photo with the object fully visible next to the reference."
            }
            ErrorKind::Cancelled => "The measurement was cancelled before it finished.",
            ErrorKind::Internal => "Something went wrong while measuring. Please retry with another photo.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`MeasureService::measure`](crate::MeasureService::measure).
#[derive(thiserror::Error, Debug)]
pub enum MeasureError {
    #[error("invalid reference: {0}")]
    Reference(#[from] ReferenceError),
    #[error("invalid image: {0}")]
    Image(#[from] ImageError),
    #[error("{0}")]
    DetectionUnavailable(DetectError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error("measurement cancelled")]
    Cancelled,
}

impl From<DetectError> for MeasureError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::Cancelled => MeasureError::Cancelled,
            other => MeasureError::DetectionUnavailable(other),
        }
    }
}

impl MeasureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MeasureError::Reference(_) | MeasureError::Image(_) => ErrorKind::InputValidation,
            MeasureError::DetectionUnavailable(_) => ErrorKind::DetectionUnavailable,
            MeasureError::Calibration(CalibrationError::NoReferenceDetected) => {
                ErrorKind::NoReferenceDetected
            }
            MeasureError::Calibration(CalibrationError::AmbiguousReference { .. }) => {
                ErrorKind::AmbiguousReference
            }
            MeasureError::Measurement(MeasurementError::NoCandidatesDetected) => {
                ErrorKind::NoCandidatesDetected
            }
            MeasureError::Cancelled => ErrorKind::Cancelled,
            MeasureError::Calibration(_)
            | MeasureError::Measurement(_)
            | MeasureError::Assemble(_) => ErrorKind::Internal,
        }
    }

    /// Structured, trace-free rendering for end users.
    pub fn to_response(&self) -> ErrorResponse {
        let kind = self.kind();
        ErrorResponse {
            kind,
            message: self.to_string(),
            hint: kind.hint().to_string(),
        }
    }
}

/// Error body returned to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: String,
}
