//! Scale calibration and measurement.
//!
//! Pipeline pieces, each usable on its own:
//! - pick the reference detection and derive per-axis pixels-per-unit scales
//!   plus a calibration confidence ([`calibrate_detections`], [`calibrate`]),
//! - convert candidate boxes into physical sizes ([`measure`]),
//! - package everything into the externally visible [`MeasurementResult`]
//!   ([`assemble`]).
//!
//! Object detection itself lives elsewhere; this crate only consumes
//! [`Detection`](dimsnap_core::Detection)s.

mod assemble;
mod calibrate;
mod error;
mod measure;
mod params;
mod result;

pub use assemble::{assemble, AssembleOptions};
pub use calibrate::{calibrate, calibrate_detections, select_reference, CalibrationResult};
pub use error::{AssembleError, CalibrationError, MeasurementError};
pub use measure::{candidate_detections, measure, round2, MeasuredObject};
pub use params::{CalibrationParams, ReferencePolicy, TargetSelection};
pub use result::{CalibrationInfo, MeasurementResult, ProcessingMode, TargetDimensions};
