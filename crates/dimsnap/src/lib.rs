//! High-level facade for the `dimsnap-*` workspace.
//!
//! This crate provides:
//! - re-exports of the underlying crates,
//! - [`MeasureService`], the inbound measure operation (validation, detection
//!   with fallback, calibration, measurement, assembly, best-effort history),
//! - [`ServiceConfig`], a JSON configuration that builds a service,
//! - [`diagnose`], an environment check for configured detector back ends,
//! - the `dimsnap` command-line tool (feature `cli`).
//!
//! ## Quickstart
//!
//! ```no_run
//! use dimsnap::{CancellationToken, MeasureRequest, ServiceConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ServiceConfig::load_json("dimsnap.json")?.build_service();
//! let image = std::fs::read("desk.jpg")?;
//! let request = MeasureRequest::new(image, "credit-card");
//! let response = service.measure(&request, None, &CancellationToken::new())?;
//! let dims = &response.result.target_dimensions;
//! println!("{:.2} x {:.2} {}", dims.width, dims.height, dims.unit);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `dimsnap::core`: bounding boxes, detections, reference catalog, units.
//! - `dimsnap::calib`: calibration, measurement and result assembly.
//! - `dimsnap::detect`: detector trait, worker processes, fallback, annotation.
//! - `dimsnap::store`: measurement history and identity.

pub use dimsnap_calib as calib;
pub use dimsnap_core as core;
pub use dimsnap_detect as detect;
pub use dimsnap_store as store;

pub use dimsnap_calib::{MeasurementResult, ProcessingMode};
pub use dimsnap_core::{ReferenceCatalog, ReferenceSpec, Unit};
pub use dimsnap_detect::CancellationToken;
pub use dimsnap_store::UserId;

mod config;
mod diagnostics;
mod error;
mod service;

pub use config::{ConfigError, ServiceConfig, DEFAULT_DETECTION_TIMEOUT_MS, DEFAULT_MAX_IMAGE_BYTES};
pub use diagnostics::{diagnose, DiagnosticsReport, FileStatus, StoreStatus, StrategyStatus};
pub use error::{ErrorKind, ErrorResponse, MeasureError};
pub use service::{MeasureRequest, MeasureResponse, MeasureService, RequestStage};
