//! Core types for DimensionSnap measurements.
//!
//! This crate is intentionally small: it holds the geometric vocabulary
//! shared by the detector, calibration and service crates (bounding boxes,
//! detections, reference objects, physical units) plus image decoding and
//! logging helpers. It does *not* know how objects are detected.

mod geometry;
mod logger;
mod reference;
mod upload;

pub use geometry::{BoundingBox, Detection, DetectionError, DetectionRole};
pub use reference::{
    CatalogEntry, CustomSize, ReferenceCatalog, ReferenceError, ReferenceSpec, Unit, CUSTOM_ID,
};
pub use upload::{decode_image, AnnotatedImageRef, DecodedImage, ImageError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
