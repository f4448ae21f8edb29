//! Pixel-space geometry produced by detectors.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Role a detection plays in a measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionRole {
    /// The object of known physical size.
    Reference,
    /// An object whose size is being estimated.
    Candidate,
}

/// Axis-aligned bounding box in pixel units.
///
/// `(x, y)` is the top-left corner; the box covers `[x, x + width)` and
/// `[y, y + height)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Detection validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("bounding box size must be finite and > 0 (width={width}, height={height})")]
    InvalidSize { width: f64, height: f64 },
    #[error("bounding box origin must be finite and >= 0 (x={x}, y={y})")]
    InvalidOrigin { x: f64, y: f64 },
    #[error("bounding box exceeds image extents {image_width}x{image_height}")]
    OutOfBounds { image_width: u32, image_height: u32 },
    #[error("quality score {0} is outside [0, 1]")]
    InvalidQuality(f64),
}

impl BoundingBox {
    /// Validate and build a box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self, DetectionError> {
        let bbox = Self {
            x,
            y,
            width,
            height,
        };
        bbox.check_shape()?;
        Ok(bbox)
    }

    fn check_shape(&self) -> Result<(), DetectionError> {
        if !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
        {
            return Err(DetectionError::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }
        if !(self.x.is_finite() && self.y.is_finite()) || self.x < 0.0 || self.y < 0.0 {
            return Err(DetectionError::InvalidOrigin {
                x: self.x,
                y: self.y,
            });
        }
        Ok(())
    }

    /// Check shape and that the box lies inside an image of the given size.
    pub fn validate_within(
        &self,
        image_width: u32,
        image_height: u32,
    ) -> Result<(), DetectionError> {
        self.check_shape()?;
        if self.x + self.width > f64::from(image_width)
            || self.y + self.height > f64::from(image_height)
        {
            return Err(DetectionError::OutOfBounds {
                image_width,
                image_height,
            });
        }
        Ok(())
    }

    /// Box size as a `(width, height)` vector.
    #[inline]
    pub fn size(&self) -> Vector2<f64> {
        Vector2::new(self.width, self.height)
    }

    #[inline]
    pub fn center(&self) -> Point2<f64> {
        Point2::new(self.x + 0.5 * self.width, self.y + 0.5 * self.height)
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Width over height.
    #[inline]
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    /// Scale the box (origin and size) by `k` in both axes.
    pub fn scaled(&self, k: f64) -> Self {
        Self {
            x: self.x * k,
            y: self.y * k,
            width: self.width * k,
            height: self.height * k,
        }
    }
}

/// One object located by a detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub role: DetectionRole,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    /// Detector-reported quality in `[0, 1]`.
    pub quality_score: f64,
}

impl Detection {
    pub fn reference(bbox: BoundingBox, quality_score: f64) -> Self {
        Self {
            role: DetectionRole::Reference,
            bbox,
            quality_score,
        }
    }

    pub fn candidate(bbox: BoundingBox, quality_score: f64) -> Self {
        Self {
            role: DetectionRole::Candidate,
            bbox,
            quality_score,
        }
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        self.role == DetectionRole::Reference
    }

    /// Validate the box against the image extents and the quality range.
    pub fn validate(&self, image_width: u32, image_height: u32) -> Result<(), DetectionError> {
        if !(0.0..=1.0).contains(&self.quality_score) {
            return Err(DetectionError::InvalidQuality(self.quality_score));
        }
        self.bbox.validate_within(image_width, image_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_boxes() {
        assert!(matches!(
            BoundingBox::new(0.0, 0.0, 0.0, 10.0),
            Err(DetectionError::InvalidSize { .. })
        ));
        assert!(matches!(
            BoundingBox::new(0.0, 0.0, 10.0, f64::NAN),
            Err(DetectionError::InvalidSize { .. })
        ));
        assert!(matches!(
            BoundingBox::new(-1.0, 0.0, 10.0, 10.0),
            Err(DetectionError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn validate_checks_image_extents() {
        // touches the right and bottom edges exactly
        let bbox = BoundingBox::new(590.0, 430.0, 50.0, 50.0).expect("box");
        assert!(bbox.validate_within(640, 480).is_ok());
        assert_eq!(
            bbox.validate_within(640, 440),
            Err(DetectionError::OutOfBounds {
                image_width: 640,
                image_height: 440
            })
        );
    }

    #[test]
    fn validate_checks_quality_range() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).expect("box");
        let det = Detection::candidate(bbox, 1.2);
        assert_eq!(det.validate(100, 100), Err(DetectionError::InvalidQuality(1.2)));
    }

    #[test]
    fn detection_serializes_box_field() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0).expect("box");
        let det = Detection::reference(bbox, 0.9);
        let json = serde_json::to_value(det).expect("json");
        assert_eq!(json["role"], "reference");
        assert_eq!(json["box"]["width"], 3.0);
        assert_eq!(json["quality_score"], 0.9);
    }

    #[test]
    fn center_and_size_follow_box() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 40.0).expect("box");
        assert_eq!(bbox.center(), Point2::new(25.0, 40.0));
        assert_eq!(bbox.size(), Vector2::new(30.0, 40.0));
        assert_eq!(bbox.scaled(2.0).size(), Vector2::new(60.0, 80.0));
    }
}
