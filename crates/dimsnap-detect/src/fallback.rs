//! Deterministic stand-in for a real vision back end.

use std::io::Cursor;

use dimsnap_core::{BoundingBox, Detection, DetectionError, ReferenceSpec};
use image::ImageReader;

use crate::adapter::{DetectContext, DetectError, Detector, DetectorOutput};

/// Quality assigned to synthesised detections. Zero marks them as guesses,
/// so any confidence derived from them is zero too.
pub const FALLBACK_QUALITY: f64 = 0.0;

/// Nominal credit-card aspect, used when no reference hint is available.
const DEFAULT_REFERENCE_ASPECT: f64 = 8.56 / 5.398;
const TARGET_ASPECT: f64 = 0.7;
const MIN_SIDE_PX: u32 = 16;

/// Synthesise one reference and one candidate from image extents alone.
///
/// The reference is an eighth of the image width at the nominal aspect of
/// `reference`, near the bottom-left corner; the candidate is a quarter of the
/// width at a 0.7 height/width ratio, centred vertically on the right half.
pub fn synthesize_detections(
    width: u32,
    height: u32,
    reference: Option<&ReferenceSpec>,
) -> Result<Vec<Detection>, DetectionError> {
    let (w, h) = (f64::from(width), f64::from(height));
    let aspect = reference
        .map(ReferenceSpec::aspect_ratio)
        .filter(|a| a.is_finite() && *a > 0.0)
        .unwrap_or(DEFAULT_REFERENCE_ASPECT);

    let mut ref_w = (w / 8.0).floor().max(1.0);
    let mut ref_h = (ref_w / aspect).floor().max(1.0);
    let max_ref_h = (h / 2.0).floor().max(1.0);
    if ref_h > max_ref_h {
        ref_w = (ref_w * max_ref_h / ref_h).floor().max(1.0);
        ref_h = max_ref_h;
    }
    let margin_x = (w / 16.0).floor();
    let margin_y = (h / 16.0).floor();
    let ref_box = BoundingBox::new(margin_x, (h - ref_h - margin_y).max(0.0), ref_w, ref_h)?;

    let target_w = (w / 4.0).floor().max(1.0);
    let target_h = (target_w * TARGET_ASPECT).floor().clamp(1.0, (h * 0.6).floor().max(1.0));
    let target_box = BoundingBox::new((w / 2.0).floor(), ((h - target_h) / 2.0).floor(), target_w, target_h)?;

    let detections = vec![
        Detection::reference(ref_box, FALLBACK_QUALITY),
        Detection::candidate(target_box, FALLBACK_QUALITY),
    ];
    detections
        .iter()
        .try_for_each(|d| d.validate(width, height))?;
    Ok(detections)
}

/// Detector that never fails on a decodable image of reasonable size.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackDetector;

impl FallbackDetector {
    pub const NAME: &'static str = "fallback";

    fn dimensions(image: &[u8]) -> Result<(u32, u32), DetectError> {
        ImageReader::new(Cursor::new(image))
            .with_guessed_format()
            .map_err(|e| e.to_string())
            .and_then(|r| r.into_dimensions().map_err(|e| e.to_string()))
            .map_err(|reason| DetectError::Unavailable {
                name: Self::NAME.to_string(),
                reason,
            })
    }
}

impl Detector for FallbackDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn detect(&self, image: &[u8], ctx: &DetectContext) -> Result<DetectorOutput, DetectError> {
        if ctx.cancel_token().is_cancelled() {
            return Err(DetectError::Cancelled);
        }
        let (width, height) = match ctx.image_size() {
            Some(size) => size,
            None => Self::dimensions(image)?,
        };
        if width < MIN_SIDE_PX || height < MIN_SIDE_PX {
            return Err(DetectError::Unavailable {
                name: Self::NAME.to_string(),
                reason: format!("image {width}x{height} too small to synthesise detections"),
            });
        }
        let detections = synthesize_detections(width, height, ctx.reference()).map_err(|e| {
            DetectError::InvalidOutput {
                name: Self::NAME.to_string(),
                reason: e.to_string(),
            }
        })?;
        log::warn!("using synthesised detections for {width}x{height} image");
        Ok(DetectorOutput::new(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimsnap_core::{DetectionRole, ReferenceCatalog};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::time::Duration;

    #[test]
    fn synthesis_follows_image_extents() {
        let d = synthesize_detections(1600, 1200, None).expect("synthesise");
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].role, DetectionRole::Reference);
        assert_eq!(d[0].bbox.width, 200.0);
        assert_eq!(d[0].bbox.height, (200.0 / DEFAULT_REFERENCE_ASPECT).floor());
        assert_eq!(d[1].role, DetectionRole::Candidate);
        assert_eq!(d[1].bbox.width, 400.0);
        assert_eq!(d[1].bbox.height, 280.0);
        assert!(d.iter().all(|x| x.quality_score == FALLBACK_QUALITY));
    }

    #[test]
    fn synthesis_is_deterministic_and_uses_the_hint() {
        let a4 = ReferenceCatalog::builtin().lookup("a4-paper", None).expect("a4");
        let a = synthesize_detections(800, 600, Some(&a4)).expect("a");
        let b = synthesize_detections(800, 600, Some(&a4)).expect("b");
        assert_eq!(a, b);
        assert_eq!(a[0].bbox.height, (100.0 / a4.aspect_ratio()).floor());
    }

    #[test]
    fn extreme_aspects_stay_inside_the_image() {
        for (w, h) in [(4000, 20), (20, 4000), (16, 16), (3000, 2000)] {
            let d = synthesize_detections(w, h, None).expect("synthesise");
            assert!(d.iter().all(|x| x.validate(w, h).is_ok()), "{w}x{h}");
        }
    }

    #[test]
    fn detector_reads_dimensions_from_bytes() {
        let img = RgbImage::from_pixel(320, 240, Rgb([200, 200, 200]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .expect("encode");

        let ctx = DetectContext::new(Duration::from_secs(1));
        let out = FallbackDetector.detect(&png, &ctx).expect("detect");
        assert_eq!(out.detections[1].bbox.width, 80.0);
        assert!(out.annotated_image.is_none());

        let tiny = DetectContext::new(Duration::from_secs(1)).with_image_size(8, 8);
        assert!(FallbackDetector.detect(&png, &tiny).is_err());
    }
}
