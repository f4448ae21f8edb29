//! Draw detections onto the uploaded image.

use std::io::Cursor;

use dimsnap_core::{AnnotatedImageRef, Detection, DetectionRole};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const REFERENCE_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const CANDIDATE_COLOR: Rgb<u8> = Rgb([220, 30, 30]);

#[derive(thiserror::Error, Debug)]
pub enum AnnotateError {
    #[error("failed to encode annotated image: {0}")]
    Encode(#[from] image::ImageError),
}

fn outline(canvas: &mut RgbImage, det: &Detection, thickness: u32) {
    let (iw, ih) = canvas.dimensions();
    let color = match det.role {
        DetectionRole::Reference => REFERENCE_COLOR,
        DetectionRole::Candidate => CANDIDATE_COLOR,
    };
    let x0 = det.bbox.x.round().max(0.0) as i64;
    let y0 = det.bbox.y.round().max(0.0) as i64;
    let x1 = ((det.bbox.x + det.bbox.width).round() as i64).min(i64::from(iw));
    let y1 = ((det.bbox.y + det.bbox.height).round() as i64).min(i64::from(ih));

    for t in 0..i64::from(thickness) {
        let (w, h) = (x1 - x0 - 2 * t, y1 - y0 - 2 * t);
        if w < 1 || h < 1 {
            break;
        }
        let rect = Rect::at((x0 + t) as i32, (y0 + t) as i32).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Outline the reference in green and the candidates in red, then encode the
/// result as a JPEG `data:` URI.
pub fn render_annotated(
    image: &DynamicImage,
    detections: &[Detection],
) -> Result<AnnotatedImageRef, AnnotateError> {
    let mut canvas = image.to_rgb8();
    let thickness = (canvas.width().min(canvas.height()) / 200).max(2);
    for det in detections {
        outline(&mut canvas, det, thickness);
    }

    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(canvas).write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;
    log::debug!(
        "annotated {} detections into {} byte jpeg",
        detections.len(),
        jpeg.len()
    );
    Ok(AnnotatedImageRef::data_uri("image/jpeg", &jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use dimsnap_core::BoundingBox;

    fn decode_uri(uri: &AnnotatedImageRef) -> RgbImage {
        let payload = uri
            .as_str()
            .strip_prefix("data:image/jpeg;base64,")
            .expect("jpeg data uri");
        let bytes = STANDARD.decode(payload).expect("base64");
        image::load_from_memory(&bytes).expect("decode").to_rgb8()
    }

    #[test]
    fn outlines_are_colored_by_role() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([0, 0, 0])));
        let dets = [
            Detection::reference(BoundingBox::new(10.0, 10.0, 60.0, 40.0).expect("box"), 0.9),
            Detection::candidate(BoundingBox::new(100.0, 20.0, 80.0, 60.0).expect("box"), 0.8),
        ];
        let uri = render_annotated(&img, &dets).expect("render");
        let out = decode_uri(&uri);
        assert_eq!(out.dimensions(), (200, 100));

        // jpeg is lossy: compare dominant channels on the outline midpoints
        let r = out.get_pixel(40, 10);
        assert!(r[1] > r[0] && r[1] > 60, "reference pixel {r:?}");
        let c = out.get_pixel(140, 20);
        assert!(c[0] > c[1] && c[0] > 60, "candidate pixel {c:?}");
        let inside = out.get_pixel(40, 30);
        assert!(inside[0] < 60 && inside[1] < 60, "interior {inside:?}");
    }

    #[test]
    fn boxes_touching_the_border_are_clipped() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([255, 255, 255])));
        let dets = [Detection::candidate(
            BoundingBox::new(0.0, 0.0, 50.0, 50.0).expect("box"),
            0.5,
        )];
        assert!(render_annotated(&img, &dets).is_ok());
        assert!(render_annotated(&img, &[]).is_ok());
    }
}
