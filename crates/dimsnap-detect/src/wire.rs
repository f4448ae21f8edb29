//! JSON protocol spoken with external detector workers.
//!
//! The worker receives one [`WorkerRequest`] on stdin and answers with one
//! [`WorkerResponse`] on stdout. Diagnostics go to stderr.
//!
//! ```json
//! {"image": "<base64>", "reference": {"id": "credit-card", "physical_width": 8.56, ...}}
//! ```
//!
//! ```json
//! {"detections": [{"role": "reference", "box": {"x": 0, "y": 0, "width": 10, "height": 6},
//!                  "quality_score": 0.9}],
//!  "annotated_image": "<base64 jpeg or data: uri>"}
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use dimsnap_core::{AnnotatedImageRef, Detection, ReferenceSpec};
use serde::{Deserialize, Serialize};

use crate::adapter::DetectorOutput;

#[derive(Clone, Debug, Serialize)]
pub struct WorkerRequest<'a> {
    /// Base64 (standard alphabet) of the untouched upload bytes.
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<&'a ReferenceSpec>,
}

impl<'a> WorkerRequest<'a> {
    pub fn new(image: &[u8], reference: Option<&'a ReferenceSpec>) -> Self {
        Self {
            image: STANDARD.encode(image),
            reference,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WorkerResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub annotated_image: Option<String>,
}

impl WorkerResponse {
    /// Convert into detector output, or the worker's own error message.
    pub fn into_output(self) -> Result<DetectorOutput, String> {
        if self.success == Some(false) || self.error.is_some() {
            return Err(self
                .error
                .unwrap_or_else(|| "worker reported failure".to_string()));
        }
        let annotated_image = self
            .annotated_image
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with("data:") {
                    AnnotatedImageRef::new(s)
                } else {
                    AnnotatedImageRef::from_base64_jpeg(&s)
                }
            });
        Ok(DetectorOutput {
            detections: self.detections,
            annotated_image,
        })
    }
}
