use std::time::{Duration, Instant};

use dimsnap_core::{AnnotatedImageRef, Detection, DetectionError, ReferenceSpec};

use crate::cancel::CancellationToken;

/// Errors reported by detectors.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("detector '{name}' unavailable: {reason}")]
    Unavailable { name: String, reason: String },
    #[error("detector '{name}' timed out after {elapsed:?}")]
    TimedOut { name: String, elapsed: Duration },
    #[error("detector '{name}' returned invalid output: {reason}")]
    InvalidOutput { name: String, reason: String },
    #[error("detection cancelled")]
    Cancelled,
    #[error("no detector back end succeeded ({})", attempts.join("; "))]
    DetectionUnavailable { attempts: Vec<String> },
}

impl DetectError {
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DetectError::Cancelled)
    }
}

/// What a detector found in one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectorOutput {
    /// In the detector's emission order.
    pub detections: Vec<Detection>,
    /// Optional advisory artifact; never used for numerics.
    pub annotated_image: Option<AnnotatedImageRef>,
}

impl DetectorOutput {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            annotated_image: None,
        }
    }

    /// Check every detection against the image extents.
    pub fn validate(&self, image_width: u32, image_height: u32) -> Result<(), DetectionError> {
        self.detections
            .iter()
            .try_for_each(|d| d.validate(image_width, image_height))
    }
}

/// Per-call detection context: time budget, cancellation and hints.
#[derive(Clone, Debug)]
pub struct DetectContext {
    started: Instant,
    deadline: Instant,
    cancel: CancellationToken,
    reference: Option<ReferenceSpec>,
    image_size: Option<(u32, u32)>,
}

impl DetectContext {
    /// Context with a budget of `timeout` starting now.
    pub fn new(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
            cancel: CancellationToken::new(),
            reference: None,
            image_size: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Tell the back end which reference object to look for.
    pub fn with_reference(mut self, reference: ReferenceSpec) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Decoded image extents, used to validate detector output.
    pub fn with_image_size(mut self, width: u32, height: u32) -> Self {
        self.image_size = Some((width, height));
        self
    }

    #[inline]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    #[inline]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[inline]
    pub fn reference(&self) -> Option<&ReferenceSpec> {
        self.reference.as_ref()
    }

    #[inline]
    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.image_size
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fail fast when the caller cancelled or the budget is spent.
    pub fn check(&self, name: &str) -> Result<(), DetectError> {
        if self.cancel.is_cancelled() {
            return Err(DetectError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(DetectError::TimedOut {
                name: name.to_string(),
                elapsed: self.elapsed(),
            });
        }
        Ok(())
    }
}

/// A vision back end.
///
/// Implementations must not modify the image bytes and should honour the
/// context's deadline and cancellation token.
pub trait Detector: Send + Sync {
    /// Short name used in logs and aggregated errors.
    fn name(&self) -> &str;

    fn detect(&self, image: &[u8], ctx: &DetectContext) -> Result<DetectorOutput, DetectError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect(&self, image: &[u8], ctx: &DetectContext) -> Result<DetectorOutput, DetectError> {
        (**self).detect(image, ctx)
    }
}
