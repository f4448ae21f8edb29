//! Ordered detector strategies.

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::adapter::{DetectContext, DetectError, Detector, DetectorOutput};

/// Tries each strategy in order; the first valid output wins.
///
/// Attempts never overlap: a strategy returns (and has released its worker)
/// before the next one starts. Failures are collected into
/// [`DetectError::DetectionUnavailable`]; cancellation stops the chain.
#[derive(Default)]
pub struct DetectorChain {
    strategies: Vec<Box<dyn Detector>>,
}

impl DetectorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, detector: impl Detector + 'static) {
        self.strategies.push(Box::new(detector));
    }

    pub fn with(mut self, detector: impl Detector + 'static) -> Self {
        self.push(detector);
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    fn attempt(
        strategy: &dyn Detector,
        image: &[u8],
        ctx: &DetectContext,
    ) -> Result<DetectorOutput, DetectError> {
        let output = strategy.detect(image, ctx)?;
        if let Some((w, h)) = ctx.image_size() {
            output
                .validate(w, h)
                .map_err(|e| DetectError::InvalidOutput {
                    name: strategy.name().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(output)
    }
}

impl Detector for DetectorChain {
    fn name(&self) -> &str {
        "chain"
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(strategies = self.strategies.len()))
    )]
    fn detect(&self, image: &[u8], ctx: &DetectContext) -> Result<DetectorOutput, DetectError> {
        let mut attempts = Vec::with_capacity(self.strategies.len());
        if self.strategies.is_empty() {
            attempts.push("no detector strategies configured".to_string());
        }

        for strategy in &self.strategies {
            if let Err(err) = ctx.check(strategy.name()) {
                if err.is_cancelled() {
                    return Err(err);
                }
                attempts.push(format!("{}: {err}", strategy.name()));
                break;
            }

            log::debug!("trying detector '{}'", strategy.name());
            match Self::attempt(strategy.as_ref(), image, ctx) {
                Ok(output) => {
                    log::info!(
                        "detector '{}' returned {} detections",
                        strategy.name(),
                        output.detections.len()
                    );
                    return Ok(output);
                }
                Err(DetectError::Cancelled) => return Err(DetectError::Cancelled),
                Err(err) => {
                    log::warn!("detector '{}' failed: {err}", strategy.name());
                    attempts.push(format!("{}: {err}", strategy.name()));
                }
            }
        }

        Err(DetectError::DetectionUnavailable { attempts })
    }
}
