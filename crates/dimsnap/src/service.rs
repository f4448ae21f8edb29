//! The inbound measure operation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dimsnap_calib::{
    assemble, calibrate_detections, candidate_detections, measure, AssembleOptions,
    MeasurementResult, ProcessingMode,
};
use dimsnap_core::{
    decode_image, AnnotatedImageRef, CustomSize, DecodedImage, ReferenceCatalog, ReferenceError,
    ReferenceSpec, Unit,
};
use dimsnap_detect::{
    render_annotated, CancellationToken, DetectContext, DetectError, Detector, DetectorOutput,
    FallbackDetector,
};
use dimsnap_store::{MeasurementRecord, MeasurementStore, RecordMetadata, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::ServiceConfig;
use crate::error::MeasureError;

/// How often the caller re-checks cancellation while a detector runs.
const DETECT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One measurement request.
#[derive(Clone, Debug, Default)]
pub struct MeasureRequest {
    pub image: Vec<u8>,
    pub reference_id: String,
    pub custom_width: Option<f64>,
    pub custom_height: Option<f64>,
    /// Unit of the custom size (default cm).
    pub unit: Option<Unit>,
}

impl MeasureRequest {
    pub fn new(image: Vec<u8>, reference_id: impl Into<String>) -> Self {
        Self {
            image,
            reference_id: reference_id.into(),
            ..Self::default()
        }
    }

    pub fn with_custom_size(mut self, width: f64, height: f64, unit: Unit) -> Self {
        self.custom_width = Some(width);
        self.custom_height = Some(height);
        self.unit = Some(unit);
        self
    }

    fn custom_size(&self) -> Result<Option<CustomSize>, ReferenceError> {
        match (self.custom_width, self.custom_height) {
            (Some(width), Some(height)) => Ok(Some(CustomSize {
                width,
                height,
                unit: self.unit.unwrap_or_default(),
            })),
            (None, None) => Ok(None),
            _ => Err(ReferenceError::MissingCustomSize),
        }
    }
}

/// Successful response envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureResponse {
    pub request_id: u64,
    pub processing_time_ms: u64,
    /// Id of the stored history record, when the result was persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
    pub result: MeasurementResult,
}

/// Request lifecycle stages, logged on every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Detecting,
    Calibrating,
    Measuring,
    Assembled,
    Returned,
    Failed,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStage::Received => "received",
            RequestStage::Detecting => "detecting",
            RequestStage::Calibrating => "calibrating",
            RequestStage::Measuring => "measuring",
            RequestStage::Assembled => "assembled",
            RequestStage::Returned => "returned",
            RequestStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

struct Lifecycle {
    id: u64,
    started: Instant,
    stage: RequestStage,
}

impl Lifecycle {
    fn new(id: u64) -> Self {
        let lc = Self {
            id,
            started: Instant::now(),
            stage: RequestStage::Received,
        };
        log::debug!("request {id}: {}", lc.stage);
        lc
    }

    fn enter(&mut self, stage: RequestStage) {
        log::debug!(
            "request {}: {} -> {} at {:.1} ms",
            self.id,
            self.stage,
            stage,
            self.elapsed_ms_f64()
        );
        self.stage = stage;
    }

    fn elapsed_ms_f64(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1e3
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Stateless measurement pipeline around a detector.
///
/// Safe to share between threads; concurrent calls do not coordinate.
pub struct MeasureService {
    config: ServiceConfig,
    catalog: &'static ReferenceCatalog,
    detector: Arc<dyn Detector>,
    store: Option<Arc<dyn MeasurementStore>>,
    next_request: AtomicU64,
}

impl MeasureService {
    pub fn new(detector: impl Detector + 'static) -> Self {
        Self {
            config: ServiceConfig::default(),
            catalog: ReferenceCatalog::builtin(),
            detector: Arc::new(detector),
            store: None,
            next_request: AtomicU64::new(1),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MeasurementStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&Arc<dyn MeasurementStore>> {
        self.store.as_ref()
    }

    /// Validate, detect, calibrate, measure and assemble.
    ///
    /// `user` is passed explicitly; results are persisted only for a known
    /// user. Persistence failures are logged and never fail the request.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(reference = %request.reference_id, bytes = request.image.len())
        )
    )]
    pub fn measure(
        &self,
        request: &MeasureRequest,
        user: Option<&UserId>,
        cancel: &CancellationToken,
    ) -> Result<MeasureResponse, MeasureError> {
        let mut lc = Lifecycle::new(self.next_request.fetch_add(1, Ordering::Relaxed));
        match self.run(&mut lc, request, user, cancel) {
            Ok(response) => {
                lc.enter(RequestStage::Returned);
                log::info!(
                    "request {}: {} {:.2}x{:.2} {} (confidence {:.2}) in {} ms",
                    lc.id,
                    response.result.processing_mode.as_str(),
                    response.result.target_dimensions.width,
                    response.result.target_dimensions.height,
                    response.result.target_dimensions.unit,
                    response.result.confidence,
                    response.processing_time_ms
                );
                Ok(response)
            }
            Err(err) => {
                lc.enter(RequestStage::Failed);
                log::warn!("request {} failed ({}): {err}", lc.id, err.kind());
                Err(err)
            }
        }
    }

    fn run(
        &self,
        lc: &mut Lifecycle,
        request: &MeasureRequest,
        user: Option<&UserId>,
        cancel: &CancellationToken,
    ) -> Result<MeasureResponse, MeasureError> {
        // input validation happens before any detection work
        let decoded = decode_image(&request.image, self.config.max_image_bytes)?;
        let reference = self
            .catalog
            .lookup(request.reference_id.trim(), request.custom_size()?)?;
        if cancel.is_cancelled() {
            return Err(MeasureError::Cancelled);
        }

        lc.enter(RequestStage::Detecting);
        let (output, mode) = self.detect(&request.image, &decoded, &reference, cancel)?;

        lc.enter(RequestStage::Calibrating);
        let calibration =
            calibrate_detections(&reference, &output.detections, &self.config.calibration)?;

        lc.enter(RequestStage::Measuring);
        let measured = measure(&calibration, &candidate_detections(&output.detections))?;

        let annotated = self.annotated_ref(&decoded, &request.image, output);
        let options = AssembleOptions {
            selection: self.config.target_selection,
            processing_mode: mode,
        };
        let result = assemble(&calibration, &measured, None, annotated, &options)?;
        lc.enter(RequestStage::Assembled);

        let processing_time_ms = lc.elapsed_ms();
        let record_id = self.persist(user, request, &result, processing_time_ms);
        Ok(MeasureResponse {
            request_id: lc.id,
            processing_time_ms,
            record_id,
            result,
        })
    }

    fn detect(
        &self,
        image: &[u8],
        decoded: &DecodedImage,
        reference: &ReferenceSpec,
        cancel: &CancellationToken,
    ) -> Result<(DetectorOutput, ProcessingMode), MeasureError> {
        let ctx = DetectContext::new(self.config.detection_timeout())
            .with_cancel(cancel.clone())
            .with_reference(reference.clone())
            .with_image_size(decoded.width, decoded.height);

        let primary = self.detect_bounded(image, &ctx).and_then(|out| {
            out.validate(decoded.width, decoded.height)
                .map(|()| out)
                .map_err(|e| DetectError::InvalidOutput {
                    name: self.detector.name().to_string(),
                    reason: e.to_string(),
                })
        });

        match primary {
            Ok(out) => Ok((out, ProcessingMode::Detector)),
            Err(DetectError::Cancelled) => Err(MeasureError::Cancelled),
            Err(err) if self.config.allow_fallback => {
                log::warn!("detection unavailable ({err}); falling back to synthesised detections");
                match FallbackDetector.detect(image, &ctx) {
                    Ok(out) => Ok((out, ProcessingMode::Fallback)),
                    Err(DetectError::Cancelled) => Err(MeasureError::Cancelled),
                    Err(fallback_err) => {
                        log::warn!("fallback failed: {fallback_err}");
                        Err(err.into())
                    }
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Run the primary detector on its own thread and stop waiting at the
    /// deadline or on cancellation.
    ///
    /// The detector sees a per-attempt token that is cancelled when the wait
    /// ends early, so a well-behaved back end releases its resources. One
    /// that ignores its context is abandoned and its late output dropped.
    fn detect_bounded(
        &self,
        image: &[u8],
        ctx: &DetectContext,
    ) -> Result<DetectorOutput, DetectError> {
        let name = self.detector.name().to_string();
        let attempt = CancellationToken::new();
        let worker_ctx = ctx.clone().with_cancel(attempt.clone());
        let detector = Arc::clone(&self.detector);
        let image = image.to_vec();
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("detect-{name}"))
            .spawn(move || {
                // receiver is gone once the caller stopped waiting
                let _ = tx.send(detector.detect(&image, &worker_ctx));
            })
            .map_err(|e| DetectError::Unavailable {
                name: name.clone(),
                reason: format!("failed to start detector thread: {e}"),
            })?;

        loop {
            if ctx.cancel_token().is_cancelled() {
                attempt.cancel();
                return Err(DetectError::Cancelled);
            }
            let remaining = ctx.remaining();
            if remaining.is_zero() {
                attempt.cancel();
                log::warn!(
                    "detector '{name}' still running after {:?}; abandoning it",
                    ctx.elapsed()
                );
                return Err(DetectError::TimedOut {
                    name,
                    elapsed: ctx.elapsed(),
                });
            }
            match rx.recv_timeout(remaining.min(DETECT_POLL_INTERVAL)) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DetectError::Unavailable {
                        name,
                        reason: "detector thread exited without a result".to_string(),
                    })
                }
            }
        }
    }

    /// Back-end image first, then our own rendering, then the upload itself.
    fn annotated_ref(
        &self,
        decoded: &DecodedImage,
        original: &[u8],
        output: DetectorOutput,
    ) -> AnnotatedImageRef {
        if let Some(r) = output.annotated_image {
            return r;
        }
        if self.config.annotate {
            match render_annotated(&decoded.image, &output.detections) {
                Ok(r) => return r,
                Err(e) => log::warn!("annotation failed: {e}"),
            }
        }
        let mime = decoded
            .format
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream");
        AnnotatedImageRef::data_uri(mime, original)
    }

    fn persist(
        &self,
        user: Option<&UserId>,
        request: &MeasureRequest,
        result: &MeasurementResult,
        processing_time_ms: u64,
    ) -> Option<Uuid> {
        let (user, store) = match (user, &self.store) {
            (Some(user), Some(store)) => (user, store),
            (None, Some(_)) => {
                log::debug!("anonymous request, not saving");
                return None;
            }
            _ => return None,
        };
        if result.is_fallback() && !self.config.persist_fallback_results {
            log::debug!("fallback result, not saving");
            return None;
        }
        let record = MeasurementRecord::from_result(
            user.clone(),
            result,
            RecordMetadata {
                reference_object: request.reference_id.trim().to_string(),
                custom_width: request.custom_width,
                custom_height: request.custom_height,
                processing_time_ms,
            },
        );
        match store.save(&record) {
            Ok(()) => {
                log::debug!("saved measurement {} for {user}", record.id);
                Some(record.id)
            }
            Err(e) => {
                log::warn!("failed to save measurement for {user}: {e}");
                None
            }
        }
    }
}
