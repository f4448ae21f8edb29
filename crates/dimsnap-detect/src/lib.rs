//! Detector adapters.
//!
//! A [`Detector`] turns image bytes into [`Detection`](dimsnap_core::Detection)s.
//! This crate provides:
//! - the [`Detector`] trait and its per-call [`DetectContext`] (deadline,
//!   cancellation, reference hint),
//! - [`ExternalProcessDetector`], which runs a vision worker as a child
//!   process speaking JSON over stdin/stdout,
//! - [`DetectorChain`], which tries strategies strictly in order,
//! - [`FallbackDetector`], a deterministic stand-in used when no back end is
//!   available,
//! - [`render_annotated`], which draws detections onto the source image.
//!
//! It does **not** locate objects in pixels itself.

mod adapter;
mod annotate;
mod cancel;
mod chain;
mod fallback;
mod process;
pub mod wire;

pub use adapter::{DetectContext, DetectError, Detector, DetectorOutput};
pub use annotate::{render_annotated, AnnotateError};
pub use cancel::CancellationToken;
pub use chain::DetectorChain;
pub use fallback::{synthesize_detections, FallbackDetector, FALLBACK_QUALITY};
pub use process::{ExternalProcessDetector, ProcessStrategy, DEFAULT_STRATEGY_TIMEOUT_MS};
