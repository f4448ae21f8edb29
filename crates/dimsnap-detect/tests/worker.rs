#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use dimsnap_core::{DetectionRole, ReferenceCatalog};
use dimsnap_detect::{
    CancellationToken, DetectContext, DetectError, Detector, DetectorChain,
    ExternalProcessDetector, FallbackDetector, ProcessStrategy, FALLBACK_QUALITY,
};

const DETECTIONS: &str = r#"{"detections": [
  {"role": "reference", "box": {"x": 10, "y": 10, "width": 86, "height": 54}, "quality_score": 0.9},
  {"role": "candidate", "box": {"x": 120, "y": 30, "width": 60, "height": 40}, "quality_score": 0.8}
]}"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    path
}

fn worker(name: &str, path: &Path, timeout_ms: u64) -> ExternalProcessDetector {
    ExternalProcessDetector::new(
        ProcessStrategy::new(name, "sh")
            .arg(path.to_string_lossy())
            .timeout(Duration::from_millis(timeout_ms)),
    )
}

fn ctx() -> DetectContext {
    init_logging();
    DetectContext::new(Duration::from_secs(10)).with_image_size(200, 100)
}

#[test]
fn worker_response_is_parsed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ok = script(
        dir.path(),
        "ok.sh",
        &format!("cat > /dev/null\necho 'loading model' >&2\ncat <<'JSON'\n{DETECTIONS}\nJSON"),
    );
    let out = worker("ok", &ok, 5_000).detect(b"image-bytes", &ctx()).expect("detect");
    assert_eq!(out.detections.len(), 2);
    assert_eq!(out.detections[0].role, DetectionRole::Reference);
    assert_eq!(out.detections[1].bbox.width, 60.0);
    assert!(out.annotated_image.is_none());
}

#[test]
fn worker_sees_reference_hint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let picky = script(
        dir.path(),
        "picky.sh",
        &format!(
            "if grep -q '\"id\":\"credit-card\"'; then\ncat <<'JSON'\n{DETECTIONS}\nJSON\nelse\necho '{{\"success\": false, \"error\": \"no hint\"}}'\nfi"
        ),
    );
    let card = ReferenceCatalog::builtin()
        .lookup("credit-card", None)
        .expect("card");
    let det = worker("picky", &picky, 5_000);

    let hinted = ctx().with_reference(card);
    assert_eq!(det.detect(b"img", &hinted).expect("detect").detections.len(), 2);

    match det.detect(b"img", &ctx()) {
        Err(DetectError::Unavailable { reason, .. }) => assert_eq!(reason, "no hint"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn slow_worker_is_killed_at_its_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slow = script(dir.path(), "slow.sh", "exec sleep 5");
    let started = Instant::now();
    let err = worker("slow", &slow, 200).detect(b"img", &ctx()).unwrap_err();
    assert!(matches!(err, DetectError::TimedOut { ref name, .. } if name == "slow"), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn request_deadline_caps_the_strategy_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slow = script(dir.path(), "slow.sh", "exec sleep 5");
    let short = DetectContext::new(Duration::from_millis(200));
    let started = Instant::now();
    let err = worker("slow", &slow, 60_000).detect(b"img", &short).unwrap_err();
    assert!(matches!(err, DetectError::TimedOut { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn cancellation_kills_the_worker() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slow = script(dir.path(), "slow.sh", "exec sleep 5");
    let token = CancellationToken::new();
    let remote = token.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        remote.cancel();
    });

    let started = Instant::now();
    let err = worker("slow", &slow, 60_000)
        .detect(b"img", &ctx().with_cancel(token))
        .unwrap_err();
    canceller.join().expect("canceller");
    assert!(err.is_cancelled(), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn malformed_and_failing_workers_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let garbage = script(dir.path(), "garbage.sh", "cat > /dev/null\necho 'not json'");
    let crash = script(dir.path(), "crash.sh", "echo 'model missing' >&2\nexit 3");

    let err = worker("garbage", &garbage, 5_000).detect(b"img", &ctx()).unwrap_err();
    assert!(matches!(err, DetectError::InvalidOutput { .. }), "{err:?}");

    match worker("crash", &crash, 5_000).detect(b"img", &ctx()) {
        Err(DetectError::Unavailable { reason, .. }) => assert!(reason.contains("model missing")),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn chain_falls_through_to_the_next_strategy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crash = script(dir.path(), "crash.sh", "exit 1");
    let oob = script(
        dir.path(),
        "oob.sh",
        r#"cat > /dev/null
echo '{"detections": [{"role": "candidate", "box": {"x": 150, "y": 0, "width": 100, "height": 10}, "quality_score": 0.5}]}'"#,
    );
    let ok = script(dir.path(), "ok.sh", &format!("cat > /dev/null\ncat <<'JSON'\n{DETECTIONS}\nJSON"));

    let chain = DetectorChain::new()
        .with(worker("crash", &crash, 5_000))
        .with(worker("oob", &oob, 5_000))
        .with(worker("ok", &ok, 5_000));
    let out = chain.detect(b"img", &ctx()).expect("detect");
    assert_eq!(out.detections[0].quality_score, 0.9);
}

#[test]
fn fallback_can_terminate_a_chain() {
    let dir = tempfile::tempdir().expect("tempdir");
    let crash = script(dir.path(), "crash.sh", "exit 1");
    let chain = DetectorChain::new()
        .with(worker("crash", &crash, 5_000))
        .with(FallbackDetector);
    let out = chain
        .detect(b"img", &DetectContext::new(Duration::from_secs(10)).with_image_size(640, 480))
        .expect("detect");
    assert_eq!(out.detections.len(), 2);
    assert!(out.detections.iter().all(|d| d.quality_score == FALLBACK_QUALITY));
}
