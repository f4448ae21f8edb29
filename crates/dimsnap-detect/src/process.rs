//! Vision worker run as a child process.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::adapter::{DetectContext, DetectError, Detector, DetectorOutput};
use crate::wire::{WorkerRequest, WorkerResponse};

pub const DEFAULT_STRATEGY_TIMEOUT_MS: u64 = 30_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_STRATEGY_TIMEOUT_MS
}

/// How to launch one worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStrategy {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Per-attempt budget; the request deadline still applies.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ProcessStrategy {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout_ms: DEFAULT_STRATEGY_TIMEOUT_MS,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }
}

/// Runs a [`ProcessStrategy`] once per detection.
///
/// The child is always reaped before `detect` returns. On timeout or
/// cancellation it is killed first.
#[derive(Clone, Debug)]
pub struct ExternalProcessDetector {
    strategy: ProcessStrategy,
    poll_interval: Duration,
}

impl ExternalProcessDetector {
    pub fn new(strategy: ProcessStrategy) -> Self {
        Self {
            strategy,
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn strategy(&self) -> &ProcessStrategy {
        &self.strategy
    }

    fn unavailable(&self, reason: impl Into<String>) -> DetectError {
        DetectError::Unavailable {
            name: self.strategy.name.clone(),
            reason: reason.into(),
        }
    }

    fn spawn(&self) -> Result<Child, DetectError> {
        Command::new(&self.strategy.program)
            .args(&self.strategy.args)
            .envs(&self.strategy.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.unavailable(format!("failed to start '{}': {e}", self.strategy.program)))
    }

    /// Wait for exit, killing the child if the deadline passes or the
    /// request is cancelled.
    fn wait(&self, child: &mut Child, ctx: &DetectContext) -> Result<ExitStatus, DetectError> {
        let started = Instant::now();
        let budget = Duration::from_millis(self.strategy.timeout_ms);
        let deadline = (started + budget).min(ctx.deadline());
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    kill_and_reap(child);
                    return Err(self.unavailable(format!("wait failed: {e}")));
                }
            }
            if ctx.cancel_token().is_cancelled() {
                log::info!("cancelling worker '{}'", self.strategy.name);
                kill_and_reap(child);
                return Err(DetectError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "worker '{}' exceeded {:?}, killing",
                    self.strategy.name,
                    now - started
                );
                kill_and_reap(child);
                return Err(DetectError::TimedOut {
                    name: self.strategy.name.clone(),
                    elapsed: now - started,
                });
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    // kill fails only if the child already exited; wait reaps either way
    let _ = child.kill();
    if let Err(e) = child.wait() {
        log::warn!("failed to reap worker: {e}");
    }
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn tail(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(max.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    text[start..].to_string()
}

impl Detector for ExternalProcessDetector {
    fn name(&self) -> &str {
        &self.strategy.name
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(worker = %self.strategy.name))
    )]
    fn detect(&self, image: &[u8], ctx: &DetectContext) -> Result<DetectorOutput, DetectError> {
        ctx.check(&self.strategy.name)?;
        let payload = serde_json::to_vec(&WorkerRequest::new(image, ctx.reference()))
            .map_err(|e| self.unavailable(format!("failed to encode request: {e}")))?;

        let mut child = self.spawn()?;
        log::debug!(
            "worker '{}' started (pid {}), {} request bytes",
            self.strategy.name,
            child.id(),
            payload.len()
        );

        // Writer and readers run on their own threads so a worker that
        // fills one pipe while we block on another cannot deadlock us.
        if let Some(mut stdin) = child.stdin.take() {
            thread::spawn(move || {
                if let Err(e) = stdin.write_all(&payload) {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        log::debug!("writing worker request failed: {e}");
                    }
                }
            });
        }
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        // On kill paths the reader threads are left to finish on their own:
        // a grandchild may still hold the pipes open.
        let status = self.wait(&mut child, ctx)?;

        let out = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let err = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        if !err.is_empty() {
            log::debug!("worker '{}' stderr: {}", self.strategy.name, tail(&err, 2000));
        }

        if !status.success() {
            let stderr_tail = tail(&err, 200);
            return Err(self.unavailable(if stderr_tail.is_empty() {
                format!("exited with {status}")
            } else {
                format!("exited with {status}: {stderr_tail}")
            }));
        }

        let response: WorkerResponse =
            serde_json::from_slice(&out).map_err(|e| DetectError::InvalidOutput {
                name: self.strategy.name.clone(),
                reason: format!("malformed JSON response: {e}"),
            })?;
        response.into_output().map_err(|reason| self.unavailable(reason))
    }
}
