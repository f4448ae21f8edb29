//! Environment checks for a service configuration.

use std::env;
use std::path::{Path, PathBuf};

use dimsnap_core::ReferenceCatalog;
use dimsnap_detect::ProcessStrategy;
use serde::Serialize;

use crate::config::ServiceConfig;

#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub path: String,
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub name: String,
    pub program: String,
    /// Where the program resolved, if it did.
    pub resolved: Option<String>,
    /// Arguments that look like script files.
    pub scripts: Vec<FileStatus>,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub path: String,
    pub exists: bool,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub version: &'static str,
    pub platform: &'static str,
    pub arch: &'static str,
    pub reference_objects: usize,
    pub strategies: Vec<StrategyStatus>,
    /// No strategy is ready, so every request would use the fallback.
    pub fallback_only: bool,
    pub allow_fallback: bool,
    pub store: Option<StoreStatus>,
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

fn looks_like_script(arg: &str) -> bool {
    !arg.starts_with('-')
        && Path::new(arg)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "py" | "sh" | "js" | "rb" | "pl"))
}

fn check_strategy(s: &ProcessStrategy) -> StrategyStatus {
    let resolved = resolve_program(&s.program);
    let scripts: Vec<FileStatus> = s
        .args
        .iter()
        .filter(|a| looks_like_script(a))
        .map(|a| FileStatus {
            path: a.clone(),
            exists: Path::new(a).is_file(),
        })
        .collect();
    let ready = resolved.is_some() && scripts.iter().all(|f| f.exists);
    StrategyStatus {
        name: s.name.clone(),
        program: s.program.clone(),
        resolved: resolved.map(|p| p.display().to_string()),
        scripts,
        ready,
    }
}

/// Report which configured back ends could run on this machine.
pub fn diagnose(config: &ServiceConfig) -> DiagnosticsReport {
    let strategies: Vec<StrategyStatus> = config.strategies.iter().map(check_strategy).collect();
    for s in strategies.iter().filter(|s| !s.ready) {
        log::warn!("strategy '{}' is not ready", s.name);
    }
    let store = config.store_dir.as_ref().map(|dir| {
        let p = Path::new(dir);
        StoreStatus {
            path: dir.clone(),
            exists: p.exists(),
            is_dir: p.is_dir(),
        }
    });
    DiagnosticsReport {
        version: env!("CARGO_PKG_VERSION"),
        platform: env::consts::OS,
        arch: env::consts::ARCH,
        reference_objects: ReferenceCatalog::builtin().entries().len(),
        fallback_only: !strategies.iter().any(|s| s.ready),
        strategies,
        allow_fallback: config.allow_fallback,
        store,
    }
}
