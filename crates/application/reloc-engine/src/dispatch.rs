use crate::pack::{run_pass, PassContext};
use crate::relocate::FailedTransfer;
use crate::reporter::TransferReporter;
use camino::{Utf8Path, Utf8PathBuf};
use reloc_config::{clamp_depth, env_flag, ENV_DEBUG, ENV_SKIP_LIBRARIES, ENV_SOURCE_ORIGIN, ENV_TARGET_DIR};
use reloc_core::ProjectDocument;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

/// A relocated library that needs its own pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedRequest {
    pub library: String,
    /// Where the library lived before the parent pass copied it.
    pub original: Utf8PathBuf,
    /// The copy in the export tree, rewritten in place by the nested pass.
    pub relocated: Utf8PathBuf,
    pub target_root: Utf8PathBuf,
    /// 1 for libraries linked by the root project.
    pub depth: usize,
}

/// Tally of a nested pass that ran in this process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedSummary {
    pub copied: usize,
    pub up_to_date: usize,
    pub missing: usize,
    pub failed: Vec<FailedTransfer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestedStatus {
    /// `summary` is `None` when the pass ran in another process.
    Completed { summary: Option<NestedSummary> },
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedOutcome {
    pub library: String,
    pub original: Utf8PathBuf,
    pub relocated: Utf8PathBuf,
    pub depth: usize,
    pub status: NestedStatus,
    /// Passes dispatched by this one.
    pub children: Vec<NestedOutcome>,
}

impl NestedOutcome {
    pub fn new(request: &NestedRequest, status: NestedStatus) -> Self {
        Self {
            library: request.library.clone(),
            original: request.original.clone(),
            relocated: request.relocated.clone(),
            depth: request.depth,
            status,
            children: Vec::new(),
        }
    }

    /// This outcome and every descendant, depth-first.
    pub fn walk(&self) -> Vec<&NestedOutcome> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

impl fmt::Display for NestedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "library '{}' ({}): ", self.library, self.relocated)?;
        match &self.status {
            NestedStatus::Completed { summary: Some(s) } => write!(
                f,
                "packed, {} copied, {} up to date, {} missing, {} failed",
                s.copied,
                s.up_to_date,
                s.missing,
                s.failed.len()
            ),
            NestedStatus::Completed { summary: None } => write!(f, "packed"),
            NestedStatus::Failed { reason } => write!(f, "failed: {reason}"),
            NestedStatus::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// Runs the pass of a relocated library.
pub trait LibraryDispatcher: Send + Sync {
    fn dispatch(&self, request: &NestedRequest, reporter: &mut dyn TransferReporter)
        -> NestedOutcome;
}

fn lock_visited(visited: &Mutex<HashSet<Utf8PathBuf>>) -> std::sync::MutexGuard<'_, HashSet<Utf8PathBuf>> {
    visited.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Recurses in this process. Each library is packed at most once per pack,
/// keyed by its original location, and recursion stops past `max_depth`.
#[derive(Debug)]
pub struct InProcessDispatcher {
    max_depth: usize,
    search_missing: bool,
    cancel: Option<Arc<AtomicBool>>,
    visited: Mutex<HashSet<Utf8PathBuf>>,
}

impl InProcessDispatcher {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: clamp_depth(max_depth),
            search_missing: true,
            cancel: None,
            visited: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_search(mut self, search_missing: bool) -> Self {
        self.search_missing = search_missing;
        self
    }

    pub fn with_cancel(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Record a project as already packed so links back to it are skipped.
    pub fn mark_visited(&self, path: &Utf8Path) {
        lock_visited(&self.visited).insert(path.to_path_buf());
    }
}

impl LibraryDispatcher for InProcessDispatcher {
    fn dispatch(
        &self,
        request: &NestedRequest,
        reporter: &mut dyn TransferReporter,
    ) -> NestedOutcome {
        if request.depth > self.max_depth {
            tracing::warn!(
                "Not packing library '{}': nesting depth {} exceeds {}",
                request.library,
                request.depth,
                self.max_depth
            );
            return NestedOutcome::new(
                request,
                NestedStatus::Skipped {
                    reason: format!("nesting depth limit {} reached", self.max_depth),
                },
            );
        }
        if !lock_visited(&self.visited).insert(request.original.clone()) {
            tracing::debug!("Library {} already packed", request.original);
            return NestedOutcome::new(
                request,
                NestedStatus::Skipped {
                    reason: "already packed".into(),
                },
            );
        }

        let mut doc = match ProjectDocument::load_anchored(&request.relocated, &request.original) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!("Cannot load library '{}': {}", request.library, e);
                return NestedOutcome::new(request, NestedStatus::Failed { reason: e.to_string() });
            }
        };

        let ctx = PassContext {
            target_root: request.target_root.clone(),
            output: request.relocated.clone(),
            depth: request.depth,
            search_missing: self.search_missing,
            cancel: self.cancel.clone(),
        };
        match run_pass(&mut doc, &ctx, Some(self as &dyn LibraryDispatcher), reporter) {
            Ok(report) => {
                let summary = NestedSummary {
                    copied: report.summary.copied,
                    up_to_date: report.summary.up_to_date,
                    missing: report.summary.missing.len(),
                    failed: report.summary.failed.clone(),
                };
                let mut outcome = NestedOutcome::new(
                    request,
                    NestedStatus::Completed {
                        summary: Some(summary),
                    },
                );
                outcome.children = report.nested;
                outcome
            }
            Err(e) => NestedOutcome::new(request, NestedStatus::Failed { reason: e.to_string() }),
        }
    }
}

/// Packs each library in a fresh `reloc pack` process that does not recurse
/// further. Libraries are dispatched once per pack.
#[derive(Debug)]
pub struct ProcessDispatcher {
    program: PathBuf,
    visited: Mutex<HashSet<Utf8PathBuf>>,
}

impl ProcessDispatcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Dispatch to the running executable.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    fn command(&self, request: &NestedRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("pack")
            .arg(request.relocated.as_str())
            .env(ENV_TARGET_DIR, request.target_root.as_str())
            .env(ENV_SKIP_LIBRARIES, "true")
            .env(ENV_SOURCE_ORIGIN, request.original.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if env_flag(ENV_DEBUG) {
            cmd.env(ENV_DEBUG, "true");
        } else {
            cmd.env_remove(ENV_DEBUG);
        }
        cmd
    }
}

impl LibraryDispatcher for ProcessDispatcher {
    fn dispatch(
        &self,
        request: &NestedRequest,
        _reporter: &mut dyn TransferReporter,
    ) -> NestedOutcome {
        if !lock_visited(&self.visited).insert(request.original.clone()) {
            return NestedOutcome::new(
                request,
                NestedStatus::Skipped {
                    reason: "already packed".into(),
                },
            );
        }

        tracing::info!(
            "Packing library '{}' in {}",
            request.library,
            self.program.display()
        );
        let status = match self.command(request).output() {
            Ok(output) if output.status.success() => NestedStatus::Completed { summary: None },
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
                NestedStatus::Failed {
                    reason: format!("{} {}", output.status, last.trim()).trim_end().to_string(),
                }
            }
            Err(e) => NestedStatus::Failed {
                reason: format!("cannot start {}: {}", self.program.display(), e),
            },
        };
        if let NestedStatus::Failed { reason } = &status {
            tracing::error!("Library '{}' was not packed: {}", request.library, reason);
        }
        NestedOutcome::new(request, status)
    }
}
