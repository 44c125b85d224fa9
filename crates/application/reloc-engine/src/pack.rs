use crate::dispatch::{
    InProcessDispatcher, LibraryDispatcher, NestedOutcome, NestedRequest, NestedStatus,
    ProcessDispatcher,
};
use crate::relocate::{FailedTransfer, PassSummary, Relocator, TransferOutcome};
use crate::reporter::TransferReporter;
use crate::search::{recover_missing, RecoveredRecord};
use camino::{Utf8Path, Utf8PathBuf};
use reloc_config::DEFAULT_MAX_LIBRARY_DEPTH;
use reloc_core::document::absolutize;
use reloc_core::path_utils::AssetPath;
use reloc_core::{DocumentError, ProjectDocument};
use std::fs;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("invalid project path {path}: {source}")]
    ProjectPath {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid export directory {path}: {reason}")]
    InvalidTarget { path: Utf8PathBuf, reason: String },
    #[error("export directory {path} is not writable: {source}")]
    TargetNotWritable {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The project copy was saved, but some files could not be transferred.
    #[error("{} file(s) could not be transferred", failed.len())]
    FileTransfer {
        failed: Vec<FailedTransfer>,
        report: Box<PackReport>,
    },
}

/// How relocated libraries get their own pass.
#[derive(Debug)]
pub enum LibraryIsolation {
    InProcess { max_depth: usize },
    Process(ProcessDispatcher),
}

impl Default for LibraryIsolation {
    fn default() -> Self {
        LibraryIsolation::InProcess {
            max_depth: DEFAULT_MAX_LIBRARY_DEPTH,
        }
    }
}

#[derive(Debug)]
pub struct PackOptions {
    pub target_root: Utf8PathBuf,
    pub dispatch_libraries: bool,
    pub isolation: LibraryIsolation,
    pub search_missing: bool,
    /// Resolve relative references as if the project lived here.
    pub origin: Option<Utf8PathBuf>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl PackOptions {
    pub fn new(target_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
            dispatch_libraries: true,
            isolation: LibraryIsolation::default(),
            search_missing: true,
            origin: None,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStatus {
    Clean,
    Warnings { missing: usize, failed: usize },
}

/// Everything one pass did, with the passes it dispatched.
#[derive(Debug, Clone)]
pub struct PackReport {
    pub output: Utf8PathBuf,
    pub outcomes: Vec<TransferOutcome>,
    pub summary: PassSummary,
    pub nested: Vec<NestedOutcome>,
    pub recovered: Vec<RecoveredRecord>,
}

impl PackReport {
    /// Every nested pass, depth-first.
    pub fn nested_outcomes(&self) -> impl Iterator<Item = &NestedOutcome> {
        self.nested.iter().flat_map(NestedOutcome::walk)
    }

    /// Transfer failures of this pass and of every nested in-process pass.
    pub fn failed_transfers(&self) -> Vec<FailedTransfer> {
        let mut failed = self.summary.failed.clone();
        for nested in self.nested_outcomes() {
            if let NestedStatus::Completed {
                summary: Some(summary),
            } = &nested.status
            {
                failed.extend(summary.failed.iter().cloned());
            }
        }
        failed
    }

    pub fn status(&self) -> PackStatus {
        let mut missing = self.summary.missing.len();
        let mut failed = self.summary.failed.len();
        for nested in self.nested_outcomes() {
            match &nested.status {
                NestedStatus::Completed {
                    summary: Some(summary),
                } => {
                    missing += summary.missing;
                    failed += summary.failed.len();
                }
                NestedStatus::Failed { .. } => failed += 1,
                _ => {}
            }
        }
        if missing == 0 && failed == 0 {
            PackStatus::Clean
        } else {
            PackStatus::Warnings { missing, failed }
        }
    }
}

pub(crate) struct PassContext {
    pub target_root: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub depth: usize,
    pub search_missing: bool,
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Relocate, dispatch libraries, search missing files, then save.
pub(crate) fn run_pass(
    doc: &mut ProjectDocument,
    ctx: &PassContext,
    dispatcher: Option<&dyn LibraryDispatcher>,
    reporter: &mut dyn TransferReporter,
) -> Result<PackReport, PackError> {
    let relocator = Relocator::new(&ctx.target_root).with_cancel(ctx.cancel.clone());
    let mut pass = relocator.relocate(doc, reporter);
    let outcomes: Vec<TransferOutcome> = pass.by_ref().collect();
    let mut summary = pass.finish();

    let mut nested = Vec::new();
    if let Some(dispatcher) = dispatcher.filter(|_| !summary.cancelled) {
        for lib in &summary.relocated_libraries {
            let request = NestedRequest {
                library: lib.name.clone(),
                original: lib.original.clone(),
                relocated: lib.relocated.clone(),
                target_root: ctx.target_root.clone(),
                depth: ctx.depth + 1,
            };
            let outcome = dispatcher.dispatch(&request, reporter);
            reporter.nested_pass(&outcome);
            nested.push(outcome);
        }
    }

    let mut recovered = Vec::new();
    if ctx.search_missing && !summary.missing.is_empty() {
        recovered = recover_missing(doc, &ctx.target_root, &summary.missing);
        summary
            .missing
            .retain(|path| !recovered.iter().any(|r| &r.missing == path));
    }

    doc.save_as(&ctx.output, Some(&ctx.target_root))?;
    reporter.pack_done(&ctx.output, &summary.missing);

    Ok(PackReport {
        output: ctx.output.clone(),
        outcomes,
        summary,
        nested,
        recovered,
    })
}

/// Make sure `root` can receive the export: its parent must exist, it must
/// not be a file, and it must accept new files.
fn prepare_target(root: &Utf8Path) -> Result<Utf8PathBuf, PackError> {
    let root = absolutize(root).map_err(|e| PackError::InvalidTarget {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;

    if root.is_file() {
        return Err(PackError::InvalidTarget {
            path: root,
            reason: "is a file".into(),
        });
    }
    if !root.is_dir() {
        if !root.parent().is_some_and(Utf8Path::is_dir) {
            return Err(PackError::InvalidTarget {
                path: root,
                reason: "parent directory does not exist".into(),
            });
        }
        fs::create_dir(&root).map_err(|source| PackError::TargetNotWritable {
            path: root.clone(),
            source,
        })?;
        tracing::info!("Created export directory {}", root);
    }

    tempfile::Builder::new()
        .prefix(".reloc-probe")
        .tempfile_in(&root)
        .map_err(|source| PackError::TargetNotWritable {
            path: root.clone(),
            source,
        })?;
    Ok(root)
}

/// Packs a project and its dependencies into one export directory.
#[derive(Debug)]
pub struct Packer {
    options: PackOptions,
}

impl Packer {
    pub fn new(options: PackOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PackOptions {
        &self.options
    }

    /// Pack `project`. The copy lands at `<target_root>/<file name>`, or is
    /// rewritten in place when the project already lives in the export tree.
    ///
    /// Nothing is written when the project cannot be loaded or the export
    /// directory is unusable. Transfer faults are reported after the copy
    /// was saved, as [`PackError::FileTransfer`].
    pub fn pack(
        &self,
        project: &Utf8Path,
        reporter: &mut dyn TransferReporter,
    ) -> Result<PackReport, PackError> {
        let project = absolutize(project).map_err(|source| PackError::ProjectPath {
            path: project.to_path_buf(),
            source,
        })?;
        let anchor = self.options.origin.as_deref().unwrap_or(project.as_path());
        let mut doc = ProjectDocument::load_anchored(&project, anchor)?;
        let target_root = prepare_target(&self.options.target_root)?;

        let output = if AssetPath::is_within(&project, &target_root) {
            project.clone()
        } else {
            target_root.join(project.file_name().unwrap_or(doc.file_name()))
        };
        tracing::info!("Packing {} into {}", project, target_root);

        let in_process;
        let dispatcher: Option<&dyn LibraryDispatcher> = if !self.options.dispatch_libraries {
            None
        } else {
            match &self.options.isolation {
                LibraryIsolation::InProcess { max_depth } => {
                    in_process = InProcessDispatcher::new(*max_depth)
                        .with_search(self.options.search_missing)
                        .with_cancel(self.options.cancel.clone());
                    in_process.mark_visited(doc.path());
                    Some(&in_process as &dyn LibraryDispatcher)
                }
                LibraryIsolation::Process(process) => Some(process as &dyn LibraryDispatcher),
            }
        };

        let ctx = PassContext {
            target_root,
            output,
            depth: 0,
            search_missing: self.options.search_missing,
            cancel: self.options.cancel.clone(),
        };
        let report = run_pass(&mut doc, &ctx, dispatcher, reporter)?;

        let failed = report.failed_transfers();
        if !failed.is_empty() {
            return Err(PackError::FileTransfer {
                failed,
                report: Box::new(report),
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NoopReporter;

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn target_that_is_a_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        fs::write(root.join("file"), b"x").unwrap();
        assert!(matches!(
            prepare_target(&root.join("file")),
            Err(PackError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn target_is_created_only_under_existing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        assert_eq!(prepare_target(&root.join("out")).unwrap(), root.join("out"));
        assert!(root.join("out").is_dir());
        assert!(matches!(
            prepare_target(&root.join("a/b")),
            Err(PackError::InvalidTarget { .. })
        ));
        assert!(!root.join("a").exists());
    }

    #[test]
    fn malformed_project_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        fs::write(root.join("scene.json"), "[").unwrap();
        let packer = Packer::new(PackOptions::new(root.join("out")));
        let err = packer
            .pack(&root.join("scene.json"), &mut NoopReporter)
            .unwrap_err();
        assert!(matches!(err, PackError::Document(DocumentError::Parse { .. })));
        assert!(!root.join("out").exists());
    }
}
