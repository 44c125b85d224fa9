mod outcome;

pub use outcome::{
    FailedTransfer, OutcomeStatus, PassSummary, RelocatedLibrary, TransferOutcome,
};

use crate::mapper::DirectoryMapper;
use crate::reporter::TransferReporter;
use camino::{Utf8Path, Utf8PathBuf};
use reloc_core::{DependencyKind, DependencyRecord, ProjectDocument, Resolution, SequencePattern};
use reloc_infra::{plan_copy, CopyStatus, TransferError};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Moves the files a project references into one export directory.
#[derive(Debug, Clone)]
pub struct Relocator {
    target_root: Utf8PathBuf,
    cancel: Option<Arc<AtomicBool>>,
}

impl Relocator {
    pub fn new(target_root: &Utf8Path) -> Self {
        Self {
            target_root: target_root.to_path_buf(),
            cancel: None,
        }
    }

    /// Stop between records once `flag` is set.
    pub fn with_cancel(mut self, flag: Option<Arc<AtomicBool>>) -> Self {
        self.cancel = flag;
        self
    }

    /// Start a pass over `doc`. Nothing is touched until the pass is iterated.
    pub fn relocate<'a>(
        &self,
        doc: &'a mut ProjectDocument,
        reporter: &'a mut dyn TransferReporter,
    ) -> RelocationPass<'a> {
        doc.pin_library_origins();
        let pending = doc.dependency_paths();
        reporter.pass_started(doc.path(), pending.len());
        RelocationPass {
            doc,
            reporter,
            mapper: DirectoryMapper::new(&self.target_root),
            cancel: self.cancel.clone(),
            kind_idx: 0,
            record_idx: 0,
            queued: VecDeque::new(),
            pending,
            summary: PassSummary::default(),
            exhausted: false,
        }
    }
}

/// One relocation pass, yielding a [`TransferOutcome`] per file as it goes.
///
/// Iterating performs the copies and rewrites the document's records, so a
/// pass can only be consumed once. [`RelocationPass::finish`] runs whatever
/// is left and returns the tally.
pub struct RelocationPass<'a> {
    doc: &'a mut ProjectDocument,
    reporter: &'a mut dyn TransferReporter,
    mapper: DirectoryMapper,
    cancel: Option<Arc<AtomicBool>>,
    kind_idx: usize,
    record_idx: usize,
    queued: VecDeque<TransferOutcome>,
    pending: BTreeSet<Utf8PathBuf>,
    summary: PassSummary,
    exhausted: bool,
}

impl<'a> RelocationPass<'a> {
    /// Dependency paths no record has claimed yet.
    pub fn pending(&self) -> &BTreeSet<Utf8PathBuf> {
        &self.pending
    }

    pub fn finish(mut self) -> PassSummary {
        for _ in self.by_ref() {}
        self.summary.unaccounted = std::mem::take(&mut self.pending);
        if !self.summary.unaccounted.is_empty() {
            tracing::debug!(
                "{} dependency paths were not claimed by any record",
                self.summary.unaccounted.len()
            );
        }
        self.summary
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Next record in traversal order, advancing the cursor.
    fn next_record(&mut self) -> Option<(DependencyKind, usize)> {
        while self.kind_idx < DependencyKind::ALL.len() {
            let kind = DependencyKind::ALL[self.kind_idx];
            if self.record_idx < self.doc.records(kind).len() {
                let idx = self.record_idx;
                self.record_idx += 1;
                return Some((kind, idx));
            }
            self.kind_idx += 1;
            self.record_idx = 0;
        }
        None
    }

    fn process(&mut self, kind: DependencyKind, idx: usize) {
        let record = self.doc.records(kind)[idx].clone();
        match self.doc.resolve(&record) {
            Resolution::Empty => self.emit(
                kind,
                &record,
                Utf8PathBuf::new(),
                OutcomeStatus::Skipped {
                    reason: "empty filepath".into(),
                },
            ),
            Resolution::Builtin => self.emit(
                kind,
                &record,
                Utf8PathBuf::from(record.filepath.trim()),
                OutcomeStatus::Skipped {
                    reason: "built-in resource".into(),
                },
            ),
            Resolution::File(path) => {
                self.pending.remove(&path);
                if let Some(dest) = self.transfer(kind, &record, &path) {
                    if kind == DependencyKind::Libraries && record.library.is_none() {
                        self.summary.relocated_libraries.push(RelocatedLibrary {
                            name: record.name.clone(),
                            original: path,
                            relocated: dest.clone(),
                        });
                    }
                    self.rewrite(kind, idx, &dest);
                }
            }
            Resolution::Sequence(pattern) => {
                self.pending.remove(&pattern.path());
                if let Some(dest_dir) = self.transfer_sequence(kind, &record, &pattern) {
                    self.rewrite(kind, idx, &dest_dir.join(pattern.file_name()));
                }
            }
        }
    }

    /// Copy one file into its mapped directory. Returns the destination when
    /// the file is there afterwards.
    fn transfer(
        &mut self,
        kind: DependencyKind,
        record: &DependencyRecord,
        src: &Utf8Path,
    ) -> Option<Utf8PathBuf> {
        self.reporter.trace_asset(src);
        // Checked before mapping so a missing file leaves no empty directory behind.
        if !src.exists() {
            self.reporter.missing_file(src);
            self.emit(kind, record, src.to_path_buf(), OutcomeStatus::Missing);
            return None;
        }
        let Some(parent) = src.parent() else {
            self.fail(kind, record, src, "path has no parent directory".into());
            return None;
        };
        match self.mapper.target_for(parent) {
            Ok(dest_dir) => self.copy_into(kind, record, src, &dest_dir),
            Err(e) => {
                self.fail(kind, record, src, e.to_string());
                None
            }
        }
    }

    fn copy_into(
        &mut self,
        kind: DependencyKind,
        record: &DependencyRecord,
        src: &Utf8Path,
        dest_dir: &Utf8Path,
    ) -> Option<Utf8PathBuf> {
        let plan = match plan_copy(src, dest_dir) {
            Ok(plan) => plan,
            Err(TransferError::SourceMissing(_)) => {
                self.reporter.missing_file(src);
                self.emit(kind, record, src.to_path_buf(), OutcomeStatus::Missing);
                return None;
            }
            Err(e) => {
                self.fail(kind, record, src, e.to_string());
                return None;
            }
        };

        // Reported once the file is in place; a failed copy only reports the failure.
        match plan.execute() {
            Ok(CopyStatus::Copied) => {
                self.reporter.transfer_file(&plan.src, &plan.dest);
                let dest = plan.dest.clone();
                self.emit(kind, record, plan.src, OutcomeStatus::Copied { dest: dest.clone() });
                Some(dest)
            }
            Ok(CopyStatus::UpToDate) => {
                self.reporter.transfer_file_skipped(&plan.src, &plan.dest);
                let dest = plan.dest.clone();
                self.emit(kind, record, plan.src, OutcomeStatus::UpToDate { dest: dest.clone() });
                Some(dest)
            }
            Err(e) => {
                self.fail(kind, record, src, e.to_string());
                None
            }
        }
    }

    /// Copy every tile of a sequence. Returns the target directory when at
    /// least one tile made it.
    fn transfer_sequence(
        &mut self,
        kind: DependencyKind,
        record: &DependencyRecord,
        pattern: &SequencePattern,
    ) -> Option<Utf8PathBuf> {
        let tiles = match pattern.expand() {
            Ok(tiles) => tiles,
            Err(e) => {
                let reason = format!("cannot list {}: {}", pattern.directory(), e);
                self.fail(kind, record, &pattern.path(), reason);
                return None;
            }
        };
        if tiles.is_empty() {
            let path = pattern.path();
            self.reporter.trace_asset(&path);
            self.reporter.missing_file(&path);
            self.emit(kind, record, path, OutcomeStatus::Missing);
            return None;
        }

        let dest_dir = match self.mapper.target_for(pattern.directory()) {
            Ok(dir) => dir,
            Err(e) => {
                self.fail(kind, record, &pattern.path(), e.to_string());
                return None;
            }
        };
        tracing::debug!("Sequence {} has {} tiles", pattern.path(), tiles.len());

        let mut any = false;
        for tile in &tiles {
            self.reporter.trace_asset(tile);
            any |= self.copy_into(kind, record, tile, &dest_dir).is_some();
        }
        any.then_some(dest_dir)
    }

    fn rewrite(&mut self, kind: DependencyKind, idx: usize, dest: &Utf8Path) {
        let record = &mut self.doc.records_mut(kind)[idx];
        if record.filepath != dest.as_str() {
            tracing::trace!("Rewriting {} '{}' -> {}", kind, record.name, dest);
            record.filepath = dest.to_string();
        }
    }

    fn fail(&mut self, kind: DependencyKind, record: &DependencyRecord, src: &Utf8Path, reason: String) {
        self.reporter.transfer_failed(src, &reason);
        self.emit(kind, record, src.to_path_buf(), OutcomeStatus::Failed { reason });
    }

    fn emit(
        &mut self,
        kind: DependencyKind,
        record: &DependencyRecord,
        source: Utf8PathBuf,
        status: OutcomeStatus,
    ) {
        let outcome = TransferOutcome {
            kind,
            record: record.name.clone(),
            source,
            status,
        };
        self.summary.record(&outcome);
        self.reporter.outcome(&outcome);
        self.queued.push_back(outcome);
    }
}

impl Iterator for RelocationPass<'_> {
    type Item = TransferOutcome;

    fn next(&mut self) -> Option<TransferOutcome> {
        loop {
            if let Some(outcome) = self.queued.pop_front() {
                return Some(outcome);
            }
            if self.exhausted {
                return None;
            }
            if self.cancelled() {
                tracing::warn!("Relocation of {} cancelled", self.doc.path());
                self.summary.cancelled = true;
                self.exhausted = true;
                return None;
            }
            match self.next_record() {
                Some((kind, idx)) => self.process(kind, idx),
                None => self.exhausted = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{NoopReporter, TransferEvent};
    use std::fs;

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn setup() -> (tempfile::TempDir, Utf8PathBuf, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let out = root.join("out");
        fs::create_dir_all(root.join("src/tex")).unwrap();
        fs::create_dir(&out).unwrap();
        (dir, root, out)
    }

    #[test]
    fn copies_and_rewrites_in_traversal_order() {
        let (_dir, root, out) = setup();
        fs::write(root.join("src/tex/a.png"), b"a").unwrap();
        fs::write(root.join("src/hum.wav"), b"hum").unwrap();

        let mut doc = ProjectDocument::new(root.join("src/scene.json"));
        doc.sounds.push(DependencyRecord::new("hum", "//hum.wav"));
        doc.images.push(DependencyRecord::new("a", "//tex/a.png"));
        doc.texts.push(DependencyRecord::new("notes", ""));

        let mut reporter = NoopReporter;
        let outcomes: Vec<_> = Relocator::new(&out).relocate(&mut doc, &mut reporter).collect();

        let kinds: Vec<_> = outcomes.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![DependencyKind::Images, DependencyKind::Sounds, DependencyKind::Texts]
        );
        assert!(outcomes[0].copied() && outcomes[1].copied());
        assert_eq!(outcomes[2].label(), "skipped");

        let new_image = Utf8PathBuf::from(&doc.images[0].filepath);
        assert!(new_image.starts_with(&out));
        assert_eq!(fs::read(&new_image).unwrap(), b"a");
        assert_eq!(doc.texts[0].filepath, "");
    }

    #[test]
    fn missing_file_keeps_reference_and_creates_nothing() {
        let (_dir, root, out) = setup();
        let mut doc = ProjectDocument::new(root.join("src/scene.json"));
        doc.images.push(DependencyRecord::new("lost", "//tex/lost.png"));

        let mut events: Vec<TransferEvent> = Vec::new();
        let mut pass = Relocator::new(&out).relocate(&mut doc, &mut events);
        let outcome = pass.next().unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Missing);
        let summary = pass.finish();

        assert_eq!(summary.missing.len(), 1);
        assert_eq!(doc.images[0].filepath, "//tex/lost.png");
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
        assert!(events.contains(&TransferEvent::Missing(root.join("src/tex/lost.png"))));
    }

    #[test]
    fn directory_reference_is_a_failed_transfer() {
        let (_dir, root, out) = setup();
        let mut doc = ProjectDocument::new(root.join("src/scene.json"));
        doc.images.push(DependencyRecord::new("folder", "//tex"));

        let mut reporter = NoopReporter;
        let mut pass = Relocator::new(&out).relocate(&mut doc, &mut reporter);
        let outcome = pass.next().unwrap();
        let OutcomeStatus::Failed { reason } = &outcome.status else {
            panic!("expected a failed transfer, got {:?}", outcome.status);
        };
        assert!(reason.contains("not a regular file"), "{reason}");
        let summary = pass.finish();
        assert!(summary.missing.is_empty());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(doc.images[0].filepath, "//tex");
    }

    #[test]
    fn sequence_tiles_are_copied_and_pattern_rewritten() {
        let (_dir, root, out) = setup();
        for tile in ["wood_1001.png", "wood_1002.png", "wood_1011.png"] {
            fs::write(root.join("src/tex").join(tile), tile).unwrap();
        }
        fs::write(root.join("src/tex/other.png"), b"x").unwrap();

        let mut doc = ProjectDocument::new(root.join("src/scene.json"));
        doc.images
            .push(DependencyRecord::new("wood", "//tex/wood_<UDIM>.png"));

        let mut reporter = NoopReporter;
        let outcomes: Vec<_> = Relocator::new(&out).relocate(&mut doc, &mut reporter).collect();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(TransferOutcome::copied));

        let rewritten = Utf8PathBuf::from(&doc.images[0].filepath);
        assert_eq!(rewritten.file_name(), Some("wood_<UDIM>.png"));
        let dest_dir = rewritten.parent().unwrap();
        assert!(dest_dir.join("wood_1011.png").is_file());
        assert!(!dest_dir.join("other.png").exists());
    }

    #[test]
    fn root_libraries_are_listed_for_dispatch() {
        let (_dir, root, out) = setup();
        fs::write(root.join("src/props.json"), b"{}").unwrap();
        let mut doc = ProjectDocument::new(root.join("src/scene.json"));
        doc.libraries.push(DependencyRecord::new("props", "//props.json"));
        doc.libraries
            .push(DependencyRecord::new("inner", "//props.json").owned_by("props"));

        let mut reporter = NoopReporter;
        let summary = Relocator::new(&out).relocate(&mut doc, &mut reporter).finish();
        assert_eq!(summary.relocated_libraries.len(), 1);
        let lib = &summary.relocated_libraries[0];
        assert_eq!(lib.name, "props");
        assert_eq!(lib.original, root.join("src/props.json"));
        assert!(lib.relocated.is_file());
    }

    #[test]
    fn unclaimed_paths_are_unaccounted() {
        let (_dir, root, out) = setup();
        let mut doc = ProjectDocument::new(root.join("src/scene.json"));
        doc.unlinked_paths.push("//meta/extra.bin".into());

        let mut reporter = NoopReporter;
        let summary = Relocator::new(&out).relocate(&mut doc, &mut reporter).finish();
        assert_eq!(
            summary.unaccounted.into_iter().collect::<Vec<_>>(),
            vec![root.join("src/meta/extra.bin")]
        );
    }

    #[test]
    fn cancelled_pass_stops_between_records() {
        let (_dir, root, out) = setup();
        fs::write(root.join("src/tex/a.png"), b"a").unwrap();
        let mut doc = ProjectDocument::new(root.join("src/scene.json"));
        doc.images.push(DependencyRecord::new("a", "//tex/a.png"));

        let flag = Arc::new(AtomicBool::new(true));
        let mut reporter = NoopReporter;
        let summary = Relocator::new(&out)
            .with_cancel(Some(flag))
            .relocate(&mut doc, &mut reporter)
            .finish();
        assert!(summary.cancelled);
        assert_eq!(summary.copied, 0);
        assert_eq!(doc.images[0].filepath, "//tex/a.png");
    }
}
