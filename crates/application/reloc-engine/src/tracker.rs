use crate::dispatch::NestedStatus;
use crate::reporter::TransferEvent;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSnapshot {
    /// Dependencies announced by every pass started so far, plus one save per pass.
    pub expected: u64,
    pub traced: u64,
    pub transferred: u64,
    pub skipped: u64,
    pub missing: u64,
    pub failed: u64,
    pub passes_started: u64,
    pub passes_done: u64,
    pub nested_failed: u64,
    pub current_file: Option<String>,
}

impl PackSnapshot {
    pub fn processed(&self) -> u64 {
        self.transferred + self.skipped + self.missing + self.failed + self.passes_done
    }

    /// Progress in percent. Sequences announce one path but copy many tiles,
    /// so the value is capped below 100 until every pass is done.
    pub fn percent(&self) -> u64 {
        if self.passes_started > 0 && self.passes_done >= self.passes_started {
            return 100;
        }
        if self.expected == 0 {
            return 0;
        }
        (self.processed() * 100 / self.expected).min(99)
    }
}

/// Folds [`TransferEvent`]s into a [`PackSnapshot`] for rendering.
#[derive(Debug, Default)]
pub struct PackTracker {
    snapshot: PackSnapshot,
}

impl PackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, event: &TransferEvent) {
        let s = &mut self.snapshot;
        match event {
            TransferEvent::PassStarted { pending, .. } => {
                s.passes_started += 1;
                s.expected += *pending as u64 + 1;
            }
            TransferEvent::Traced(path) => {
                s.traced += 1;
                s.current_file = path.file_name().map(str::to_string);
            }
            TransferEvent::Transferred { .. } => s.transferred += 1,
            TransferEvent::Skipped { .. } => s.skipped += 1,
            TransferEvent::Missing(_) => s.missing += 1,
            TransferEvent::Failed { .. } => s.failed += 1,
            TransferEvent::Outcome(_) => {}
            TransferEvent::Nested(outcome) => {
                if matches!(outcome.status, NestedStatus::Failed { .. }) {
                    s.nested_failed += 1;
                }
            }
            TransferEvent::Done { .. } => {
                s.passes_done += 1;
                s.current_file = None;
            }
        }
    }

    pub fn get_snapshot(&self) -> PackSnapshot {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_tracks_processed_files() {
        let mut tracker = PackTracker::new();
        tracker.update(&TransferEvent::PassStarted {
            project: "/p/scene.json".into(),
            pending: 3,
        });
        tracker.update(&TransferEvent::Traced("/p/a.png".into()));
        tracker.update(&TransferEvent::Transferred {
            src: "/p/a.png".into(),
            dest: "/out/k/a.png".into(),
        });
        tracker.update(&TransferEvent::Missing("/p/b.png".into()));

        let snap = tracker.get_snapshot();
        assert_eq!(snap.expected, 4);
        assert_eq!(snap.percent(), 50);
        assert_eq!(snap.current_file.as_deref(), Some("a.png"));

        tracker.update(&TransferEvent::Done {
            output: "/out/scene.json".into(),
            missing: 1,
        });
        assert_eq!(tracker.get_snapshot().percent(), 100);
    }

    #[test]
    fn failed_copy_counts_once() {
        use crate::relocate::Relocator;
        use camino::Utf8PathBuf;
        use reloc_core::{DependencyRecord, ProjectDocument};

        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let out = root.join("out");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/a.png"), b"a").unwrap();
        // A directory where the copy has to land.
        let blocked = out.join(reloc_infra::directory_key(&root.join("src")));
        std::fs::create_dir_all(blocked.join("a.png/inner")).unwrap();

        let mut doc = ProjectDocument::new(root.join("src/scene.json"));
        doc.images.push(DependencyRecord::new("a", "//a.png"));
        let mut events: Vec<TransferEvent> = Vec::new();
        let summary = Relocator::new(&out).relocate(&mut doc, &mut events).finish();
        assert_eq!(summary.failed.len(), 1);

        let mut tracker = PackTracker::new();
        for event in &events {
            tracker.update(event);
        }
        let snap = tracker.get_snapshot();
        assert_eq!(snap.transferred, 0);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.processed(), 1);
    }

    #[test]
    fn extra_tiles_never_reach_completion_early() {
        let mut tracker = PackTracker::new();
        tracker.update(&TransferEvent::PassStarted {
            project: "/p/scene.json".into(),
            pending: 1,
        });
        for _ in 0..5 {
            tracker.update(&TransferEvent::Skipped {
                src: "/a".into(),
                dest: "/b".into(),
            });
        }
        assert_eq!(tracker.get_snapshot().percent(), 99);
    }
}
