use crate::dispatch::NestedOutcome;
use crate::relocate::{OutcomeStatus, TransferOutcome};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tokio::sync::mpsc::UnboundedSender;

/// Sink for the events of a pack, called synchronously in chronological order.
///
/// Every method defaults to a no-op so implementations only pick what they
/// render. Nested in-process passes report through the same sink.
pub trait TransferReporter {
    /// A pass over `project` is starting with `pending` distinct dependency paths.
    fn pass_started(&mut self, _project: &Utf8Path, _pending: usize) {}
    /// A physical file is about to be examined.
    fn trace_asset(&mut self, _path: &Utf8Path) {}
    fn transfer_file(&mut self, _src: &Utf8Path, _dest: &Utf8Path) {}
    fn transfer_file_skipped(&mut self, _src: &Utf8Path, _dest: &Utf8Path) {}
    fn missing_file(&mut self, _path: &Utf8Path) {}
    fn transfer_failed(&mut self, _src: &Utf8Path, _reason: &str) {}
    /// Final outcome of one file or file-less record.
    fn outcome(&mut self, _outcome: &TransferOutcome) {}
    fn nested_pass(&mut self, _outcome: &NestedOutcome) {}
    /// A pass saved its project copy to `output`.
    fn pack_done(&mut self, _output: &Utf8Path, _missing: &BTreeSet<Utf8PathBuf>) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl TransferReporter for NoopReporter {}

impl<R: TransferReporter + ?Sized> TransferReporter for &mut R {
    fn pass_started(&mut self, project: &Utf8Path, pending: usize) {
        (**self).pass_started(project, pending)
    }
    fn trace_asset(&mut self, path: &Utf8Path) {
        (**self).trace_asset(path)
    }
    fn transfer_file(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        (**self).transfer_file(src, dest)
    }
    fn transfer_file_skipped(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        (**self).transfer_file_skipped(src, dest)
    }
    fn missing_file(&mut self, path: &Utf8Path) {
        (**self).missing_file(path)
    }
    fn transfer_failed(&mut self, src: &Utf8Path, reason: &str) {
        (**self).transfer_failed(src, reason)
    }
    fn outcome(&mut self, outcome: &TransferOutcome) {
        (**self).outcome(outcome)
    }
    fn nested_pass(&mut self, outcome: &NestedOutcome) {
        (**self).nested_pass(outcome)
    }
    fn pack_done(&mut self, output: &Utf8Path, missing: &BTreeSet<Utf8PathBuf>) {
        (**self).pack_done(output, missing)
    }
}

impl<R: TransferReporter> TransferReporter for Option<R> {
    fn pass_started(&mut self, project: &Utf8Path, pending: usize) {
        if let Some(r) = self {
            r.pass_started(project, pending)
        }
    }
    fn trace_asset(&mut self, path: &Utf8Path) {
        if let Some(r) = self {
            r.trace_asset(path)
        }
    }
    fn transfer_file(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        if let Some(r) = self {
            r.transfer_file(src, dest)
        }
    }
    fn transfer_file_skipped(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        if let Some(r) = self {
            r.transfer_file_skipped(src, dest)
        }
    }
    fn missing_file(&mut self, path: &Utf8Path) {
        if let Some(r) = self {
            r.missing_file(path)
        }
    }
    fn transfer_failed(&mut self, src: &Utf8Path, reason: &str) {
        if let Some(r) = self {
            r.transfer_failed(src, reason)
        }
    }
    fn outcome(&mut self, outcome: &TransferOutcome) {
        if let Some(r) = self {
            r.outcome(outcome)
        }
    }
    fn nested_pass(&mut self, outcome: &NestedOutcome) {
        if let Some(r) = self {
            r.nested_pass(outcome)
        }
    }
    fn pack_done(&mut self, output: &Utf8Path, missing: &BTreeSet<Utf8PathBuf>) {
        if let Some(r) = self {
            r.pack_done(output, missing)
        }
    }
}

/// Fan-out to two reporters, first one first.
impl<A: TransferReporter, B: TransferReporter> TransferReporter for (A, B) {
    fn pass_started(&mut self, project: &Utf8Path, pending: usize) {
        self.0.pass_started(project, pending);
        self.1.pass_started(project, pending);
    }
    fn trace_asset(&mut self, path: &Utf8Path) {
        self.0.trace_asset(path);
        self.1.trace_asset(path);
    }
    fn transfer_file(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        self.0.transfer_file(src, dest);
        self.1.transfer_file(src, dest);
    }
    fn transfer_file_skipped(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        self.0.transfer_file_skipped(src, dest);
        self.1.transfer_file_skipped(src, dest);
    }
    fn missing_file(&mut self, path: &Utf8Path) {
        self.0.missing_file(path);
        self.1.missing_file(path);
    }
    fn transfer_failed(&mut self, src: &Utf8Path, reason: &str) {
        self.0.transfer_failed(src, reason);
        self.1.transfer_failed(src, reason);
    }
    fn outcome(&mut self, outcome: &TransferOutcome) {
        self.0.outcome(outcome);
        self.1.outcome(outcome);
    }
    fn nested_pass(&mut self, outcome: &NestedOutcome) {
        self.0.nested_pass(outcome);
        self.1.nested_pass(outcome);
    }
    fn pack_done(&mut self, output: &Utf8Path, missing: &BTreeSet<Utf8PathBuf>) {
        self.0.pack_done(output, missing);
        self.1.pack_done(output, missing);
    }
}

/// Owned form of every reporter call, for sending across threads.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    PassStarted {
        project: Utf8PathBuf,
        pending: usize,
    },
    Traced(Utf8PathBuf),
    Transferred {
        src: Utf8PathBuf,
        dest: Utf8PathBuf,
    },
    Skipped {
        src: Utf8PathBuf,
        dest: Utf8PathBuf,
    },
    Missing(Utf8PathBuf),
    Failed {
        src: Utf8PathBuf,
        reason: String,
    },
    Outcome(TransferOutcome),
    Nested(NestedOutcome),
    Done {
        output: Utf8PathBuf,
        missing: usize,
    },
}

/// Collects events in memory.
impl TransferReporter for Vec<TransferEvent> {
    fn pass_started(&mut self, project: &Utf8Path, pending: usize) {
        self.push(TransferEvent::PassStarted {
            project: project.to_path_buf(),
            pending,
        });
    }
    fn trace_asset(&mut self, path: &Utf8Path) {
        self.push(TransferEvent::Traced(path.to_path_buf()));
    }
    fn transfer_file(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        self.push(TransferEvent::Transferred {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
        });
    }
    fn transfer_file_skipped(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        self.push(TransferEvent::Skipped {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
        });
    }
    fn missing_file(&mut self, path: &Utf8Path) {
        self.push(TransferEvent::Missing(path.to_path_buf()));
    }
    fn transfer_failed(&mut self, src: &Utf8Path, reason: &str) {
        self.push(TransferEvent::Failed {
            src: src.to_path_buf(),
            reason: reason.to_string(),
        });
    }
    fn outcome(&mut self, outcome: &TransferOutcome) {
        self.push(TransferEvent::Outcome(outcome.clone()));
    }
    fn nested_pass(&mut self, outcome: &NestedOutcome) {
        self.push(TransferEvent::Nested(outcome.clone()));
    }
    fn pack_done(&mut self, output: &Utf8Path, missing: &BTreeSet<Utf8PathBuf>) {
        self.push(TransferEvent::Done {
            output: output.to_path_buf(),
            missing: missing.len(),
        });
    }
}

/// Forwards events to a presentation task. Sending never blocks; events
/// sent after the receiver is gone are dropped.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: UnboundedSender<TransferEvent>,
}

impl ChannelReporter {
    pub fn new(tx: UnboundedSender<TransferEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: TransferEvent) {
        let _ = self.tx.send(event);
    }
}

impl TransferReporter for ChannelReporter {
    fn pass_started(&mut self, project: &Utf8Path, pending: usize) {
        self.send(TransferEvent::PassStarted {
            project: project.to_path_buf(),
            pending,
        });
    }
    fn trace_asset(&mut self, path: &Utf8Path) {
        self.send(TransferEvent::Traced(path.to_path_buf()));
    }
    fn transfer_file(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        self.send(TransferEvent::Transferred {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
        });
    }
    fn transfer_file_skipped(&mut self, src: &Utf8Path, dest: &Utf8Path) {
        self.send(TransferEvent::Skipped {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
        });
    }
    fn missing_file(&mut self, path: &Utf8Path) {
        self.send(TransferEvent::Missing(path.to_path_buf()));
    }
    fn transfer_failed(&mut self, src: &Utf8Path, reason: &str) {
        self.send(TransferEvent::Failed {
            src: src.to_path_buf(),
            reason: reason.to_string(),
        });
    }
    fn outcome(&mut self, outcome: &TransferOutcome) {
        self.send(TransferEvent::Outcome(outcome.clone()));
    }
    fn nested_pass(&mut self, outcome: &NestedOutcome) {
        self.send(TransferEvent::Nested(outcome.clone()));
    }
    fn pack_done(&mut self, output: &Utf8Path, missing: &BTreeSet<Utf8PathBuf>) {
        self.send(TransferEvent::Done {
            output: output.to_path_buf(),
            missing: missing.len(),
        });
    }
}

/// Emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl TransferReporter for TracingReporter {
    fn pass_started(&mut self, project: &Utf8Path, pending: usize) {
        tracing::info!("Packing {} ({} dependencies)", project, pending);
    }
    fn trace_asset(&mut self, path: &Utf8Path) {
        tracing::trace!("Tracing {}", path);
    }
    fn outcome(&mut self, outcome: &TransferOutcome) {
        match &outcome.status {
            OutcomeStatus::Missing => tracing::warn!("{}", outcome),
            OutcomeStatus::Failed { .. } => tracing::error!("{}", outcome),
            _ => tracing::debug!("{}", outcome),
        }
    }
    fn nested_pass(&mut self, outcome: &NestedOutcome) {
        tracing::info!("{}", outcome);
    }
    fn pack_done(&mut self, output: &Utf8Path, missing: &BTreeSet<Utf8PathBuf>) {
        if missing.is_empty() {
            tracing::info!("Saved {}", output);
        } else {
            tracing::warn!("Saved {} with {} missing files", output, missing.len());
        }
    }
}

/// Writes one diagnostic line per outcome.
///
/// The first write error is logged and disables the log; a broken log never
/// fails a pack.
pub struct DiagnosticLog<W: Write> {
    writer: W,
    broken: bool,
}

impl DiagnosticLog<BufWriter<File>> {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: &Utf8Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> DiagnosticLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            broken: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: std::fmt::Arguments<'_>) {
        if self.broken {
            return;
        }
        if let Err(e) = self.writer.write_fmt(line).and_then(|_| self.writer.write_all(b"\n")) {
            tracing::warn!("Diagnostic log disabled: {}", e);
            self.broken = true;
        }
    }
}

impl<W: Write> TransferReporter for DiagnosticLog<W> {
    fn outcome(&mut self, outcome: &TransferOutcome) {
        self.write_line(format_args!("{outcome}"));
    }
    fn pack_done(&mut self, _output: &Utf8Path, _missing: &BTreeSet<Utf8PathBuf>) {
        if !self.broken {
            if let Err(e) = self.writer.flush() {
                tracing::warn!("Failed to flush diagnostic log: {}", e);
            }
        }
    }
}
