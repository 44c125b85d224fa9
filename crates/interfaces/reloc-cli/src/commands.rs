use crate::{list_dependencies, log_path, PackArgs};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use reloc_config::{clamp_depth, EXIT_TRANSFER_FAILED};
use reloc_core::ProjectDocument;
use reloc_engine::{
    ChannelReporter, DiagnosticLog, LibraryIsolation, PackError, PackOptions, PackReport,
    PackStatus, PackTracker, Packer, ProcessDispatcher, TransferEvent, TransferOutcome,
    TransferReporter,
};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Diagnostic log opened once the export directory has been validated, so a
/// rejected pack leaves no file behind.
struct LogFile {
    path: Utf8PathBuf,
    log: Option<DiagnosticLog<BufWriter<File>>>,
    opened: bool,
}

impl LogFile {
    fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            log: None,
            opened: false,
        }
    }
}

impl TransferReporter for LogFile {
    fn pass_started(&mut self, _project: &Utf8Path, _pending: usize) {
        if self.opened {
            return;
        }
        self.opened = true;
        match DiagnosticLog::create(&self.path) {
            Ok(log) => self.log = Some(log),
            Err(e) => tracing::warn!("Cannot write log {}: {}", self.path, e),
        }
    }
    fn outcome(&mut self, outcome: &TransferOutcome) {
        self.log.outcome(outcome);
    }
    fn pack_done(&mut self, output: &Utf8Path, missing: &BTreeSet<Utf8PathBuf>) {
        self.log.pack_done(output, missing);
    }
}

fn pack_options(args: &PackArgs, cancel: Arc<AtomicBool>) -> Result<PackOptions> {
    let mut options = PackOptions::new(args.target.clone());
    options.dispatch_libraries = !args.skip_libraries;
    options.isolation = if args.isolate_libraries {
        let dispatcher =
            ProcessDispatcher::current_exe().context("Failed to locate the reloc executable")?;
        LibraryIsolation::Process(dispatcher)
    } else {
        LibraryIsolation::InProcess {
            max_depth: clamp_depth(args.max_depth),
        }
    };
    options.search_missing = !args.no_search;
    options.origin = args.origin.clone();
    options.cancel = Some(cancel);
    Ok(options)
}

/// Pack a project. Returns the process exit code.
pub async fn cmd_pack(args: PackArgs) -> Result<i32> {
    println!(":: Packing {}", args.project);
    println!("   Target: {}", args.target);
    if let Some(origin) = &args.origin {
        println!("   Origin: {}", origin);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let options = pack_options(&args, cancel.clone())?;
    let log = (!args.no_log_file).then(|| LogFile::new(log_path(&args.target, &args.project)));

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::Relaxed);
            }
        })
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let project = args.project.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let mut reporter = (ChannelReporter::new(tx), log);
        Packer::new(options).pack(&project, &mut reporter)
    });

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")?
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut tracker = PackTracker::new();
    let mut bytes_copied = 0u64;
    while let Some(event) = rx.recv().await {
        tracker.update(&event);
        match &event {
            TransferEvent::Transferred { src, .. } => {
                bytes_copied += std::fs::metadata(src).map(|m| m.len()).unwrap_or(0);
            }
            TransferEvent::Nested(outcome) => pb.println(format!("   {}", outcome)),
            _ => {}
        }
        let snap = tracker.get_snapshot();
        pb.set_position(snap.percent());
        pb.set_message(snap.current_file.unwrap_or_default());
    }

    let result = worker.await.context("Pack worker panicked")?;
    ctrl_c.abort();
    pb.finish_and_clear();

    match result {
        Ok(report) => {
            print_report(&report, bytes_copied);
            if report.summary.cancelled {
                anyhow::bail!("Pack cancelled, partial export saved to {}", report.output);
            }
            Ok(0)
        }
        Err(PackError::FileTransfer { failed, report }) => {
            print_report(&report, bytes_copied);
            println!("\n:: {} file(s) could not be transferred", failed.len());
            for f in &failed {
                println!("   - {} ({})", f.source, f.reason);
            }
            Ok(EXIT_TRANSFER_FAILED)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to pack {}", args.project)),
    }
}

fn print_report(report: &PackReport, bytes_copied: u64) {
    let s = &report.summary;
    println!("\n:: Pack Result");
    println!("   Output:      {}", report.output);
    println!(
        "   Copied:      {} ({})",
        s.copied,
        format_size(bytes_copied, DECIMAL)
    );
    println!("   Up to date:  {}", s.up_to_date);
    println!("   Skipped:     {}", s.skipped);
    println!("   Missing:     {}", s.missing.len());
    for path in &s.missing {
        println!("     - {}", path);
    }
    if !report.recovered.is_empty() {
        println!("   Recovered:   {}", report.recovered.len());
        for r in &report.recovered {
            println!("     - {} -> {}", r.missing, r.found);
        }
    }
    if !report.nested.is_empty() {
        println!("   Libraries:");
        for nested in report.nested_outcomes() {
            println!("     {}- {}", "  ".repeat(nested.depth.saturating_sub(1)), nested);
        }
    }
    if !s.unaccounted.is_empty() {
        println!("   Unaccounted: {}", s.unaccounted.len());
        for path in &s.unaccounted {
            println!("     - {}", path);
        }
    }
    match report.status() {
        PackStatus::Clean => println!("   Status:      Clean"),
        PackStatus::Warnings { missing, failed } => println!(
            "   Status:      Completed with warnings ({} missing, {} failed)",
            missing, failed
        ),
    }
}

/// List what a project references without touching anything.
pub async fn cmd_deps(project: Utf8PathBuf, json: bool) -> Result<()> {
    let doc = ProjectDocument::load(&project)
        .with_context(|| format!("Failed to load project {}", project))?;
    let listing = tokio::task::spawn_blocking(move || list_dependencies(&doc)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!(":: Dependencies of {}", listing.project);
    for entry in &listing.dependencies {
        let owner = entry
            .library
            .as_deref()
            .map(|l| format!(" (via {l})"))
            .unwrap_or_default();
        match &entry.resolved {
            None if entry.reference.trim().is_empty() => {
                println!("   [{}] {}{}: <empty>", entry.kind, entry.name, owner)
            }
            None => println!(
                "   [{}] {}{}: {}",
                entry.kind,
                entry.name,
                owner,
                entry.reference.trim()
            ),
            Some(path) if entry.exists() => {
                println!("   [{}] {}{}: {}", entry.kind, entry.name, owner, path)
            }
            Some(path) => println!(
                "   [{}] {}{}: {} (missing)",
                entry.kind, entry.name, owner, path
            ),
        }
    }
    for path in &listing.unlinked {
        println!("   [unlinked] {}", path);
    }

    let missing = listing
        .dependencies
        .iter()
        .filter(|e| e.resolved.is_some() && !e.exists())
        .count();
    println!(
        "\n   Total: {}, missing: {}",
        listing.dependencies.len(),
        missing
    );
    Ok(())
}
