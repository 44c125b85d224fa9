pub mod commands;

use camino::{Utf8Path, Utf8PathBuf};
use reloc_config::LOG_FILE_EXTENSION;
use reloc_core::{DependencyKind, ProjectDocument, Resolution};
use serde::Serialize;

/// Settings of one `pack` invocation.
#[derive(Debug, Clone)]
pub struct PackArgs {
    pub project: Utf8PathBuf,
    pub target: Utf8PathBuf,
    pub skip_libraries: bool,
    pub isolate_libraries: bool,
    pub max_depth: usize,
    pub origin: Option<Utf8PathBuf>,
    pub no_search: bool,
    pub no_log_file: bool,
}

/// `<target>/<project stem>.log`
pub fn log_path(target: &Utf8Path, project: &Utf8Path) -> Utf8PathBuf {
    let stem = project.file_stem().unwrap_or("project");
    target.join(format!("{stem}.{LOG_FILE_EXTENSION}"))
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DependencyEntry {
    pub kind: DependencyKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    pub reference: String,
    /// Absolute path, sequences in pattern form. `None` for empty and built-in references.
    pub resolved: Option<Utf8PathBuf>,
    /// Files on disk behind the reference (tiles for a sequence).
    pub files: usize,
}

impl DependencyEntry {
    pub fn exists(&self) -> bool {
        self.files > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyListing {
    pub project: Utf8PathBuf,
    pub dependencies: Vec<DependencyEntry>,
    pub unlinked: Vec<Utf8PathBuf>,
}

/// Every record of `doc` with what it resolves to, in traversal order.
pub fn list_dependencies(doc: &ProjectDocument) -> DependencyListing {
    let mut dependencies = Vec::new();
    for kind in DependencyKind::ALL {
        for record in doc.records(kind) {
            let resolution = doc.resolve(record);
            let files = match &resolution {
                Resolution::File(path) => usize::from(path.is_file()),
                Resolution::Sequence(pattern) => pattern.expand().map(|t| t.len()).unwrap_or(0),
                Resolution::Empty | Resolution::Builtin => 0,
            };
            dependencies.push(DependencyEntry {
                kind,
                name: record.name.clone(),
                library: record.library.clone(),
                reference: record.filepath.clone(),
                resolved: resolution.pending_key(),
                files,
            });
        }
    }

    let dir = doc.directory();
    let unlinked = doc
        .unlinked_paths
        .iter()
        .filter_map(|p| reloc_core::resolve_reference(p, &dir).pending_key())
        .collect();

    DependencyListing {
        project: doc.path().to_path_buf(),
        dependencies,
        unlinked,
    }
}
