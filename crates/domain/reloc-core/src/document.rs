use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;

use crate::path_utils::AssetPath;
use crate::resolve::{resolve_reference, Resolution, BUILTIN_REFERENCE};
use crate::{DependencyKind, DependencyRecord};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read project {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write project {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("project {path} is malformed: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(String),
}

fn default_version() -> String {
    "1.0".to_string()
}

/// A project and every dependency-bearing record it owns.
///
/// The document is anchored at an absolute path: relative references of
/// project-owned records resolve against the anchor's directory, those of
/// library-owned records against the library's location as it was when the
/// document was loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectDocument {
    #[serde(skip)]
    path: Utf8PathBuf,
    #[serde(skip)]
    library_origins: HashMap<String, Utf8PathBuf>,

    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub libraries: Vec<DependencyRecord>,
    #[serde(default)]
    pub images: Vec<DependencyRecord>,
    #[serde(default)]
    pub movieclips: Vec<DependencyRecord>,
    #[serde(default)]
    pub fonts: Vec<DependencyRecord>,
    #[serde(default)]
    pub sounds: Vec<DependencyRecord>,
    #[serde(default)]
    pub texts: Vec<DependencyRecord>,
    #[serde(default)]
    pub volumes: Vec<DependencyRecord>,
    #[serde(default)]
    pub cache_files: Vec<DependencyRecord>,
    /// Paths the project references outside any record kind (metadata only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unlinked_paths: Vec<String>,
}

/// Absolute, lexically normalized form of `path` (no symlink resolution).
pub fn absolutize(path: &Utf8Path) -> io::Result<Utf8PathBuf> {
    let abs = std::path::absolute(path.as_std_path())?;
    let abs = Utf8PathBuf::from_path_buf(abs).map_err(|p| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("non UTF-8 path: {}", p.display()),
        )
    })?;
    Ok(AssetPath::lexical(&abs))
}

impl ProjectDocument {
    /// An empty document anchored at `path`, which should be absolute.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: AssetPath::lexical(&path.into()),
            library_origins: HashMap::new(),
            version: default_version(),
            libraries: Vec::new(),
            images: Vec::new(),
            movieclips: Vec::new(),
            fonts: Vec::new(),
            sounds: Vec::new(),
            texts: Vec::new(),
            volumes: Vec::new(),
            cache_files: Vec::new(),
            unlinked_paths: Vec::new(),
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, DocumentError> {
        Self::load_anchored(path, path)
    }

    /// Read `file` but resolve its relative references as if it lived at `anchor`.
    pub fn load_anchored(file: &Utf8Path, anchor: &Utf8Path) -> Result<Self, DocumentError> {
        let raw = fs::read_to_string(file).map_err(|source| DocumentError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        let mut doc: ProjectDocument =
            serde_json::from_str(&raw).map_err(|source| DocumentError::Parse {
                path: file.to_path_buf(),
                source,
            })?;
        doc.path = absolutize(anchor).map_err(|e| DocumentError::NonUtf8(e.to_string()))?;
        doc.pin_library_origins();
        tracing::debug!(
            "Loaded project {} (anchored at {}, {} libraries)",
            file,
            doc.path,
            doc.libraries.len()
        );
        Ok(doc)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn directory(&self) -> Utf8PathBuf {
        self.path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default()
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or("project.json")
    }

    pub fn records(&self, kind: DependencyKind) -> &[DependencyRecord] {
        match kind {
            DependencyKind::Libraries => &self.libraries,
            DependencyKind::Images => &self.images,
            DependencyKind::MovieClips => &self.movieclips,
            DependencyKind::Fonts => &self.fonts,
            DependencyKind::Sounds => &self.sounds,
            DependencyKind::Texts => &self.texts,
            DependencyKind::Volumes => &self.volumes,
            DependencyKind::CacheFiles => &self.cache_files,
        }
    }

    pub fn records_mut(&mut self, kind: DependencyKind) -> &mut Vec<DependencyRecord> {
        match kind {
            DependencyKind::Libraries => &mut self.libraries,
            DependencyKind::Images => &mut self.images,
            DependencyKind::MovieClips => &mut self.movieclips,
            DependencyKind::Fonts => &mut self.fonts,
            DependencyKind::Sounds => &mut self.sounds,
            DependencyKind::Texts => &mut self.texts,
            DependencyKind::Volumes => &mut self.volumes,
            DependencyKind::CacheFiles => &mut self.cache_files,
        }
    }

    /// Remember where every library currently lives. Already pinned libraries
    /// keep their first location, so rewriting a library record later never
    /// changes how the records it owns resolve.
    ///
    /// A library owned by another library is pinned once its owner is, in
    /// whatever order the records are listed. Owners that never get pinned
    /// (ownership cycles, owners without a file) fall back to the project
    /// directory.
    pub fn pin_library_origins(&mut self) {
        loop {
            let ready: Vec<(String, Utf8PathBuf)> = self
                .libraries
                .iter()
                .filter(|lib| self.needs_pin(lib))
                .filter(|lib| self.owner_is_settled(lib.library.as_deref()))
                .map(|lib| {
                    let owner = self.owner_directory(lib.library.as_deref());
                    (lib.name.clone(), AssetPath::join_reference(&owner, &lib.filepath))
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            for (name, location) in ready {
                self.library_origins.entry(name).or_insert(location);
            }
        }

        let stuck: Vec<(String, Utf8PathBuf)> = self
            .libraries
            .iter()
            .filter(|lib| self.needs_pin(lib))
            .map(|lib| {
                tracing::warn!(
                    "Library '{}' has an unresolvable owner chain, resolving against {}",
                    lib.name,
                    self.path
                );
                (lib.name.clone(), AssetPath::join_reference(&self.directory(), &lib.filepath))
            })
            .collect();
        for (name, location) in stuck {
            self.library_origins.entry(name).or_insert(location);
        }
    }

    fn needs_pin(&self, lib: &DependencyRecord) -> bool {
        !lib.filepath.trim().is_empty() && !self.library_origins.contains_key(&lib.name)
    }

    /// True when records owned by `owner` can already be anchored.
    fn owner_is_settled(&self, owner: Option<&str>) -> bool {
        match owner {
            None => true,
            Some(name) => {
                self.library_origins.contains_key(name)
                    || !self
                        .libraries
                        .iter()
                        .any(|lib| lib.name == name && !lib.filepath.trim().is_empty())
            }
        }
    }

    /// Original location of a library, if it was pinned.
    pub fn library_origin(&self, name: &str) -> Option<&Utf8Path> {
        self.library_origins.get(name).map(Utf8PathBuf::as_path)
    }

    /// Directory that relative references owned by `library` are anchored in.
    pub fn owner_directory(&self, library: Option<&str>) -> Utf8PathBuf {
        match library {
            None => self.directory(),
            Some(name) => match self.library_origin(name).and_then(Utf8Path::parent) {
                Some(dir) => dir.to_path_buf(),
                None => {
                    tracing::warn!(
                        "Record owned by unknown library '{}', resolving against {}",
                        name,
                        self.path
                    );
                    self.directory()
                }
            },
        }
    }

    pub fn resolve(&self, record: &DependencyRecord) -> Resolution {
        resolve_reference(
            &record.filepath,
            &self.owner_directory(record.library.as_deref()),
        )
    }

    /// Every absolute path the project references, sequences in pattern form,
    /// including `unlinked_paths`.
    pub fn dependency_paths(&self) -> BTreeSet<Utf8PathBuf> {
        let mut paths: BTreeSet<Utf8PathBuf> = DependencyKind::ALL
            .iter()
            .flat_map(|kind| self.records(*kind))
            .filter_map(|record| self.resolve(record).pending_key())
            .collect();
        let dir = self.directory();
        paths.extend(
            self.unlinked_paths
                .iter()
                .filter_map(|p| resolve_reference(p, &dir).pending_key()),
        );
        paths
    }

    /// Write a copy of the document to `dest`, leaving `self` untouched.
    ///
    /// References that resolve inside `remap_root` and whose owner also lives
    /// inside it are written `//`-relative to the owner's new location; every
    /// other non-empty reference is written as an absolute path.
    pub fn save_as(&self, dest: &Utf8Path, remap_root: Option<&Utf8Path>) -> Result<(), DocumentError> {
        let dest = absolutize(dest).map_err(|e| DocumentError::NonUtf8(e.to_string()))?;
        let new_dir = dest
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();

        // Where each library will live once the copy is saved.
        let library_dirs: HashMap<&str, Utf8PathBuf> = self
            .libraries
            .iter()
            .filter(|lib| !lib.filepath.trim().is_empty())
            .filter_map(|lib| {
                let owner = self.owner_directory(lib.library.as_deref());
                let location = AssetPath::join_reference(&owner, &lib.filepath);
                location
                    .parent()
                    .map(|dir| (lib.name.as_str(), dir.to_path_buf()))
            })
            .collect();

        let mut out = self.clone();
        for kind in DependencyKind::ALL {
            for record in out.records_mut(kind) {
                let old_owner = self.owner_directory(record.library.as_deref());
                let new_owner = record
                    .library
                    .as_deref()
                    .and_then(|name| library_dirs.get(name))
                    .unwrap_or(&new_dir);
                record.filepath =
                    remap_reference(&record.filepath, &old_owner, new_owner, remap_root);
            }
        }
        let old_dir = self.directory();
        out.unlinked_paths = self
            .unlinked_paths
            .iter()
            .map(|p| remap_reference(p, &old_dir, &new_dir, remap_root))
            .collect();

        let json = serde_json::to_string_pretty(&out).map_err(|source| DocumentError::Parse {
            path: dest.clone(),
            source,
        })?;

        // Atomic write
        let tmp_path = dest.with_file_name(format!("{}.tmp", out_file_name(&dest)));
        fs::write(&tmp_path, json).map_err(|source| DocumentError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&tmp_path, &dest) {
            let _ = fs::remove_file(&tmp_path);
            return Err(DocumentError::Write { path: dest, source });
        }
        tracing::debug!("Saved project copy to {}", dest);
        Ok(())
    }
}

fn out_file_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or("project.json")
}

fn remap_reference(
    reference: &str,
    old_owner: &Utf8Path,
    new_owner: &Utf8Path,
    remap_root: Option<&Utf8Path>,
) -> String {
    let trimmed = reference.trim();
    if trimmed.is_empty() || trimmed == BUILTIN_REFERENCE {
        return reference.to_string();
    }
    let abs = AssetPath::join_reference(old_owner, trimmed);
    if let Some(root) = remap_root {
        if AssetPath::is_within(&abs, root) && AssetPath::is_within(new_owner, root) {
            if let Some(rel) = AssetPath::relative_to(&abs, new_owner) {
                return AssetPath::to_reference(&rel);
            }
        }
    }
    abs.into_string()
}
