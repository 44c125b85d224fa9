use camino::{Utf8Path, Utf8PathBuf};
use reloc_core::path_utils::AssetPath;
use reloc_infra::{directory_key, TransferError};
use std::collections::HashMap;
use std::fs;
use std::io;

/// Assigns every source directory its own subdirectory of the export root.
///
/// Subdirectory names are content-addressed (see [`directory_key`]), so two
/// passes over the same sources produce the same layout and files copied by
/// an earlier pass are found again. Directories already inside the export
/// root map to themselves.
#[derive(Debug)]
pub struct DirectoryMapper {
    target_root: Utf8PathBuf,
    mapping: HashMap<Utf8PathBuf, Utf8PathBuf>,
}

impl DirectoryMapper {
    pub fn new(target_root: &Utf8Path) -> Self {
        Self {
            target_root: AssetPath::lexical(target_root),
            mapping: HashMap::new(),
        }
    }

    pub fn target_root(&self) -> &Utf8Path {
        &self.target_root
    }

    /// Target directory for `source_dir`, created on first use.
    pub fn target_for(&mut self, source_dir: &Utf8Path) -> Result<Utf8PathBuf, TransferError> {
        let source_dir = AssetPath::lexical(source_dir);
        if let Some(target) = self.mapping.get(&source_dir) {
            return Ok(target.clone());
        }

        let target = if AssetPath::is_within(&source_dir, &self.target_root) {
            source_dir.clone()
        } else {
            self.target_root.join(directory_key(&source_dir))
        };

        match fs::create_dir(&target) {
            Ok(()) => tracing::debug!("Created {} for {}", target, source_dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && target.is_dir() => {}
            Err(source) => {
                return Err(TransferError::CreateDir {
                    path: target,
                    source,
                })
            }
        }

        self.mapping.insert(source_dir, target.clone());
        Ok(target)
    }

    /// Source directory → target directory, for every directory used so far.
    pub fn mapping(&self) -> &HashMap<Utf8PathBuf, Utf8PathBuf> {
        &self.mapping
    }
}
