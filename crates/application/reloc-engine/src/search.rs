use camino::{Utf8Path, Utf8PathBuf};
use reloc_core::{DependencyKind, ProjectDocument, Resolution};
use std::collections::{BTreeSet, HashMap};
use walkdir::WalkDir;

/// A record whose missing file was found again inside the export tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredRecord {
    pub kind: DependencyKind,
    pub record: String,
    pub missing: Utf8PathBuf,
    pub found: Utf8PathBuf,
}

/// Index every regular file under `root` by file name.
fn index_by_name(root: &Utf8Path) -> HashMap<String, Vec<Utf8PathBuf>> {
    let mut index: HashMap<String, Vec<Utf8PathBuf>> = HashMap::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
            continue;
        };
        if let Some(name) = path.file_name() {
            index.entry(name.to_string()).or_default().push(path);
        }
    }
    index
}

/// Point records that still reference one of `missing` at the single file of
/// the same name under `root`. Names with several candidates are left alone.
pub fn recover_missing(
    doc: &mut ProjectDocument,
    root: &Utf8Path,
    missing: &BTreeSet<Utf8PathBuf>,
) -> Vec<RecoveredRecord> {
    if missing.is_empty() {
        return Vec::new();
    }
    let index = index_by_name(root);
    tracing::debug!(
        "Searching {} for {} missing files ({} candidates)",
        root,
        missing.len(),
        index.len()
    );

    let mut recovered = Vec::new();
    for kind in DependencyKind::ALL {
        for idx in 0..doc.records(kind).len() {
            let Resolution::File(path) = doc.resolve(&doc.records(kind)[idx]) else {
                continue;
            };
            if !missing.contains(&path) || path.exists() {
                continue;
            }
            let Some(candidates) = path.file_name().and_then(|name| index.get(name)) else {
                continue;
            };
            let [found] = candidates.as_slice() else {
                tracing::warn!(
                    "{} matches {} files under {}, leaving it missing",
                    path,
                    candidates.len(),
                    root
                );
                continue;
            };

            let record = &mut doc.records_mut(kind)[idx];
            tracing::info!("Found missing {} at {}", path, found);
            record.filepath = found.to_string();
            recovered.push(RecoveredRecord {
                kind,
                record: record.name.clone(),
                missing: path,
                found: found.clone(),
            });
        }
    }
    recovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use reloc_core::DependencyRecord;
    use std::fs;

    #[test]
    fn unique_match_rewrites_record() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let out = root.join("out");
        fs::create_dir_all(out.join("k1")).unwrap();
        fs::create_dir_all(out.join("k2")).unwrap();
        fs::write(out.join("k1/lost.png"), b"x").unwrap();
        fs::write(out.join("k1/twice.png"), b"x").unwrap();
        fs::write(out.join("k2/twice.png"), b"x").unwrap();

        let mut doc = ProjectDocument::new(root.join("src/scene.json"));
        doc.images.push(DependencyRecord::new("lost", "//lost.png"));
        doc.images.push(DependencyRecord::new("twice", "//twice.png"));
        let missing: BTreeSet<_> = [root.join("src/lost.png"), root.join("src/twice.png")]
            .into_iter()
            .collect();

        let recovered = recover_missing(&mut doc, &out, &missing);
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].found, out.join("k1/lost.png"));
        assert_eq!(doc.images[0].filepath, out.join("k1/lost.png").as_str());
        assert_eq!(doc.images[1].filepath, "//twice.png");
    }
}
