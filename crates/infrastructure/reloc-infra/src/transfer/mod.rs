use camino::{Utf8Path, Utf8PathBuf};
use filetime::FileTime;
use reloc_core::path_utils::AssetPath;
use std::fs;
use std::io;
use std::time::UNIX_EPOCH;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("source does not exist: {0}")]
    SourceMissing(Utf8PathBuf),
    #[error("cannot read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot copy {src} to {dest}: {source}")]
    Copy {
        src: Utf8PathBuf,
        dest: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Copied,
    /// The destination already held the same file; nothing was written.
    UpToDate,
}

/// Modification time at whole-second granularity. Some filesystems coarsen
/// timestamps, so finer comparisons would re-copy files forever.
pub fn mtime_secs(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn is_up_to_date(src: &fs::Metadata, dest: &fs::Metadata) -> bool {
    dest.is_file() && dest.len() == src.len() && mtime_secs(dest) >= mtime_secs(src)
}

/// A pending copy of one file into a directory, checked but not yet executed.
#[derive(Debug)]
pub struct CopyPlan {
    pub src: Utf8PathBuf,
    pub dest: Utf8PathBuf,
    /// The destination already holds the same file.
    pub up_to_date: bool,
    src_meta: fs::Metadata,
}

/// Inspect `src` and its destination inside `dest_dir` under the same file name.
///
/// The destination is up to date when it has the same length and is not older
/// than the source, or when it is the source itself.
pub fn plan_copy(src: &Utf8Path, dest_dir: &Utf8Path) -> Result<CopyPlan, TransferError> {
    let src_meta = match fs::metadata(src) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TransferError::SourceMissing(src.to_path_buf()))
        }
        Err(source) => {
            return Err(TransferError::Read {
                path: src.to_path_buf(),
                source,
            })
        }
    };
    if !src_meta.is_file() {
        return Err(TransferError::Read {
            path: src.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }
    let Some(file_name) = src.file_name() else {
        return Err(TransferError::Read {
            path: src.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        });
    };

    let dest = dest_dir.join(file_name);
    let up_to_date = AssetPath::lexical(src) == AssetPath::lexical(&dest)
        || fs::metadata(&dest).is_ok_and(|dest_meta| is_up_to_date(&src_meta, &dest_meta));

    Ok(CopyPlan {
        src: src.to_path_buf(),
        dest,
        up_to_date,
        src_meta,
    })
}

impl CopyPlan {
    /// Perform the copy unless the destination is up to date. A copy carries
    /// the source's access and modification times.
    pub fn execute(&self) -> Result<CopyStatus, TransferError> {
        if self.up_to_date {
            tracing::debug!("Up to date: {} -> {}", self.src, self.dest);
            return Ok(CopyStatus::UpToDate);
        }

        // Copy next to the destination, then swap it in so readers never see a partial file.
        let file_name = self.dest.file_name().unwrap_or("file");
        let tmp = self.dest.with_file_name(format!(".{file_name}.part"));
        let result = fs::copy(&self.src, &tmp)
            .and_then(|_| {
                filetime::set_file_times(
                    &tmp,
                    FileTime::from_last_access_time(&self.src_meta),
                    FileTime::from_last_modification_time(&self.src_meta),
                )
            })
            .and_then(|_| fs::rename(&tmp, &self.dest));
        if let Err(source) = result {
            let _ = fs::remove_file(&tmp);
            return Err(TransferError::Copy {
                src: self.src.clone(),
                dest: self.dest.clone(),
                source,
            });
        }

        tracing::debug!("Copied {} -> {}", self.src, self.dest);
        Ok(CopyStatus::Copied)
    }
}

/// [`plan_copy`] followed by [`CopyPlan::execute`].
pub fn copy_if_newer(
    src: &Utf8Path,
    dest_dir: &Utf8Path,
) -> Result<(Utf8PathBuf, CopyStatus), TransferError> {
    let plan = plan_copy(src, dest_dir)?;
    let status = plan.execute()?;
    Ok((plan.dest, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn utf8(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn copies_then_skips_when_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let src = root.join("a.png");
        let out = root.join("out");
        fs::create_dir(&out).unwrap();
        fs::write(&src, b"pixels").unwrap();

        let (dest, status) = copy_if_newer(&src, &out).unwrap();
        assert_eq!(status, CopyStatus::Copied);
        assert_eq!(dest, out.join("a.png"));
        assert_eq!(fs::read(&dest).unwrap(), b"pixels");
        assert!(!out.join(".a.png.part").exists());

        let (_, status) = copy_if_newer(&src, &out).unwrap();
        assert_eq!(status, CopyStatus::UpToDate);
    }

    #[test]
    fn recopies_when_source_is_newer() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let src = root.join("a.png");
        let out = root.join("out");
        fs::create_dir(&out).unwrap();
        fs::write(&src, b"old").unwrap();
        copy_if_newer(&src, &out).unwrap();

        fs::write(&src, b"new").unwrap();
        let later = SystemTime::now() + Duration::from_secs(10);
        filetime::set_file_mtime(&src, FileTime::from_system_time(later)).unwrap();

        let (dest, status) = copy_if_newer(&src, &out).unwrap();
        assert_eq!(status, CopyStatus::Copied);
        assert_eq!(fs::read(dest).unwrap(), b"new");
    }

    #[test]
    fn same_file_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let src = root.join("a.png");
        fs::write(&src, b"x").unwrap();
        let (dest, status) = copy_if_newer(&src, &root).unwrap();
        assert_eq!(dest, src);
        assert_eq!(status, CopyStatus::UpToDate);
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let err = copy_if_newer(&root.join("nope.png"), &root).unwrap_err();
        assert!(matches!(err, TransferError::SourceMissing(_)));
    }

    #[test]
    fn unwritable_destination_is_a_copy_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = utf8(&dir);
        let src = root.join("a.png");
        fs::write(&src, b"x").unwrap();
        let err = copy_if_newer(&src, &root.join("no_such_dir")).unwrap_err();
        assert!(matches!(err, TransferError::Copy { .. }));
    }
}
