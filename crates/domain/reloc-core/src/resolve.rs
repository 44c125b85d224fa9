use camino::{Utf8Path, Utf8PathBuf};

use crate::path_utils::AssetPath;
use crate::sequence::SequencePattern;

/// Reference naming a resource compiled into the host rather than a file.
pub const BUILTIN_REFERENCE: &str = "<builtin>";

/// What a stored reference denotes on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The record carries no file.
    Empty,
    /// A host built-in resource; nothing to relocate.
    Builtin,
    /// A single absolute file path.
    File(Utf8PathBuf),
    /// A tile sequence, expanded against its directory at copy time.
    Sequence(SequencePattern),
}

impl Resolution {
    /// Key under which this resolution is tracked in a pass's pending set.
    /// Sequences stay in pattern form.
    pub fn pending_key(&self) -> Option<Utf8PathBuf> {
        match self {
            Resolution::Empty | Resolution::Builtin => None,
            Resolution::File(path) => Some(path.clone()),
            Resolution::Sequence(pattern) => Some(pattern.path()),
        }
    }
}

/// Turn a stored reference into the absolute path(s) it names.
/// `base_dir` is the directory of the file owning the reference.
pub fn resolve_reference(reference: &str, base_dir: &Utf8Path) -> Resolution {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Resolution::Empty;
    }
    if trimmed == BUILTIN_REFERENCE {
        return Resolution::Builtin;
    }

    let path = AssetPath::join_reference(base_dir, trimmed);
    if SequencePattern::contains_marker(trimmed) {
        if let Some(pattern) = SequencePattern::parse(&path) {
            return Resolution::Sequence(pattern);
        }
    }
    Resolution::File(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_builtin() {
        let base = Utf8Path::new("/p");
        assert_eq!(resolve_reference("", base), Resolution::Empty);
        assert_eq!(resolve_reference("   ", base), Resolution::Empty);
        assert_eq!(resolve_reference("<builtin>", base), Resolution::Builtin);
    }

    #[test]
    fn relative_resolves_against_owner() {
        let res = resolve_reference("//tex/a.png", Utf8Path::new("/libs/props"));
        assert_eq!(
            res,
            Resolution::File(Utf8PathBuf::from("/libs/props/tex/a.png"))
        );
    }

    #[test]
    fn sequence_keeps_pattern_form() {
        let res = resolve_reference("//tex/tile_<UDIM>.png", Utf8Path::new("/p"));
        let Resolution::Sequence(pattern) = &res else {
            panic!("expected sequence, got {res:?}");
        };
        assert_eq!(pattern.directory(), Utf8Path::new("/p/tex"));
        assert_eq!(
            res.pending_key(),
            Some(Utf8PathBuf::from("/p/tex/tile_<UDIM>.png"))
        );
    }
}
