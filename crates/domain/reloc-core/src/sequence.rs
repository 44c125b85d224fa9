use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobMatcher};
use std::fs;
use std::io;

/// Tile placeholders recognised in a reference's file name.
pub const SEQUENCE_MARKERS: [&str; 2] = ["<UDIM>", "<UVTILE>"];

/// A file name carrying a tile placeholder, anchored in its directory.
///
/// Every placeholder behaves like a `*` wildcard: `tile_<UDIM>.png` matches
/// `tile_1001.png` and `tile_1002.png`. The rest of the name is literal.
#[derive(Debug, Clone)]
pub struct SequencePattern {
    directory: Utf8PathBuf,
    file_name: String,
    matcher: GlobMatcher,
}

impl PartialEq for SequencePattern {
    fn eq(&self, other: &Self) -> bool {
        self.directory == other.directory && self.file_name == other.file_name
    }
}

impl Eq for SequencePattern {}

/// Glob for a marker-bearing file name, glob metacharacters in the name escaped.
fn wildcard_glob(file_name: &str) -> String {
    let mut literal = vec![file_name.to_string()];
    for marker in SEQUENCE_MARKERS {
        literal = literal
            .iter()
            .flat_map(|part| part.split(marker).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    literal
        .iter()
        .map(|part| globset::escape(part))
        .collect::<Vec<_>>()
        .join("*")
}

impl SequencePattern {
    pub fn contains_marker(reference: &str) -> bool {
        SEQUENCE_MARKERS.iter().any(|m| reference.contains(m))
    }

    /// Returns `None` unless the file name itself carries a marker.
    pub fn parse(path: &Utf8Path) -> Option<Self> {
        let file_name = path.file_name()?;
        if !Self::contains_marker(file_name) {
            return None;
        }
        let directory = path.parent()?.to_path_buf();
        let matcher = match GlobBuilder::new(&wildcard_glob(file_name))
            .literal_separator(true)
            .backslash_escape(false)
            .build()
        {
            Ok(glob) => glob.compile_matcher(),
            Err(e) => {
                tracing::warn!("Cannot match tiles for {}: {}", path, e);
                return None;
            }
        };
        Some(Self {
            directory,
            file_name: file_name.to_string(),
            matcher,
        })
    }

    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// The pattern-bearing file name, e.g. `tile_<UDIM>.png`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Directory joined with the pattern-bearing file name.
    pub fn path(&self) -> Utf8PathBuf {
        self.directory.join(&self.file_name)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }

    /// Every regular file in the directory whose name matches, sorted by name.
    /// A directory that does not exist expands to nothing.
    pub fn expand(&self) -> io::Result<Vec<Utf8PathBuf>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                tracing::debug!("Skipping non-UTF-8 entry in {}", self.directory);
                continue;
            };
            if path.file_name().is_some_and(|n| self.matches(n)) {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::SequencePattern;
    use camino::{Utf8Path, Utf8PathBuf};
    use std::fs;

    #[test]
    fn parse_requires_marker_in_file_name() {
        assert!(SequencePattern::parse(Utf8Path::new("/tex/tile_<UDIM>.png")).is_some());
        assert!(SequencePattern::parse(Utf8Path::new("/tex/<UDIM>/tile.png")).is_none());
        assert!(SequencePattern::parse(Utf8Path::new("/tex/tile.png")).is_none());
    }

    #[test]
    fn matches_prefix_and_suffix() {
        let p = SequencePattern::parse(Utf8Path::new("/tex/tile_<UDIM>.png")).unwrap();
        assert!(p.matches("tile_1001.png"));
        assert!(p.matches("tile_1012.png"));
        assert!(!p.matches("tile_1001.jpg"));
        assert!(!p.matches("other_1001.png"));

        let uv = SequencePattern::parse(Utf8Path::new("/tex/wall.<UVTILE>.exr")).unwrap();
        assert!(uv.matches("wall.u1_v1.exr"));
    }

    #[test]
    fn every_marker_in_a_name_is_a_wildcard() {
        let p = SequencePattern::parse(Utf8Path::new("/t/tile_<UDIM>_<UDIM>.png")).unwrap();
        assert!(p.matches("tile_1001_1001.png"));
        assert!(p.matches("tile_1001_1002.png"));
        assert!(!p.matches("tile_1001.png"));

        let mixed = SequencePattern::parse(Utf8Path::new("/t/<UDIM>.<UVTILE>.exr")).unwrap();
        assert!(mixed.matches("1001.u1_v1.exr"));
    }

    #[test]
    fn glob_characters_in_names_are_literal() {
        let p = SequencePattern::parse(Utf8Path::new("/t/[hi]*res_<UDIM>?.png")).unwrap();
        assert!(p.matches("[hi]*res_1001?.png"));
        assert!(!p.matches("hxres_1001a.png"));
    }

    #[test]
    fn expand_lists_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("tile_1002.png"), b"b").unwrap();
        fs::write(root.join("tile_1001.png"), b"a").unwrap();
        fs::write(root.join("tile_1001.jpg"), b"c").unwrap();
        fs::create_dir(root.join("tile_dir.png")).unwrap();

        let p = SequencePattern::parse(&root.join("tile_<UDIM>.png")).unwrap();
        let found = p.expand().unwrap();
        assert_eq!(
            found,
            vec![root.join("tile_1001.png"), root.join("tile_1002.png")]
        );
    }

    #[test]
    fn expand_of_missing_directory_is_empty() {
        let p = SequencePattern::parse(Utf8Path::new("/definitely/not/here/t_<UDIM>.png")).unwrap();
        assert!(p.expand().unwrap().is_empty());
    }
}
