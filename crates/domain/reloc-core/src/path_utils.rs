use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

pub struct AssetPath;

impl AssetPath {
    /// Prefix marking a reference as relative to the file that owns it.
    pub const RELATIVE_PREFIX: &'static str = "//";

    /// Standardize directory separators to forward slashes.
    pub fn normalize(path: &str) -> String {
        path.replace('\\', "/")
    }

    /// Fold `.` and `..` components without touching the filesystem.
    /// A rooted path never climbs above its root.
    pub fn lexical(path: &Utf8Path) -> Utf8PathBuf {
        let mut out = Utf8PathBuf::new();
        for comp in path.components() {
            match comp {
                Utf8Component::CurDir => {}
                Utf8Component::ParentDir => {
                    if matches!(out.components().next_back(), Some(Utf8Component::Normal(_))) {
                        out.pop();
                    } else if !out.has_root() {
                        out.push("..");
                    }
                }
                other => out.push(other.as_str()),
            }
        }
        out
    }

    /// Absolute form of `reference` as seen from `base_dir`.
    ///
    /// `//`-prefixed and plain relative references are both joined onto
    /// `base_dir`; absolute references ignore it.
    pub fn join_reference(base_dir: &Utf8Path, reference: &str) -> Utf8PathBuf {
        let normalized = Self::normalize(reference);
        let stripped = normalized
            .strip_prefix(Self::RELATIVE_PREFIX)
            .unwrap_or(&normalized);
        let candidate = Utf8Path::new(stripped);
        if candidate.is_absolute() && !normalized.starts_with(Self::RELATIVE_PREFIX) {
            Self::lexical(candidate)
        } else {
            Self::lexical(&base_dir.join(candidate))
        }
    }

    /// Path of `path` relative to `base_dir`, both absolute.
    /// Returns `None` when either is relative or they live under different roots.
    pub fn relative_to(path: &Utf8Path, base_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        if !path.is_absolute() || !base_dir.is_absolute() {
            return None;
        }
        let path = Self::lexical(path);
        let base = Self::lexical(base_dir);
        let path_parts: Vec<_> = path.components().collect();
        let base_parts: Vec<_> = base.components().collect();

        // Roots (and Windows prefixes) must agree.
        if path_parts.first() != base_parts.first() {
            return None;
        }

        let common = path_parts
            .iter()
            .zip(base_parts.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut rel = Utf8PathBuf::new();
        for _ in common..base_parts.len() {
            rel.push("..");
        }
        for part in &path_parts[common..] {
            rel.push(part.as_str());
        }
        Some(rel)
    }

    /// True when `path` is `root` or lies below it (lexically).
    pub fn is_within(path: &Utf8Path, root: &Utf8Path) -> bool {
        Self::lexical(path).starts_with(Self::lexical(root))
    }

    /// Host-relative reference string (`//...`) for a relative path.
    pub fn to_reference(rel: &Utf8Path) -> String {
        format!("{}{}", Self::RELATIVE_PREFIX, Self::normalize(rel.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::AssetPath;
    use camino::{Utf8Path, Utf8PathBuf};

    #[test]
    fn lexical_folds_dots() {
        assert_eq!(
            AssetPath::lexical(Utf8Path::new("/a/b/./../c")),
            Utf8PathBuf::from("/a/c")
        );
        assert_eq!(
            AssetPath::lexical(Utf8Path::new("/../x")),
            Utf8PathBuf::from("/x")
        );
        assert_eq!(
            AssetPath::lexical(Utf8Path::new("../../x")),
            Utf8PathBuf::from("../../x")
        );
    }

    #[test]
    fn join_reference_handles_prefix_and_absolute() {
        let base = Utf8Path::new("/proj/scenes");
        assert_eq!(
            AssetPath::join_reference(base, "//tex/wood.png"),
            Utf8PathBuf::from("/proj/scenes/tex/wood.png")
        );
        assert_eq!(
            AssetPath::join_reference(base, "//../shared/wood.png"),
            Utf8PathBuf::from("/proj/shared/wood.png")
        );
        assert_eq!(
            AssetPath::join_reference(base, "tex\\wood.png"),
            Utf8PathBuf::from("/proj/scenes/tex/wood.png")
        );
        assert_eq!(
            AssetPath::join_reference(base, "/lib/wood.png"),
            Utf8PathBuf::from("/lib/wood.png")
        );
    }

    #[test]
    fn relative_to_walks_up_and_down() {
        let rel = AssetPath::relative_to(
            Utf8Path::new("/out/bbb/b.png"),
            Utf8Path::new("/out/aaa"),
        )
        .unwrap();
        assert_eq!(rel, Utf8PathBuf::from("../bbb/b.png"));

        let rel =
            AssetPath::relative_to(Utf8Path::new("/out/aaa/a.png"), Utf8Path::new("/out")).unwrap();
        assert_eq!(AssetPath::to_reference(&rel), "//aaa/a.png");

        assert!(AssetPath::relative_to(Utf8Path::new("a.png"), Utf8Path::new("/out")).is_none());
    }

    #[test]
    fn is_within_is_component_wise() {
        assert!(AssetPath::is_within(
            Utf8Path::new("/out/x/a.png"),
            Utf8Path::new("/out")
        ));
        assert!(!AssetPath::is_within(
            Utf8Path::new("/output/a.png"),
            Utf8Path::new("/out")
        ));
    }
}
