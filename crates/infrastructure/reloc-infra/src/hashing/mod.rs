use camino::Utf8Path;
use reloc_core::path_utils::AssetPath;
use sha2::{Digest, Sha256};

/// Export subdirectory name for a source directory: lowercase hex SHA-256 of
/// its normalized absolute path. The same directory yields the same key on
/// every run.
pub fn directory_key(dir: &Utf8Path) -> String {
    let normalized = AssetPath::normalize(AssetPath::lexical(dir).as_str());
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::directory_key;
    use camino::Utf8Path;

    #[test]
    fn key_is_stable_and_path_derived() {
        let a = directory_key(Utf8Path::new("/assets/wood"));
        assert_eq!(a, directory_key(Utf8Path::new("/assets/wood")));
        assert_eq!(a, directory_key(Utf8Path::new("/assets/./stone/../wood/")));
        assert_ne!(a, directory_key(Utf8Path::new("/archive/wood")));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn key_of_root_matches_known_digest() {
        // SHA-256("/") as a fixed reference value.
        assert_eq!(
            directory_key(Utf8Path::new("/")),
            "8a5edab282632443219e051e4ade2d1d5bbc671c781051bf1437897cbdfea0f1"
        );
    }
}
