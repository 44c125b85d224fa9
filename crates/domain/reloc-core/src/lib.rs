use serde::{Deserialize, Serialize};
use std::fmt;

pub mod document;
pub mod path_utils;
pub mod resolve;
pub mod sequence;

pub use document::{DocumentError, ProjectDocument};
pub use resolve::{resolve_reference, Resolution};
pub use sequence::SequencePattern;

/// Categories of dependency-bearing records, in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Libraries,
    Images,
    #[serde(rename = "movieclips")]
    MovieClips,
    Fonts,
    Sounds,
    Texts,
    Volumes,
    CacheFiles,
}

impl DependencyKind {
    /// Fixed traversal order. Passes over the same project are reproducible
    /// because of it.
    pub const ALL: [DependencyKind; 8] = [
        DependencyKind::Libraries,
        DependencyKind::Images,
        DependencyKind::MovieClips,
        DependencyKind::Fonts,
        DependencyKind::Sounds,
        DependencyKind::Texts,
        DependencyKind::Volumes,
        DependencyKind::CacheFiles,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            DependencyKind::Libraries => "libraries",
            DependencyKind::Images => "images",
            DependencyKind::MovieClips => "movieclips",
            DependencyKind::Fonts => "fonts",
            DependencyKind::Sounds => "sounds",
            DependencyKind::Texts => "texts",
            DependencyKind::Volumes => "volumes",
            DependencyKind::CacheFiles => "cache_files",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One reference from a project to an external file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyRecord {
    pub name: String,
    #[serde(default)]
    pub filepath: String,
    /// Name of the library record that declared this one; `None` for the project itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
}

impl DependencyRecord {
    pub fn new(name: impl Into<String>, filepath: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filepath: filepath.into(),
            library: None,
        }
    }

    pub fn owned_by(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::DependencyKind;

    #[test]
    fn kind_order_is_stable() {
        let indices: Vec<usize> = DependencyKind::ALL.iter().map(|k| k.index()).collect();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert_eq!(DependencyKind::ALL[0], DependencyKind::Libraries);
        assert_eq!(DependencyKind::ALL[7], DependencyKind::CacheFiles);
    }

    #[test]
    fn kind_serializes_as_its_label() {
        for kind in DependencyKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.label()));
        }
    }
}
