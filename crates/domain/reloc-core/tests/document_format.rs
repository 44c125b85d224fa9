use camino::{Utf8Path, Utf8PathBuf};
use reloc_core::{DependencyKind, ProjectDocument, Resolution};

const SCENE: &str = r#"{
  "version": "1.0",
  "libraries":   [{ "name": "props", "filepath": "//libs/props.json" }],
  "images":      [
    { "name": "wood", "filepath": "//tex/wood_<UDIM>.png", "library": null },
    { "name": "bark", "filepath": "tex\\bark.png", "library": "props" },
    { "name": "sky", "filepath": "/shared/sky.hdr" }
  ],
  "movieclips": [], "fonts": [{ "name": "default", "filepath": "<builtin>" }],
  "sounds": [], "texts": [{ "name": "notes" }],
  "volumes": [], "cache_files": [],
  "unlinked_paths": ["//extra/only_in_metadata.bin"]
}"#;

fn load(dir: &tempfile::TempDir) -> (Utf8PathBuf, ProjectDocument) {
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let path = root.join("scene.json");
    std::fs::write(&path, SCENE).unwrap();
    let doc = ProjectDocument::load(&path).unwrap();
    (root, doc)
}

#[test]
fn every_reference_form_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let (root, doc) = load(&dir);

    let Resolution::Sequence(pattern) = doc.resolve(&doc.images[0]) else {
        panic!("expected a tile sequence");
    };
    assert_eq!(pattern.directory(), root.join("tex"));

    // Plain relative, backslashes, owned by a library: anchored at the library.
    assert_eq!(
        doc.resolve(&doc.images[1]),
        Resolution::File(root.join("libs/tex/bark.png"))
    );
    assert_eq!(
        doc.resolve(&doc.images[2]),
        Resolution::File(Utf8PathBuf::from("/shared/sky.hdr"))
    );
    assert_eq!(doc.resolve(&doc.fonts[0]), Resolution::Builtin);
    assert_eq!(doc.resolve(&doc.texts[0]), Resolution::Empty);
}

#[test]
fn dependency_paths_keep_sequences_in_pattern_form() {
    let dir = tempfile::tempdir().unwrap();
    let (root, doc) = load(&dir);

    let paths = doc.dependency_paths();
    assert!(paths.contains(&root.join("tex/wood_<UDIM>.png")));
    assert!(paths.contains(&root.join("extra/only_in_metadata.bin")));
    assert!(paths.contains(Utf8Path::new("/shared/sky.hdr")));
    assert_eq!(paths.len(), 5);
    assert_eq!(doc.records(DependencyKind::Texts).len(), 1);
}

#[test]
fn saving_without_remap_writes_absolute_references() {
    let dir = tempfile::tempdir().unwrap();
    let (root, doc) = load(&dir);
    let dest = root.join("copy.json");
    doc.save_as(&dest, None).unwrap();

    let saved = ProjectDocument::load(&dest).unwrap();
    assert_eq!(saved.libraries[0].filepath, root.join("libs/props.json").as_str());
    assert_eq!(
        saved.images[0].filepath,
        root.join("tex/wood_<UDIM>.png").as_str()
    );
    assert_eq!(saved.texts[0].filepath, "");
    assert_eq!(
        saved.unlinked_paths,
        vec![root.join("extra/only_in_metadata.bin").into_string()]
    );
}
