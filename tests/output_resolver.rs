//! Output path resolution rules

use markout::OutputResolver;
use std::path::Path;

#[test]
fn absolute_output_is_used_verbatim() {
    let tmp = tempfile::tempdir().unwrap();
    let resolver = OutputResolver::new(tmp.path().join("markout"));
    let target = tmp.path().join("elsewhere").join("poster.png");

    for input in ["hello.md", "/docs/notes.markdown", "README"] {
        let spec = resolver.resolve(Path::new(input), Some(target.to_str().unwrap())).unwrap();
        assert_eq!(spec.path, target);
    }
}

#[test]
fn relative_output_lands_in_output_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("Downloads").join("markout");
    let resolver = OutputResolver::new(&dir);

    let spec = resolver.resolve(Path::new("hello.md"), Some("cards/launch.png")).unwrap();
    assert_eq!(spec.path, dir.join("cards").join("launch.png"));
    assert!(dir.join("cards").is_dir());
}

#[test]
fn missing_output_derives_from_input_stem() {
    let tmp = tempfile::tempdir().unwrap();
    let resolver = OutputResolver::new(tmp.path());

    let spec = resolver.resolve(Path::new("/writing/hello.md"), None).unwrap();
    assert_eq!(spec.path, tmp.path().join("hello.png"));

    let spec = resolver.resolve(Path::new("release.notes.md"), None).unwrap();
    assert_eq!(spec.path, tmp.path().join("release.notes.png"));
}

#[test]
fn resolution_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let resolver = OutputResolver::new(tmp.path().join("markout"));

    let first = resolver.resolve(Path::new("hello.md"), Some("out.png")).unwrap();
    let second = resolver.resolve(Path::new("hello.md"), Some("out.png")).unwrap();
    assert_eq!(first, second);

    let first = resolver.resolve(Path::new("hello.md"), None).unwrap();
    let second = resolver.resolve(Path::new("hello.md"), None).unwrap();
    assert_eq!(first, second);
}
