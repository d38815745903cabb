/* Document Loader Tests
 *
 * Recursive `use` imports resolved relative to the importing document and
 * through include directories.
 */

use ddl_gen::ddl::{build, ImportResolver, LoadError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

const COMMON: &str = r#"
packages:
  - name: Common
    types:
      - name: Base
        attributes:
          - { name: id, type: uint32_t }
"#;

const MAIN: &str = r#"
use:
  - { file: common.yaml, headers: ["common/Base.h"] }
packages:
  - name: Pkg
    types:
      - name: T
        base: Common.Base
        attributes:
          - { name: v, type: uint16_t }
"#;

#[test]
fn test_relative_import() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "common.yaml", COMMON);
    write(dir.path(), "main.yaml", MAIN);

    let mut resolver = ImportResolver::new(Vec::new());
    resolver.load_file_with_imports(&dir.path().join("main.yaml")).unwrap();
    assert_eq!(resolver.loaded_file_count(), 2);

    let units = resolver.into_units();
    assert!(!units[0].included);
    assert!(units[1].included);

    let model = build(&units).unwrap();
    assert_eq!(model.use_headers, vec!["common/Base.h".to_string()]);
    let emitted: Vec<String> = model.emitted_types().map(|id| model.type_path(id)).collect();
    assert_eq!(emitted, vec!["Pkg.T".to_string()]);
}

#[test]
fn test_include_directory_import() {
    let root = TempDir::new().unwrap();
    write(root.path(), "lib/common.yaml", COMMON);
    write(root.path(), "src/main.yaml", MAIN);

    let mut resolver = ImportResolver::new(vec![root.path().join("lib")]);
    resolver.load_file_with_imports(&root.path().join("src/main.yaml")).unwrap();
    assert_eq!(resolver.loaded_file_count(), 2);
}

#[test]
fn test_missing_import() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.yaml", MAIN);

    let mut resolver = ImportResolver::new(Vec::new());
    let err = resolver.load_file_with_imports(&dir.path().join("main.yaml")).unwrap_err();
    match err {
        LoadError::ImportNotFound { import, .. } => assert_eq!(import, "common.yaml"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_circular_imports_terminate() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.yaml", "use:\n  - { file: b.yaml }\npackages:\n  - name: A\n");
    write(dir.path(), "b.yaml", "use:\n  - { file: a.yaml }\npackages:\n  - name: B\n");

    let mut resolver = ImportResolver::new(Vec::new());
    resolver.load_file_with_imports(&dir.path().join("a.yaml")).unwrap();
    assert_eq!(resolver.loaded_file_count(), 2);
    assert!(!resolver.units()[0].included);
    assert!(resolver.units()[1].included);
}

#[test]
fn test_import_later_named_on_command_line_becomes_primary() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "common.yaml", COMMON);
    write(dir.path(), "main.yaml", MAIN);

    let mut resolver = ImportResolver::new(Vec::new());
    resolver.load_file_with_imports(&dir.path().join("main.yaml")).unwrap();
    resolver.load_file_with_imports(&dir.path().join("common.yaml")).unwrap();
    assert_eq!(resolver.loaded_file_count(), 2);
    assert!(resolver.units().iter().all(|u| !u.included));
}

#[test]
fn test_parse_error_names_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "bad.yaml", "packages: [ { name: Pkg, types: 5 } ]\n");

    let mut resolver = ImportResolver::new(Vec::new());
    let err = resolver.load_file_with_imports(&dir.path().join("bad.yaml")).unwrap_err();
    assert!(matches!(err, LoadError::Parse { .. }));
    assert!(err.to_string().contains("bad.yaml"));
}
