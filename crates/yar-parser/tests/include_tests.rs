//! Include resolution tests against real directories.

use std::fs;

use tempfile::TempDir;
use yar_common::ErrorKind;
use yar_parser::{parse_file, parse_file_in_mode, parse_str, ParserMode};

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn includes_pull_in_rules() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "base.yar",
        "rule base_rule\n{\n    condition:\n        true\n}\n",
    );
    let main = write(
        &dir,
        "main.yar",
        "include \"base.yar\"\n\nrule main_rule\n{\n    condition:\n        base_rule\n}\n",
    );

    let file = parse_file(&main).unwrap();
    assert_eq!(file.rules().len(), 2);

    let base = file.rule_by_name("base_rule").unwrap();
    assert!(base.file().unwrap().ends_with("base.yar"));
    let stream = file.stream_containing(base.first()).unwrap();
    assert!(base.text(stream).starts_with("rule base_rule"));

    // Without expansion the directive prints as written; with expansion
    // the included tokens replace it.
    let plain = file.get_text(false, true);
    assert!(plain.contains("include \"base.yar\""));
    assert!(!plain.contains("rule base_rule"));

    let expanded = file.get_text(true, true);
    assert!(!expanded.contains("include \"base.yar\""));
    assert!(expanded.contains("rule base_rule"));
}

#[test]
fn cyclic_includes_error_in_regular_mode() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.yar", "include \"b.yar\"\nrule a_rule\n{\n    condition:\n        true\n}\n");
    write(&dir, "b.yar", "include \"a.yar\"\nrule b_rule\n{\n    condition:\n        true\n}\n");

    let err = parse_file(dir.path().join("a.yar")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Include);
    assert!(err.message.contains("cyclic"));
}

#[test]
fn cyclic_includes_resolve_once_in_guarded_mode() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.yar", "include \"b.yar\"\nrule a_rule\n{\n    condition:\n        true\n}\n");
    write(&dir, "b.yar", "include \"a.yar\"\nrule b_rule\n{\n    condition:\n        true\n}\n");

    let file = parse_file_in_mode(dir.path().join("a.yar"), ParserMode::IncludeGuarded).unwrap();
    let names: Vec<String> = file
        .rules()
        .iter()
        .map(|r| {
            let stream = file.stream_containing(r.name_token()).unwrap();
            r.name(stream)
        })
        .collect();
    assert_eq!(names, vec!["b_rule", "a_rule"]);

    let expanded = file.get_text(true, true);
    assert_eq!(expanded.matches("rule b_rule").count(), 1);
}

#[test]
fn duplicate_includes_are_skipped_in_guarded_mode() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "shared.yar",
        "rule shared_rule\n{\n    condition:\n        true\n}\n",
    );
    let main = write(
        &dir,
        "main.yar",
        "include \"shared.yar\"\ninclude \"shared.yar\"\n",
    );

    let file = parse_file_in_mode(&main, ParserMode::IncludeGuarded).unwrap();
    assert_eq!(file.rules().len(), 1);
    assert_eq!(file.get_text(true, true).matches("rule shared_rule").count(), 1);
}

#[test]
fn duplicate_includes_error_in_regular_mode() {
    // In regular mode the same file included twice brings its rules twice,
    // which trips the duplicate-rule check.
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "shared.yar",
        "rule shared_rule\n{\n    condition:\n        true\n}\n",
    );
    let main = write(
        &dir,
        "main.yar",
        "include \"shared.yar\"\ninclude \"shared.yar\"\n",
    );

    let err = parse_file(&main).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Semantic);
    assert!(err.message.contains("shared_rule"));
}

#[test]
fn missing_include_is_reported() {
    let err = parse_str("include \"no_such_file_anywhere.yar\"\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Include);
    assert!(err.message.contains("no_such_file_anywhere.yar"));
}

#[test]
fn errors_inside_includes_name_the_inner_file() {
    let dir = TempDir::new().unwrap();
    write(&dir, "broken.yar", "rule broken {\n");
    let main = write(&dir, "main.yar", "include \"broken.yar\"\n");

    let err = parse_file(&main).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert!(err.file.as_deref().unwrap().ends_with("broken.yar"));
}
