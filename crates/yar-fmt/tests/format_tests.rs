//! End-to-end formatter tests: canonical layout, idempotence, comment
//! alignment and synthetic paren elision.

use insta::assert_snapshot;
use yar_fmt::{format_file, format_source};
use yar_parser::{ExprBuilder, RuleBuilder, StringModifiers, YaraFileBuilder};

#[test]
fn one_line_rule_formats_to_canonical_layout() {
    let formatted = format_source("rule r { strings: $a = \"x\" condition: $a }").unwrap();
    assert_eq!(
        formatted,
        "rule r\n{\n    strings:\n        $a = \"x\"\n    condition:\n        $a\n}"
    );
}

#[test]
fn formatting_is_idempotent() {
    let source = "rule r { meta: note = \"n\" strings: $a = \"x\" $b = \"y\" condition: $a and $b }";
    let once = format_source(source).unwrap();
    let twice = format_source(&once).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn formatted_flag_short_circuits_a_second_pass() {
    let mut file = yar_parser::parse_str("rule r { condition: true }").unwrap();
    format_file(&mut file);
    let once = file.get_text(false, true);
    assert!(file.stream().is_formatted());
    format_file(&mut file);
    assert_eq!(file.get_text(false, true), once);
}

#[test]
fn trailing_comments_align_to_one_column() {
    let source = "rule r {\n    strings:\n        $a = \"a\"\n        $b = \"b\"\n    condition:\n        $a or // first\n        $b // second\n}\n";
    let file = yar_parser::parse_str(source).unwrap();
    let text = file.get_text(false, true);
    let columns: Vec<usize> = text.lines().filter_map(|l| l.find("//")).collect();
    assert_eq!(columns, vec![14, 14]);
}

#[test]
fn lone_comment_lines_are_not_pushed_right() {
    let source = "// banner comment\nrule r\n{\n    condition:\n        true // trailing\n}\n";
    let file = yar_parser::parse_str(source).unwrap();
    let text = file.get_text(false, true);
    assert!(text.starts_with("// banner comment\n"));
}

#[test]
fn comment_multiset_is_invariant_under_formatting() {
    let source = "rule r { // one\n    condition: /* two */ true // three\n}";
    let comments = |text: &str| {
        let file = yar_parser::parse_str(text).unwrap();
        let mut found: Vec<String> = file
            .stream()
            .tokens()
            .filter(|t| t.kind().is_comment())
            .map(|t| t.text())
            .collect();
        found.sort();
        found
    };
    let before = comments(source);
    let formatted = format_source(source).unwrap();
    assert_eq!(comments(&formatted), before);
}

#[test]
fn builder_output_formats_with_paren_elision() {
    let mut file = YaraFileBuilder::new()
        .with_rule(
            RuleBuilder::new("math")
                .with_condition(
                    ExprBuilder::int_lit(1)
                        .plus(ExprBuilder::int_lit(2).multiply(ExprBuilder::int_lit(3)))
                        .eq(ExprBuilder::int_lit(7)),
                ),
        )
        .get()
        .unwrap();

    assert_eq!(
        file.rules()[0].condition().text(file.stream()),
        "(1 + (2 * 3)) == 7"
    );
    format_file(&mut file);
    assert_eq!(
        file.rules()[0].condition().text(file.stream()),
        "1 + 2 * 3 == 7"
    );
}

#[test]
fn needed_parens_survive_elision() {
    let mut file = YaraFileBuilder::new()
        .with_rule(
            RuleBuilder::new("grouping")
                .with_plain_string("a", "a", StringModifiers::empty())
                .with_plain_string("b", "b", StringModifiers::empty())
                .with_plain_string("c", "c", StringModifiers::empty())
                .with_condition(
                    ExprBuilder::string_ref("a")
                        .or(ExprBuilder::string_ref("b"))
                        .and(ExprBuilder::string_ref("c")),
                ),
        )
        .get()
        .unwrap();

    format_file(&mut file);
    assert_eq!(
        file.rules()[0].condition().text(file.stream()),
        "($a or $b) and $c"
    );
}

#[test]
fn builder_file_renders_and_reparses() {
    let file = YaraFileBuilder::new()
        .with_module("pe")
        .with_rule(
            RuleBuilder::new("built")
                .with_meta("generated", true)
                .with_plain_string("a", "payload", StringModifiers::empty())
                .with_condition(ExprBuilder::of_them(ExprBuilder::any())),
        )
        .get()
        .unwrap();

    let text = file.get_text(false, true);
    let reparsed = yar_parser::parse_str(&text).unwrap();
    assert_eq!(reparsed.rules().len(), 1);
    assert_eq!(reparsed.imports().len(), 1);
    assert_eq!(
        reparsed.rules()[0].condition().text(reparsed.stream()),
        "any of them"
    );
}

#[test]
fn long_condition_lines_break_after_top_level_operators() {
    let ids: Vec<String> = (0..8).map(|i| format!("$long_string_name_{i}")).collect();
    let strings = ids
        .iter()
        .map(|id| format!("    {id} = \"payload\""))
        .collect::<Vec<_>>()
        .join(" ");
    let condition = ids.join(" and ");
    let source = format!("rule wide {{ strings: {strings} condition: {condition} }}");

    let formatted = format_source(&source).unwrap();
    let mut condition_lines: Vec<&str> = formatted
        .lines()
        .skip_while(|l| !l.contains("condition:"))
        .skip(1)
        .collect();
    assert_eq!(condition_lines.pop(), Some("}"));
    assert!(condition_lines.len() > 1, "expected the condition to break");
    let last = condition_lines.pop().unwrap();
    assert!(!last.trim_end().ends_with("and"));
    for line in &condition_lines {
        assert!(line.trim_end().ends_with("and"), "breaks after `and`: {line}");
    }
}

#[test]
fn formatted_rule_snapshot() {
    let formatted =
        format_source("rule snap { meta: author = \"yar\" condition: filesize < 2MB }").unwrap();
    assert_snapshot!(formatted, @r#"
    rule snap
    {
        meta:
            author = "yar"
        condition:
            filesize < 2MB
    }
    "#);
}
