//! Visitor protocol tests: observing walks, pure dispatch, and modifying
//! rewrites that keep the token stream aligned with the AST.

use yar_common::{TokenKind, TokenStream};
use yar_parser::visitor::{promote_left, promote_right};
use yar_parser::{
    parse_str, ExprBuilder, ExprKind, Expression, ModifyingVisitor, ObservingVisitor,
    VisitResult, Visitor,
};

// ── Observing ──────────────────────────────────────────────────────────

#[derive(Default)]
struct RefCounter {
    string_refs: usize,
    int_lits: usize,
}

impl ObservingVisitor for RefCounter {
    fn visit_string_ref(&mut self, expr: &Expression) {
        self.string_refs += 1;
        self.walk(expr);
    }

    fn visit_int_lit(&mut self, expr: &Expression) {
        self.int_lits += 1;
        self.walk(expr);
    }
}

#[test]
fn observing_visitor_counts_nodes() {
    let source = "rule r\n{\n    strings:\n        $a = \"a\"\n        $b = \"b\"\n    condition:\n        $a and ($b or #a > 2) and 1 < 3\n}\n";
    let file = parse_str(source).unwrap();
    let mut counter = RefCounter::default();
    counter.observe(file.rules()[0].condition());
    assert_eq!(counter.string_refs, 2);
    assert_eq!(counter.int_lits, 3);
}

// ── Pure dispatch ──────────────────────────────────────────────────────

struct VariantName;

macro_rules! name_methods {
    ($($method:ident),* $(,)?) => {
        $(fn $method(&mut self, expr: &Expression) -> &'static str {
            expr.kind.name()
        })*
    };
}

impl Visitor for VariantName {
    type Output = &'static str;

    name_methods!(
        visit_string_ref,
        visit_string_wildcard,
        visit_string_at,
        visit_string_in_range,
        visit_string_count,
        visit_string_offset,
        visit_string_length,
        visit_not,
        visit_unary_minus,
        visit_bitwise_not,
        visit_paren,
        visit_and,
        visit_or,
        visit_lt,
        visit_gt,
        visit_le,
        visit_ge,
        visit_eq,
        visit_neq,
        visit_contains,
        visit_matches,
        visit_plus,
        visit_minus,
        visit_multiply,
        visit_divide,
        visit_modulo,
        visit_bitwise_xor,
        visit_bitwise_and,
        visit_bitwise_or,
        visit_shift_left,
        visit_shift_right,
        visit_for_int,
        visit_for_string,
        visit_of,
        visit_set,
        visit_range,
        visit_id,
        visit_struct_access,
        visit_array_access,
        visit_function_call,
        visit_bool_lit,
        visit_string_lit,
        visit_int_lit,
        visit_double_lit,
        visit_filesize,
        visit_entrypoint,
        visit_all,
        visit_any,
        visit_them,
        visit_int_function,
        visit_regexp,
    );
}

#[test]
fn pure_visitor_dispatches_on_variant() {
    let file = parse_str("rule r { condition: 1 + 2 }").unwrap();
    let condition = file.rules()[0].condition();
    assert_eq!(condition.accept(&mut VariantName), "Plus");
    assert_eq!(condition.children()[0].accept(&mut VariantName), "IntLit");
}

// ── Boolean simplification ─────────────────────────────────────────────

/// Folds boolean constants: `not true`, `true and X`, `X or false`, ...
struct BoolSimplifier;

fn bool_replacement(value: bool) -> VisitResult {
    VisitResult::Replace(ExprBuilder::bool_lit(value).build().into())
}

impl ModifyingVisitor for BoolSimplifier {
    fn visit_not(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
        let walked = self.walk_unary(stream, expr);
        if !matches!(walked, VisitResult::Unchanged) {
            return walked;
        }
        let ExprKind::Not(operand) = &expr.kind else {
            return VisitResult::Unchanged;
        };
        match operand.bool_value(stream) {
            Some(value) => bool_replacement(!value),
            None => VisitResult::Unchanged,
        }
    }

    fn visit_and(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
        let walked = self.walk_binary(stream, expr);
        if !matches!(walked, VisitResult::Unchanged) {
            return walked;
        }
        let Some(op) = expr.kind.binary() else {
            return VisitResult::Unchanged;
        };
        match (op.left.bool_value(stream), op.right.bool_value(stream)) {
            (Some(left), Some(right)) => bool_replacement(left && right),
            (Some(false), None) | (None, Some(false)) => bool_replacement(false),
            (Some(true), None) => promote_right(stream, expr),
            (None, Some(true)) => promote_left(stream, expr),
            (None, None) => VisitResult::Unchanged,
        }
    }

    fn visit_or(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
        let walked = self.walk_binary(stream, expr);
        if !matches!(walked, VisitResult::Unchanged) {
            return walked;
        }
        let Some(op) = expr.kind.binary() else {
            return VisitResult::Unchanged;
        };
        match (op.left.bool_value(stream), op.right.bool_value(stream)) {
            (Some(left), Some(right)) => bool_replacement(left || right),
            (Some(true), None) | (None, Some(true)) => bool_replacement(true),
            (Some(false), None) => promote_right(stream, expr),
            (None, Some(false)) => promote_left(stream, expr),
            (None, None) => VisitResult::Unchanged,
        }
    }

    fn visit_paren(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
        let walked = self.walk_unary(stream, expr);
        if !matches!(walked, VisitResult::Unchanged) {
            return walked;
        }
        let ExprKind::Paren { inner, .. } = &expr.kind else {
            return VisitResult::Unchanged;
        };
        match inner.bool_value(stream) {
            Some(value) => bool_replacement(value),
            None => VisitResult::Unchanged,
        }
    }
}

fn simplify(file: &mut yar_parser::YaraFile) {
    let (rules, stream) = file.rules_and_stream_mut();
    for rule in rules.iter_mut() {
        rule.modify_condition(
            stream,
            &mut BoolSimplifier,
            ExprBuilder::bool_lit(true).build().into(),
        );
    }
}

#[test]
fn folding_true_and_leaves_rule_shell_untouched() {
    let source = "rule r\n{\n    strings:\n        $a = \"x\"\n    condition:\n        true and $a\n}\n";
    let mut file = parse_str(source).unwrap();
    let before = file.get_text(false, true);

    simplify(&mut file);

    let condition = file.rules()[0].condition();
    assert!(matches!(condition.kind, ExprKind::StringRef { .. }));
    assert_eq!(condition.text(file.stream()), "$a");
    assert_eq!(
        file.get_text(false, true),
        before.replace("true and $a", "$a")
    );
}

#[test]
fn nested_constants_fold_to_a_single_literal() {
    let source = "rule r\n{\n    condition:\n        not (true and false) and true\n}\n";
    let mut file = parse_str(source).unwrap();
    simplify(&mut file);
    let condition = file.rules()[0].condition();
    assert_eq!(condition.text(file.stream()), "true");
    assert!(file.get_text(false, true).contains("        true\n"));
}

#[test]
fn or_with_constant_promotes_the_other_operand() {
    let source = "rule r\n{\n    strings:\n        $a = \"x\"\n    condition:\n        false or $a\n}\n";
    let mut file = parse_str(source).unwrap();
    simplify(&mut file);
    let condition = file.rules()[0].condition();
    assert!(matches!(condition.kind, ExprKind::StringRef { .. }));
    assert_eq!(condition.text(file.stream()), "$a");
}

// ── Deletion ───────────────────────────────────────────────────────────

/// Deletes every reference to one string id.
struct DeleteString<'a> {
    id: &'a str,
}

impl ModifyingVisitor for DeleteString<'_> {
    fn visit_string_ref(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
        if expr.text(stream) == self.id {
            VisitResult::Delete
        } else {
            VisitResult::Unchanged
        }
    }
}

fn delete_string(source: &str, id: &str) -> (String, String) {
    let mut file = parse_str(source).unwrap();
    let (rules, stream) = file.rules_and_stream_mut();
    rules[0].modify_condition(
        stream,
        &mut DeleteString { id },
        ExprBuilder::bool_lit(false).build().into(),
    );
    let condition_text = rules[0].condition().text(stream);
    (condition_text, file.get_text(false, true))
}

const TWO_STRINGS: &str = "rule r\n{\n    strings:\n        $dead = \"d\"\n        $live = \"l\"\n    condition:\n        $dead or $live\n}\n";

#[test]
fn deleted_left_operand_of_or_promotes_the_right() {
    let (condition, text) = delete_string(TWO_STRINGS, "$dead");
    assert_eq!(condition, "$live");
    assert!(text.contains("        $live\n"));
}

#[test]
fn deleted_right_operand_of_or_promotes_the_left() {
    let source = TWO_STRINGS.replace("$dead or $live", "$live or $dead");
    let (condition, text) = delete_string(&source, "$dead");
    assert_eq!(condition, "$live");
    assert!(text.contains("        $live\n"));
}

#[test]
fn deleted_and_operand_promotes_the_survivor() {
    let source = TWO_STRINGS.replace("$dead or $live", "$dead and $live");
    let (condition, _) = delete_string(&source, "$dead");
    assert_eq!(condition, "$live");
}

#[test]
fn deletion_reaching_the_root_uses_the_fallback() {
    let source = "rule r\n{\n    strings:\n        $dead = \"d\"\n    condition:\n        $dead\n}\n";
    let (condition, text) = delete_string(source, "$dead");
    assert_eq!(condition, "false");
    assert!(text.contains("        false\n"));
}

#[test]
fn deleted_unary_operand_collapses_the_unary() {
    let source = "rule r\n{\n    strings:\n        $dead = \"d\"\n        $live = \"l\"\n    condition:\n        not $dead and $live\n}\n";
    let (condition, _) = delete_string(source, "$dead");
    assert_eq!(condition, "$live");
}

// ── Setters ────────────────────────────────────────────────────────────

#[test]
fn set_right_operand_splices_tokens_and_ast_together() {
    let source = "rule r\n{\n    strings:\n        $a = \"x\"\n        $b = \"y\"\n    condition:\n        $a and $b\n}\n";
    let mut file = parse_str(source).unwrap();
    let (rules, stream) = file.rules_and_stream_mut();
    let replaced = rules[0]
        .condition_mut()
        .set_right_operand(stream, ExprBuilder::bool_lit(true).build().into());
    assert!(replaced);
    assert_eq!(rules[0].condition().text(stream), "$a and true");
    let text = file.get_text(false, true);
    assert!(text.contains("        $a and true\n"));
    assert!(!text.contains("$a and $b"));
}

#[test]
fn set_operand_rejects_leaves() {
    let mut file = parse_str("rule r { condition: true }").unwrap();
    let (rules, stream) = file.rules_and_stream_mut();
    let replaced = rules[0]
        .condition_mut()
        .set_operand(stream, ExprBuilder::bool_lit(false).build().into());
    assert!(!replaced);
    assert_eq!(rules[0].condition().text(stream), "true");
}

// ── Stream consistency ─────────────────────────────────────────────────

#[test]
fn comments_survive_modifying_visits() {
    let source = "rule r\n{\n    strings:\n        $a = \"x\"\n    condition:\n        // keep me\n        true and $a // and me\n}\n";
    let mut file = parse_str(source).unwrap();
    let count_comments = |file: &yar_parser::YaraFile| {
        file.stream()
            .tokens()
            .filter(|t| t.kind().is_comment())
            .count()
    };
    let before = count_comments(&file);
    simplify(&mut file);
    assert_eq!(count_comments(&file), before);
    let text = file.get_text(false, true);
    assert!(text.contains("// keep me"));
    assert!(text.contains("// and me"));
}

#[test]
fn replacement_splices_fresh_tokens_into_the_stream() {
    let source = "rule r\n{\n    condition:\n        not true\n}\n";
    let mut file = parse_str(source).unwrap();
    simplify(&mut file);
    let condition = file.rules()[0].condition();
    assert!(matches!(condition.kind, ExprKind::BoolLit(_)));
    assert_eq!(condition.text(file.stream()), "false");
    let kinds: Vec<TokenKind> = file
        .stream()
        .tokens()
        .map(|t| t.kind())
        .filter(|k| !k.is_trivia())
        .collect();
    assert!(kinds.contains(&TokenKind::FalseKw));
    assert!(!kinds.contains(&TokenKind::NotKw));
}
