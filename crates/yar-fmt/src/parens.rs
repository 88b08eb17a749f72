//! Elision of synthetic parentheses.
//!
//! Builders wrap binary operands in `Paren` nodes marked synthetic; this
//! pass removes the ones whose operand already binds at least as tightly
//! as the surrounding context demands, erasing the two paren tokens and
//! lifting the operand into the parent slot. Parens written by the user
//! (or requested explicitly from a builder) are never touched.

use yar_common::TokenStream;
use yar_parser::{ExprKind, Expression, YaraFile};

/// Context binding power below which everything is safe to unwrap.
const TOP_LEVEL: u8 = 0;

/// Remove redundant synthetic parens from every rule condition whose
/// tokens live in the file's master stream.
pub fn elide_synthetic_parens(file: &mut YaraFile) {
    let (rules, stream) = file.rules_and_stream_mut();
    for rule in rules.iter_mut() {
        if stream.contains(rule.condition().first()) {
            elide(stream, rule.condition_mut(), TOP_LEVEL);
        }
    }
}

/// Unwrap `slot` while it is a synthetic paren whose operand binds at
/// least as tightly as `ctx`, then recurse into children with their own
/// context strengths. The left operand of a binary node keeps parens of
/// equal precedence unwrapped; the right operand needs strictly tighter
/// binding, which preserves grouping under left associativity.
fn elide(stream: &mut TokenStream, slot: &mut Expression, ctx: u8) {
    loop {
        let removable = match &slot.kind {
            ExprKind::Paren {
                inner,
                synthetic: true,
            } => inner.precedence().map_or(true, |p| p >= ctx),
            _ => false,
        };
        if !removable {
            break;
        }
        let open = slot.first();
        let after = slot.last();
        let close = stream
            .predecessor(after)
            .expect("paren span ends after its closing token");
        stream.erase(open);
        stream.erase(close);
        let kind = std::mem::replace(&mut slot.kind, ExprKind::Filesize);
        let ExprKind::Paren { inner, .. } = kind else {
            unreachable!("checked synthetic paren above");
        };
        let mut inner = *inner;
        // The operand's exclusive end pointed at the erased `)`.
        inner.repin_end(close, after);
        *slot = inner;
    }

    let own_bp = slot.precedence();
    match &mut slot.kind {
        ExprKind::Not(operand) => elide(stream, operand, 6),
        ExprKind::UnaryMinus(operand) | ExprKind::BitwiseNot(operand) => {
            elide(stream, operand, 22)
        }
        ExprKind::Paren { inner, .. } => elide(stream, inner, TOP_LEVEL),
        ExprKind::StringAt { offset, .. } => elide(stream, offset, 8),
        ExprKind::StringInRange { range, .. } => elide(stream, range, TOP_LEVEL),
        ExprKind::StringOffset {
            index: Some(index), ..
        }
        | ExprKind::StringLength {
            index: Some(index), ..
        } => elide(stream, index, TOP_LEVEL),
        ExprKind::Of { quantity, set } => {
            elide(stream, quantity, 6);
            elide(stream, set, TOP_LEVEL);
        }
        ExprKind::ForInt {
            quantifier,
            iterable,
            body,
            ..
        } => {
            elide(stream, quantifier, 6);
            elide(stream, iterable, TOP_LEVEL);
            elide(stream, body, TOP_LEVEL);
        }
        ExprKind::ForString {
            quantifier,
            set,
            body,
        } => {
            elide(stream, quantifier, 6);
            elide(stream, set, TOP_LEVEL);
            elide(stream, body, TOP_LEVEL);
        }
        ExprKind::Set { elements } => {
            for element in elements {
                elide(stream, element, TOP_LEVEL);
            }
        }
        ExprKind::Range { low, high } => {
            elide(stream, low, TOP_LEVEL);
            elide(stream, high, TOP_LEVEL);
        }
        ExprKind::StructAccess { base, .. } => elide(stream, base, u8::MAX),
        ExprKind::ArrayAccess { base, index } => {
            elide(stream, base, u8::MAX);
            elide(stream, index, TOP_LEVEL);
        }
        ExprKind::FunctionCall { callee, args } => {
            elide(stream, callee, u8::MAX);
            for arg in args {
                elide(stream, arg, TOP_LEVEL);
            }
        }
        ExprKind::IntFunction { arg, .. } => elide(stream, arg, TOP_LEVEL),
        kind if kind.binary().is_some() => {
            let left_ctx = own_bp.unwrap_or(TOP_LEVEL);
            let right_ctx = left_ctx.saturating_add(1);
            let op = kind.binary_mut().expect("checked binary");
            elide(stream, &mut op.left, left_ctx);
            elide(stream, &mut op.right, right_ctx);
        }
        _ => {}
    }
    slot.resync_span();
}
