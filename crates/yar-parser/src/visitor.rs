//! The visitor protocol: pure dispatch, observing walks, and modifying
//! rewrites that keep the token stream in lock-step with the AST.
//!
//! Three shapes, one method per expression variant each:
//!
//! - [`Visitor`] — double dispatch only; implementers provide every method.
//! - [`ObservingVisitor`] — defaults walk all children post-order,
//!   left-to-right; override the variants you care about.
//! - [`ModifyingVisitor`] — defaults walk children and apply their
//!   [`VisitResult`]s: replacements splice the child's tokens out and the
//!   replacement's tokens in at the same stream position; a deleted operand
//!   collapses a unary node and promotes the survivor of a binary node.
//!   Deletion propagates bottom-up; a deletion reaching the root substitutes
//!   the `when_deleted` fallback passed to [`ModifyingVisitor::modify`].

use yar_common::{TokenIt, TokenStream};

use crate::ast::expr::{BinaryOp, ExprKind, Expression, ExpressionType};
use crate::ast::rule::Rule;

/// Outcome of visiting one node with a modifying visitor.
pub enum VisitResult {
    Unchanged,
    Replace(Replacement),
    Delete,
}

/// A replacement expression, optionally with the private stream holding its
/// tokens.
///
/// `tokens: Some(..)` means the expression was built fresh and its tokens
/// must be spliced into the enclosing stream. `tokens: None` means the
/// expression already lives in the enclosing stream (a promoted descendant)
/// and only the node pointer changes hands.
pub struct Replacement {
    pub expr: Expression,
    pub tokens: Option<TokenStream>,
}

impl Replacement {
    /// A freshly built expression carrying its own tokens.
    pub fn built(expr: Expression, tokens: TokenStream) -> Self {
        Self {
            expr,
            tokens: Some(tokens),
        }
    }

    /// An expression whose tokens are already in the enclosing stream.
    pub fn promoted(expr: Expression) -> Self {
        Self { expr, tokens: None }
    }
}

// ── Pure visitor ───────────────────────────────────────────────────────

macro_rules! pure_visit_methods {
    ($($name:ident),* $(,)?) => {
        $(fn $name(&mut self, expr: &Expression) -> Self::Output;)*
    };
}

/// Abstract dispatch over every expression variant.
pub trait Visitor {
    type Output;

    pure_visit_methods!(
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

impl Expression {
    /// Double dispatch on the concrete variant.
    pub fn accept<V: Visitor>(&self, visitor: &mut V) -> V::Output {
        use ExprKind::*;
        match &self.kind {
            StringRef { .. } => visitor.visit_string_ref(self),
            StringWildcard { .. } => visitor.visit_string_wildcard(self),
            StringAt { .. } => visitor.visit_string_at(self),
            StringInRange { .. } => visitor.visit_string_in_range(self),
            StringCount { .. } => visitor.visit_string_count(self),
            StringOffset { .. } => visitor.visit_string_offset(self),
            StringLength { .. } => visitor.visit_string_length(self),
            Not(_) => visitor.visit_not(self),
            UnaryMinus(_) => visitor.visit_unary_minus(self),
            BitwiseNot(_) => visitor.visit_bitwise_not(self),
            Paren { .. } => visitor.visit_paren(self),
            And(_) => visitor.visit_and(self),
            Or(_) => visitor.visit_or(self),
            Lt(_) => visitor.visit_lt(self),
            Gt(_) => visitor.visit_gt(self),
            Le(_) => visitor.visit_le(self),
            Ge(_) => visitor.visit_ge(self),
            Eq(_) => visitor.visit_eq(self),
            Neq(_) => visitor.visit_neq(self),
            Contains(_) => visitor.visit_contains(self),
            Matches(_) => visitor.visit_matches(self),
            Plus(_) => visitor.visit_plus(self),
            Minus(_) => visitor.visit_minus(self),
            Multiply(_) => visitor.visit_multiply(self),
            Divide(_) => visitor.visit_divide(self),
            Modulo(_) => visitor.visit_modulo(self),
            BitwiseXor(_) => visitor.visit_bitwise_xor(self),
            BitwiseAnd(_) => visitor.visit_bitwise_and(self),
            BitwiseOr(_) => visitor.visit_bitwise_or(self),
            ShiftLeft(_) => visitor.visit_shift_left(self),
            ShiftRight(_) => visitor.visit_shift_right(self),
            ForInt { .. } => visitor.visit_for_int(self),
            ForString { .. } => visitor.visit_for_string(self),
            Of { .. } => visitor.visit_of(self),
            Set { .. } => visitor.visit_set(self),
            Range { .. } => visitor.visit_range(self),
            Id { .. } => visitor.visit_id(self),
            StructAccess { .. } => visitor.visit_struct_access(self),
            ArrayAccess { .. } => visitor.visit_array_access(self),
            FunctionCall { .. } => visitor.visit_function_call(self),
            BoolLit(_) => visitor.visit_bool_lit(self),
            StringLit(_) => visitor.visit_string_lit(self),
            IntLit(_) => visitor.visit_int_lit(self),
            DoubleLit(_) => visitor.visit_double_lit(self),
            Filesize => visitor.visit_filesize(self),
            Entrypoint => visitor.visit_entrypoint(self),
            All => visitor.visit_all(self),
            Any => visitor.visit_any(self),
            Them => visitor.visit_them(self),
            IntFunction { .. } => visitor.visit_int_function(self),
            Regexp(_) => visitor.visit_regexp(self),
        }
    }
}

// ── Observing visitor ──────────────────────────────────────────────────

macro_rules! observing_defaults {
    ($($name:ident),* $(,)?) => {
        $(fn $name(&mut self, expr: &Expression) {
            self.walk(expr);
        })*
    };
}

/// Read-only traversal with per-variant override points.
///
/// `observe` dispatches on the variant; every default visits all children
/// strict left-to-right and accumulates nothing. No node is visited twice.
pub trait ObservingVisitor {
    /// Dispatch `expr` to its variant method.
    fn observe(&mut self, expr: &Expression) {
        use ExprKind::*;
        match &expr.kind {
            StringRef { .. } => self.visit_string_ref(expr),
            StringWildcard { .. } => self.visit_string_wildcard(expr),
            StringAt { .. } => self.visit_string_at(expr),
            StringInRange { .. } => self.visit_string_in_range(expr),
            StringCount { .. } => self.visit_string_count(expr),
            StringOffset { .. } => self.visit_string_offset(expr),
            StringLength { .. } => self.visit_string_length(expr),
            Not(_) => self.visit_not(expr),
            UnaryMinus(_) => self.visit_unary_minus(expr),
            BitwiseNot(_) => self.visit_bitwise_not(expr),
            Paren { .. } => self.visit_paren(expr),
            And(_) => self.visit_and(expr),
            Or(_) => self.visit_or(expr),
            Lt(_) => self.visit_lt(expr),
            Gt(_) => self.visit_gt(expr),
            Le(_) => self.visit_le(expr),
            Ge(_) => self.visit_ge(expr),
            Eq(_) => self.visit_eq(expr),
            Neq(_) => self.visit_neq(expr),
            Contains(_) => self.visit_contains(expr),
            Matches(_) => self.visit_matches(expr),
            Plus(_) => self.visit_plus(expr),
            Minus(_) => self.visit_minus(expr),
            Multiply(_) => self.visit_multiply(expr),
            Divide(_) => self.visit_divide(expr),
            Modulo(_) => self.visit_modulo(expr),
            BitwiseXor(_) => self.visit_bitwise_xor(expr),
            BitwiseAnd(_) => self.visit_bitwise_and(expr),
            BitwiseOr(_) => self.visit_bitwise_or(expr),
            ShiftLeft(_) => self.visit_shift_left(expr),
            ShiftRight(_) => self.visit_shift_right(expr),
            ForInt { .. } => self.visit_for_int(expr),
            ForString { .. } => self.visit_for_string(expr),
            Of { .. } => self.visit_of(expr),
            Set { .. } => self.visit_set(expr),
            Range { .. } => self.visit_range(expr),
            Id { .. } => self.visit_id(expr),
            StructAccess { .. } => self.visit_struct_access(expr),
            ArrayAccess { .. } => self.visit_array_access(expr),
            FunctionCall { .. } => self.visit_function_call(expr),
            BoolLit(_) => self.visit_bool_lit(expr),
            StringLit(_) => self.visit_string_lit(expr),
            IntLit(_) => self.visit_int_lit(expr),
            DoubleLit(_) => self.visit_double_lit(expr),
            Filesize => self.visit_filesize(expr),
            Entrypoint => self.visit_entrypoint(expr),
            All => self.visit_all(expr),
            Any => self.visit_any(expr),
            Them => self.visit_them(expr),
            IntFunction { .. } => self.visit_int_function(expr),
            Regexp(_) => self.visit_regexp(expr),
        }
    }

    /// Visit every child of `expr`, left to right.
    fn walk(&mut self, expr: &Expression) {
        for child in expr.children() {
            self.observe(child);
        }
    }

    observing_defaults!(
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

// ── Modifying visitor ──────────────────────────────────────────────────

/// Apply a replacement at the span `[first, last)` of `stream`, splicing
/// tokens when the replacement carries its own.
pub fn apply_replacement(
    stream: &mut TokenStream,
    first: TokenIt,
    last: TokenIt,
    replacement: Replacement,
) -> Expression {
    let mut expr = replacement.expr;
    if let Some(mut donor) = replacement.tokens {
        let after = stream.erase_range(first, last);
        stream.move_append_before(&mut donor, after);
        // Builder spans end at the sentinel; pin them to the splice point.
        expr.close_end_spans(after);
    }
    expr
}

/// Replace `slot` with `replacement`, splicing the stream.
fn substitute_child(stream: &mut TokenStream, slot: &mut Expression, replacement: Replacement) {
    let (first, last) = (slot.first(), slot.last());
    *slot = apply_replacement(stream, first, last, replacement);
}

/// The sole child of a unary-shaped node, if any.
fn unary_child_mut(expr: &mut Expression) -> Option<&mut Expression> {
    use ExprKind::*;
    match &mut expr.kind {
        Not(e) | UnaryMinus(e) | BitwiseNot(e) => Some(e.as_mut()),
        Paren { inner, .. } => Some(inner.as_mut()),
        StringAt { offset, .. } => Some(offset.as_mut()),
        StringInRange { range, .. } => Some(range.as_mut()),
        IntFunction { arg, .. } => Some(arg.as_mut()),
        StructAccess { base, .. } => Some(base.as_mut()),
        StringOffset { index, .. } | StringLength { index, .. } => {
            index.as_mut().map(|e| e.as_mut())
        }
        _ => None,
    }
}

/// All children of a list-shaped node.
fn nary_children_mut(expr: &mut Expression) -> Vec<&mut Expression> {
    use ExprKind::*;
    match &mut expr.kind {
        ForInt {
            quantifier,
            iterable,
            body,
            ..
        } => vec![quantifier.as_mut(), iterable.as_mut(), body.as_mut()],
        ForString {
            quantifier,
            set,
            body,
        } => vec![quantifier.as_mut(), set.as_mut(), body.as_mut()],
        Of { quantity, set } => vec![quantity.as_mut(), set.as_mut()],
        Set { elements } => elements.iter_mut().collect(),
        Range { low, high } => vec![low.as_mut(), high.as_mut()],
        ArrayAccess { base, index } => vec![base.as_mut(), index.as_mut()],
        FunctionCall { callee, args } => {
            let mut out: Vec<&mut Expression> = vec![callee.as_mut()];
            out.extend(args.iter_mut());
            out
        }
        _ => Vec::new(),
    }
}

fn resync_span(expr: &mut Expression) {
    expr.resync_span();
}

/// Erase the left operand and operator tokens of a binary node and promote
/// its right operand in place.
pub fn promote_right(stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
    let Some(op) = expr.kind.binary() else {
        return VisitResult::Unchanged;
    };
    let (from, to) = (op.left.first(), op.right.first());
    stream.erase_range(from, to);
    let op = take_binary(expr);
    VisitResult::Replace(Replacement::promoted(*op.right))
}

/// Erase the operator tokens and right operand of a binary node and promote
/// its left operand in place.
pub fn promote_left(stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
    let Some(op) = expr.kind.binary() else {
        return VisitResult::Unchanged;
    };
    let (from, to) = (op.left.last(), op.right.last());
    stream.erase_range(from, to);
    let op = take_binary(expr);
    let mut left = *op.left;
    // The survivor's exclusive end pointed at the erased operator.
    left.repin_end(from, to);
    VisitResult::Replace(Replacement::promoted(left))
}

fn take_binary(expr: &mut Expression) -> BinaryOp {
    std::mem::replace(&mut expr.kind, ExprKind::Filesize)
        .into_binary()
        .expect("caller checked the node is binary")
}

macro_rules! modifying_defaults {
    ($walker:ident: $($name:ident),* $(,)?) => {
        $(fn $name(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
            self.$walker(stream, expr)
        })*
    };
}

/// Rewriting traversal.
///
/// Defaults visit children strict left-to-right post-order, substituting
/// replaced children and handling deletions: a deleted sole operand
/// collapses the node, a deleted binary operand promotes the survivor (for
/// `Or` exactly as for `And`), and list-shaped nodes collapse when any
/// child is deleted.
pub trait ModifyingVisitor {
    /// Rewrite `root`, returning the (possibly replaced) root expression.
    ///
    /// A deletion reaching the root substitutes `when_deleted` in its place.
    fn modify(
        &mut self,
        stream: &mut TokenStream,
        mut root: Expression,
        when_deleted: Replacement,
    ) -> Expression {
        match self.dispatch(stream, &mut root) {
            VisitResult::Unchanged => root,
            VisitResult::Replace(replacement) => {
                apply_replacement(stream, root.first(), root.last(), replacement)
            }
            VisitResult::Delete => {
                let after = stream.erase_range(root.first(), root.last());
                let Replacement { mut expr, tokens } = when_deleted;
                if let Some(mut donor) = tokens {
                    stream.move_append_before(&mut donor, after);
                    expr.close_end_spans(after);
                }
                expr
            }
        }
    }

    /// Dispatch `expr` to its variant method.
    fn dispatch(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
        use ExprKind::*;
        match &expr.kind {
            StringRef { .. } => self.visit_string_ref(stream, expr),
            StringWildcard { .. } => self.visit_string_wildcard(stream, expr),
            StringAt { .. } => self.visit_string_at(stream, expr),
            StringInRange { .. } => self.visit_string_in_range(stream, expr),
            StringCount { .. } => self.visit_string_count(stream, expr),
            StringOffset { .. } => self.visit_string_offset(stream, expr),
            StringLength { .. } => self.visit_string_length(stream, expr),
            Not(_) => self.visit_not(stream, expr),
            UnaryMinus(_) => self.visit_unary_minus(stream, expr),
            BitwiseNot(_) => self.visit_bitwise_not(stream, expr),
            Paren { .. } => self.visit_paren(stream, expr),
            And(_) => self.visit_and(stream, expr),
            Or(_) => self.visit_or(stream, expr),
            Lt(_) => self.visit_lt(stream, expr),
            Gt(_) => self.visit_gt(stream, expr),
            Le(_) => self.visit_le(stream, expr),
            Ge(_) => self.visit_ge(stream, expr),
            Eq(_) => self.visit_eq(stream, expr),
            Neq(_) => self.visit_neq(stream, expr),
            Contains(_) => self.visit_contains(stream, expr),
            Matches(_) => self.visit_matches(stream, expr),
            Plus(_) => self.visit_plus(stream, expr),
            Minus(_) => self.visit_minus(stream, expr),
            Multiply(_) => self.visit_multiply(stream, expr),
            Divide(_) => self.visit_divide(stream, expr),
            Modulo(_) => self.visit_modulo(stream, expr),
            BitwiseXor(_) => self.visit_bitwise_xor(stream, expr),
            BitwiseAnd(_) => self.visit_bitwise_and(stream, expr),
            BitwiseOr(_) => self.visit_bitwise_or(stream, expr),
            ShiftLeft(_) => self.visit_shift_left(stream, expr),
            ShiftRight(_) => self.visit_shift_right(stream, expr),
            ForInt { .. } => self.visit_for_int(stream, expr),
            ForString { .. } => self.visit_for_string(stream, expr),
            Of { .. } => self.visit_of(stream, expr),
            Set { .. } => self.visit_set(stream, expr),
            Range { .. } => self.visit_range(stream, expr),
            Id { .. } => self.visit_id(stream, expr),
            StructAccess { .. } => self.visit_struct_access(stream, expr),
            ArrayAccess { .. } => self.visit_array_access(stream, expr),
            FunctionCall { .. } => self.visit_function_call(stream, expr),
            BoolLit(_) => self.visit_bool_lit(stream, expr),
            StringLit(_) => self.visit_string_lit(stream, expr),
            IntLit(_) => self.visit_int_lit(stream, expr),
            DoubleLit(_) => self.visit_double_lit(stream, expr),
            Filesize => self.visit_filesize(stream, expr),
            Entrypoint => self.visit_entrypoint(stream, expr),
            All => self.visit_all(stream, expr),
            Any => self.visit_any(stream, expr),
            Them => self.visit_them(stream, expr),
            IntFunction { .. } => self.visit_int_function(stream, expr),
            Regexp(_) => self.visit_regexp(stream, expr),
        }
    }

    /// Visit the sole child of a unary-shaped node. A deleted child
    /// collapses the node.
    fn walk_unary(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
        if let Some(child) = unary_child_mut(expr) {
            match self.dispatch(stream, child) {
                VisitResult::Unchanged => {}
                VisitResult::Replace(replacement) => {
                    substitute_child(stream, child, replacement)
                }
                VisitResult::Delete => return VisitResult::Delete,
            }
            resync_span(expr);
        }
        VisitResult::Unchanged
    }

    /// Visit both operands of a binary node. A deleted operand promotes the
    /// survivor in place; two deletions delete the node.
    fn walk_binary(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
        let (mut left_deleted, mut right_deleted) = (false, false);
        match expr.kind.binary_mut() {
            Some(op) => {
                match self.dispatch(stream, &mut op.left) {
                    VisitResult::Unchanged => {}
                    VisitResult::Replace(replacement) => {
                        substitute_child(stream, &mut op.left, replacement)
                    }
                    VisitResult::Delete => left_deleted = true,
                }
                match self.dispatch(stream, &mut op.right) {
                    VisitResult::Unchanged => {}
                    VisitResult::Replace(replacement) => {
                        substitute_child(stream, &mut op.right, replacement)
                    }
                    VisitResult::Delete => right_deleted = true,
                }
            }
            None => return VisitResult::Unchanged,
        }
        match (left_deleted, right_deleted) {
            (false, false) => {
                resync_span(expr);
                VisitResult::Unchanged
            }
            (true, true) => VisitResult::Delete,
            (true, false) => promote_right(stream, expr),
            (false, true) => promote_left(stream, expr),
        }
    }

    /// Visit every child of a list-shaped node. Any deleted child collapses
    /// the node.
    fn walk_nary(&mut self, stream: &mut TokenStream, expr: &mut Expression) -> VisitResult {
        let mut deleted = false;
        for child in nary_children_mut(expr) {
            match self.dispatch(stream, child) {
                VisitResult::Unchanged => {}
                VisitResult::Replace(replacement) => {
                    substitute_child(stream, child, replacement)
                }
                VisitResult::Delete => deleted = true,
            }
        }
        if deleted {
            return VisitResult::Delete;
        }
        resync_span(expr);
        VisitResult::Unchanged
    }

    /// Leaves have nothing to walk.
    fn walk_leaf(&mut self, _stream: &mut TokenStream, _expr: &mut Expression) -> VisitResult {
        VisitResult::Unchanged
    }

    modifying_defaults!(walk_leaf:
        visit_string_ref,
        visit_string_wildcard,
        visit_string_count,
        visit_id,
        visit_bool_lit,
        visit_string_lit,
        visit_int_lit,
        visit_double_lit,
        visit_filesize,
        visit_entrypoint,
        visit_all,
        visit_any,
        visit_them,
        visit_regexp,
    );

    modifying_defaults!(walk_unary:
        visit_string_at,
        visit_string_in_range,
        visit_string_offset,
        visit_string_length,
        visit_not,
        visit_unary_minus,
        visit_bitwise_not,
        visit_paren,
        visit_struct_access,
        visit_int_function,
    );

    modifying_defaults!(walk_binary:
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
    );

    modifying_defaults!(walk_nary:
        visit_for_int,
        visit_for_string,
        visit_of,
        visit_set,
        visit_range,
        visit_array_access,
        visit_function_call,
    );
}

impl Expression {
    /// Replace the left operand of a binary node, splicing the old
    /// operand's tokens out and the replacement's in at the same position.
    /// Returns false (and changes nothing) on a non-binary node.
    pub fn set_left_operand(
        &mut self,
        stream: &mut TokenStream,
        replacement: Replacement,
    ) -> bool {
        let Some(op) = self.kind.binary_mut() else {
            return false;
        };
        substitute_child(stream, &mut op.left, replacement);
        self.resync_span();
        true
    }

    /// Replace the right operand of a binary node. See
    /// [`set_left_operand`](Self::set_left_operand).
    pub fn set_right_operand(
        &mut self,
        stream: &mut TokenStream,
        replacement: Replacement,
    ) -> bool {
        let Some(op) = self.kind.binary_mut() else {
            return false;
        };
        substitute_child(stream, &mut op.right, replacement);
        self.resync_span();
        true
    }

    /// Replace the sole operand of a unary-shaped node. Returns false on
    /// nodes with no such operand.
    pub fn set_operand(&mut self, stream: &mut TokenStream, replacement: Replacement) -> bool {
        match unary_child_mut(self) {
            Some(child) => {
                substitute_child(stream, child, replacement);
                self.resync_span();
                true
            }
            None => false,
        }
    }
}

impl Rule {
    /// Run a modifying visitor over this rule's condition, keeping the
    /// condition pointer and the token stream consistent.
    pub fn modify_condition<V: ModifyingVisitor>(
        &mut self,
        stream: &mut TokenStream,
        visitor: &mut V,
        when_deleted: Replacement,
    ) {
        let placeholder = Expression::new(
            ExprKind::Filesize,
            ExpressionType::Int,
            u64::MAX,
            TokenIt::END,
            TokenIt::END,
        );
        let condition = self.replace_condition(placeholder);
        let condition = visitor.modify(stream, condition, when_deleted);
        self.replace_condition(condition);
    }
}
